//! PostgreSQL implementation of the Job Store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, Pool, Runtime};
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::job::{AuditEntry, ExternalRef, JobStatus, NewJob, QueueMessage, StatusReport};
use crate::store::JobStore;

/// Job store backed by a PostgreSQL connection pool.
pub struct PgJobStore {
    pool: Pool,
}

impl PgJobStore {
    /// Create a new store and connect to the database.
    pub async fn new(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.url = Some(config.url().to_string());
        cfg.pool = Some(deadpool_postgres::PoolConfig {
            max_size: config.pool_size,
            ..Default::default()
        });

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        // Test connection
        let _ = pool.get().await?;

        Ok(Self { pool })
    }

    /// Run database migrations (embedded via refinery).
    pub async fn run_migrations(&self) -> Result<(), StoreError> {
        use refinery::embed_migrations;
        embed_migrations!("migrations");

        let mut client = self.pool.get().await?;
        migrations::runner()
            .run_async(&mut **client)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;
        Ok(())
    }

    /// Get a connection from the pool.
    async fn conn(&self) -> Result<deadpool_postgres::Object, StoreError> {
        Ok(self.pool.get().await?)
    }
}

fn parse_status(s: &str) -> Result<JobStatus, StoreError> {
    s.parse().map_err(StoreError::Query)
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create_job(&self, job: &NewJob) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        tx.execute(
            r#"
            INSERT INTO jobs (
                correlation_id, client_request_id, account_id, principal,
                principal_type, entitlement, entitlement_type, action,
                status, cloud_provider, created_at, last_updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
            "#,
            &[
                &job.correlation_id,
                &job.client_request_id,
                &job.account_id,
                &job.principal,
                &job.principal_type.to_string(),
                &job.entitlement,
                &job.entitlement_type.to_string(),
                &job.action.to_string(),
                &JobStatus::Queued.to_string(),
                &job.cloud_provider,
                &job.received_at,
            ],
        )
        .await?;

        tx.execute(
            "INSERT INTO job_audit (correlation_id, status, message, created_at) \
             VALUES ($1, $2, $3, $4)",
            &[
                &job.correlation_id,
                &JobStatus::Queued.to_string(),
                &"Change request accepted.",
                &job.received_at,
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn validate_queued(&self, correlation_id: Uuid) -> Result<bool, StoreError> {
        let conn = self.conn().await?;

        let row = conn
            .query_opt(
                "SELECT status FROM jobs WHERE correlation_id = $1",
                &[&correlation_id],
            )
            .await?;

        match row {
            Some(row) => {
                let status = parse_status(row.get("status"))?;
                Ok(status == JobStatus::Queued)
            }
            None => Ok(false),
        }
    }

    async fn try_claim(
        &self,
        correlation_id: Uuid,
        audit_message: &str,
    ) -> Result<bool, StoreError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        // The conditional update is the whole claim protocol: exactly one
        // concurrent caller moves the row out of `queued`.
        let claimed = tx
            .execute(
                "UPDATE jobs SET status = $2, last_updated_at = now() \
                 WHERE correlation_id = $1 AND status = $3",
                &[
                    &correlation_id,
                    &JobStatus::InProgress.to_string(),
                    &JobStatus::Queued.to_string(),
                ],
            )
            .await?;

        if claimed == 0 {
            return Ok(false);
        }

        tx.execute(
            "INSERT INTO job_audit (correlation_id, status, message) VALUES ($1, $2, $3)",
            &[
                &correlation_id,
                &JobStatus::InProgress.to_string(),
                &audit_message,
            ],
        )
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn finalize(
        &self,
        correlation_id: Uuid,
        new_status: JobStatus,
        audit_message: &str,
        external_ref: Option<&ExternalRef>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        let updated = tx
            .execute(
                "UPDATE jobs SET status = $2, last_updated_at = now() \
                 WHERE correlation_id = $1",
                &[&correlation_id, &new_status.to_string()],
            )
            .await?;

        if updated == 0 {
            return Err(StoreError::Query(format!(
                "finalize of unknown job {correlation_id}"
            )));
        }

        tx.execute(
            "INSERT INTO job_audit (correlation_id, status, message) VALUES ($1, $2, $3)",
            &[&correlation_id, &new_status.to_string(), &audit_message],
        )
        .await?;

        if new_status == JobStatus::Success {
            if let Some(external_ref) = external_ref {
                tx.execute(
                    "INSERT INTO job_external_ref (correlation_id, cloud_provider, external_ref_id) \
                     VALUES ($1, $2, $3)",
                    &[
                        &correlation_id,
                        &external_ref.cloud_provider,
                        &external_ref.external_ref_id,
                    ],
                )
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_status(&self, correlation_id: Uuid) -> Result<Option<StatusReport>, StoreError> {
        let conn = self.conn().await?;

        let row = conn
            .query_opt(
                "SELECT correlation_id, status FROM jobs WHERE correlation_id = $1",
                &[&correlation_id],
            )
            .await?;

        match row {
            Some(row) => Ok(Some(StatusReport {
                correlation_id: row.get("correlation_id"),
                status: parse_status(row.get("status"))?,
            })),
            None => Ok(None),
        }
    }

    async fn audit_trail(&self, correlation_id: Uuid) -> Result<Vec<AuditEntry>, StoreError> {
        let conn = self.conn().await?;

        let rows = conn
            .query(
                "SELECT correlation_id, status, message, created_at \
                 FROM job_audit WHERE correlation_id = $1 ORDER BY id",
                &[&correlation_id],
            )
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(AuditEntry {
                correlation_id: row.get("correlation_id"),
                status: parse_status(row.get("status"))?,
                message: row.get("message"),
                timestamp: row.get("created_at"),
            });
        }

        Ok(entries)
    }

    async fn release_stuck(
        &self,
        older_than: Duration,
    ) -> Result<Vec<QueueMessage>, StoreError> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than)
                .map_err(|e| StoreError::Query(e.to_string()))?;

        let mut conn = self.conn().await?;
        let tx = conn.transaction().await?;

        let rows = tx
            .query(
                r#"
                UPDATE jobs SET status = $1, last_updated_at = now()
                WHERE status = $2 AND last_updated_at < $3
                RETURNING correlation_id, client_request_id, account_id, principal,
                          principal_type, entitlement, entitlement_type, action,
                          cloud_provider, created_at
                "#,
                &[
                    &JobStatus::Queued.to_string(),
                    &JobStatus::InProgress.to_string(),
                    &cutoff,
                ],
            )
            .await?;

        let mut released = Vec::with_capacity(rows.len());
        for row in &rows {
            let correlation_id: Uuid = row.get("correlation_id");

            tx.execute(
                "INSERT INTO job_audit (correlation_id, status, message) VALUES ($1, $2, $3)",
                &[
                    &correlation_id,
                    &JobStatus::Queued.to_string(),
                    &"Stuck job released back to queue.",
                ],
            )
            .await?;

            released.push(QueueMessage {
                correlation_id,
                client_request_id: row.get("client_request_id"),
                account_id: row.get("account_id"),
                principal: row.get("principal"),
                principal_type: row
                    .get::<_, String>("principal_type")
                    .parse()
                    .map_err(StoreError::Query)?,
                entitlement: row.get("entitlement"),
                entitlement_type: row
                    .get::<_, String>("entitlement_type")
                    .parse()
                    .map_err(StoreError::Query)?,
                action: row
                    .get::<_, String>("action")
                    .parse()
                    .map_err(StoreError::Query)?,
                target_cloud: row.get("cloud_provider"),
                status: JobStatus::Queued,
                received_at: row.get("created_at"),
            });
        }

        tx.commit().await?;
        Ok(released)
    }
}
