//! Operator binary: run the worker, apply migrations, query status, and
//! sweep stuck jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use entbridge::cache::RedisStatusCache;
use entbridge::config::Config;
use entbridge::executor::NoopExecutor;
use entbridge::gateway::{Gateway, SubmitRequest};
use entbridge::job::{EntitlementType, JobAction, PrincipalType};
use entbridge::queue::{RedisWorkQueue, WorkQueue, queue_key};
use entbridge::store::{JobStore, PgJobStore};
use entbridge::worker::Worker;

#[derive(Parser)]
#[command(name = "entbridge", version, about = "Durable entitlement change-request pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker loop for the configured domain
    Run,
    /// Apply embedded database migrations
    Migrate,
    /// Submit a change request (local ingestion, bypasses any HTTP front)
    Submit {
        #[arg(long)]
        client_request_id: String,
        #[arg(long)]
        account_id: String,
        #[arg(long)]
        principal: String,
        #[arg(long, default_value = "User")]
        principal_type: PrincipalType,
        #[arg(long)]
        entitlement: String,
        #[arg(long, default_value = "default")]
        entitlement_type: EntitlementType,
        #[arg(long)]
        action: JobAction,
        #[arg(long, default_value = "aws")]
        target_cloud: String,
    },
    /// Print the status report for a job
    Status {
        correlation_id: Uuid,
        /// Also print the full audit trail
        #[arg(long)]
        audit: bool,
    },
    /// Release stuck in-progress jobs back onto their queues
    Sweep {
        /// Age threshold in seconds; defaults to WORKER_STUCK_AFTER_SECS
        #[arg(long)]
        older_than_secs: Option<u64>,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("failed to load configuration")?;

    match cli.command {
        Command::Run => cmd_run(config).await,
        Command::Migrate => cmd_migrate(config).await,
        Command::Submit {
            client_request_id,
            account_id,
            principal,
            principal_type,
            entitlement,
            entitlement_type,
            action,
            target_cloud,
        } => {
            cmd_submit(
                config,
                SubmitRequest {
                    client_request_id,
                    account_id,
                    principal,
                    principal_type,
                    entitlement,
                    entitlement_type,
                    action,
                    target_cloud,
                },
            )
            .await
        }
        Command::Status {
            correlation_id,
            audit,
        } => cmd_status(config, correlation_id, audit).await,
        Command::Sweep { older_than_secs } => cmd_sweep(config, older_than_secs).await,
    }
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(
        PgJobStore::new(&config.database)
            .await
            .context("failed to connect to the job store")?,
    );
    let queue = Arc::new(
        RedisWorkQueue::connect(&config.redis)
            .await
            .context("failed to connect to the work queue")?,
    );
    let cache = Arc::new(RedisStatusCache::with_connection(
        queue.connection(),
        &config.cache,
    ));
    let executor = Arc::new(NoopExecutor);

    let worker = Worker::new(store, queue, cache, executor, config.worker);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    worker.run(shutdown_rx).await;
    Ok(())
}

async fn cmd_migrate(config: Config) -> anyhow::Result<()> {
    let store = PgJobStore::new(&config.database)
        .await
        .context("failed to connect to the job store")?;
    store
        .run_migrations()
        .await
        .context("migrations failed")?;
    println!("migrations applied");
    Ok(())
}

async fn cmd_submit(config: Config, request: SubmitRequest) -> anyhow::Result<()> {
    let store = Arc::new(PgJobStore::new(&config.database).await?);
    let queue = Arc::new(RedisWorkQueue::connect(&config.redis).await?);
    let cache = Arc::new(RedisStatusCache::with_connection(
        queue.connection(),
        &config.cache,
    ));

    let gateway = Gateway::new(store, queue, cache);
    let correlation_id = gateway.submit(request).await?;
    println!("{correlation_id}");
    Ok(())
}

async fn cmd_status(config: Config, correlation_id: Uuid, audit: bool) -> anyhow::Result<()> {
    let store = Arc::new(PgJobStore::new(&config.database).await?);
    let queue = Arc::new(RedisWorkQueue::connect(&config.redis).await?);
    let cache = Arc::new(RedisStatusCache::with_connection(
        queue.connection(),
        &config.cache,
    ));

    let gateway = Gateway::new(store.clone(), queue, cache);
    match gateway.status(correlation_id).await? {
        Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        None => {
            println!("not found");
            return Ok(());
        }
    }

    if audit {
        for entry in store.audit_trail(correlation_id).await? {
            println!(
                "{}  {:<12}  {}",
                entry.timestamp.to_rfc3339(),
                entry.status.to_string(),
                entry.message
            );
        }
    }
    Ok(())
}

async fn cmd_sweep(config: Config, older_than_secs: Option<u64>) -> anyhow::Result<()> {
    let store = PgJobStore::new(&config.database).await?;
    let queue = RedisWorkQueue::connect(&config.redis).await?;

    let older_than = older_than_secs
        .map(Duration::from_secs)
        .unwrap_or(config.worker.stuck_after);

    let released = store.release_stuck(older_than).await?;
    for message in &released {
        let payload = serde_json::to_vec(message)?;
        queue
            .enqueue_for_retry(&queue_key(&message.target_cloud), &payload)
            .await?;
        tracing::info!(
            correlation_id = %message.correlation_id,
            target_cloud = %message.target_cloud,
            "stuck job released and re-queued"
        );
    }
    println!("released {} stuck jobs", released.len());
    Ok(())
}
