//! workpool: interactive worker-pool console and log store queries.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tui_worker_pool::config::Config;
use tui_worker_pool::db::Db;
use tui_worker_pool::db::logs::MAX_WINDOW_SECS;
use tui_worker_pool::engine::{PoolConfig, SimulatedWork, WorkerPool};
use tui_worker_pool::event::event_stream;
use tui_worker_pool::queue::TaskChannel;
use tui_worker_pool::telemetry::{TelemetryConfig, init_telemetry};
use tui_worker_pool::ui::{self, App};

#[derive(Parser)]
#[command(name = "workpool", about = "Worker pool with a live terminal console")]
struct Cli {
    /// TOML config file; environment variables and flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the interactive console (default)
    Run {
        /// Number of workers
        #[arg(long)]
        workers: Option<usize>,
        /// Maximum queued tasks (defaults to the number of workers)
        #[arg(long)]
        queue_capacity: Option<usize>,
        /// Duration of one simulated unit of work
        #[arg(long)]
        work_ms: Option<u64>,
        /// Abort a unit of work after this long
        #[arg(long)]
        work_timeout_ms: Option<u64>,
    },
    /// Query the log store
    Logs {
        /// Maximum records to show
        #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(i64).range(1..=100_000))]
        limit: i64,
        /// Show records per second instead of the records themselves
        #[arg(long)]
        per_second: bool,
        /// Histogram window, in seconds
        #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(i64).range(1..=MAX_WINDOW_SECS))]
        window_secs: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .with_env()?;

    match cli.command.unwrap_or(Command::Run {
        workers: None,
        queue_capacity: None,
        work_ms: None,
        work_timeout_ms: None,
    }) {
        Command::Run {
            workers,
            queue_capacity,
            work_ms,
            work_timeout_ms,
        } => {
            let mut config = config;
            if let Some(n) = workers {
                config.workers = n;
            }
            if let Some(n) = queue_capacity {
                config.queue_capacity = Some(n);
            }
            if let Some(ms) = work_ms {
                config.work_ms = ms;
            }
            if let Some(ms) = work_timeout_ms {
                config.work_timeout_ms = Some(ms);
            }
            cmd_run(config).await
        }
        Command::Logs {
            limit,
            per_second,
            window_secs,
        } => {
            let db = Db::open(&config.log_dir.join("logs.db")).await?;
            db.migrate().await?;
            let result = if per_second {
                cmd_logs_per_second(&db, window_secs).await
            } else {
                cmd_logs(&db, limit).await
            };
            db.close().await;
            result
        }
    }
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    config.validate()?;

    // Log files and the store must be open before the terminal is taken.
    let guard = init_telemetry(TelemetryConfig {
        log_dir: config.log_dir.clone(),
        level: config.log_level.clone(),
        endpoint: config.otel_endpoint.clone(),
        service_name: "workpool".to_string(),
    })
    .await?;
    info!(?config, "starting");

    let channel = TaskChannel::new(config.queue_capacity());
    let (events, rx) = event_stream();
    let pool = WorkerPool::spawn(
        PoolConfig {
            size: config.workers,
            work_timeout: config.work_timeout(),
        },
        channel.clone(),
        events.clone(),
        Arc::new(SimulatedWork::new(config.work_duration())),
    );
    let app = App::new(config.workers, channel.clone(), config.input_char_limit);

    let result = ui::run(app, pool, events, rx, config.tick_interval()).await;
    if let Err(ref e) = result {
        error!("console failed: {e}");
        channel.close();
    }

    info!("stopped");
    guard.shutdown().await;
    result?;
    Ok(())
}

async fn cmd_logs(db: &Db, limit: i64) -> anyhow::Result<()> {
    let records = db.recent_records(limit).await?;
    if records.is_empty() {
        println!("No log records.");
        return Ok(());
    }

    for record in &records {
        let attrs = if record.attributes.is_empty() {
            String::new()
        } else {
            format!("  {}", serde_json::Value::Object(record.attributes.clone()))
        };
        println!(
            "{}  {:<5}  {}{attrs}",
            record.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            record.severity,
            record.message,
        );
    }
    println!("\n{} of {} record(s)", records.len(), db.count_records().await?);
    Ok(())
}

async fn cmd_logs_per_second(db: &Db, window_secs: i64) -> anyhow::Result<()> {
    let buckets = db.per_second_counts(Utc::now(), window_secs).await?;
    println!("{:<20} {:>6}", "SECOND", "COUNT");
    for (second, count) in buckets {
        println!("{:<20} {count:>6}", second.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
