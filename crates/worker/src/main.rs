//! Maintenance entry point for the stock ledger.

use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

use pharmastock_core::BatchId;
use pharmastock_infra::{
    InventoryAlertScanner, PostgresStockStore, StockConfig, StockSummaryAggregator, StockTransactionEngine,
};
use pharmastock_notifications::{AlertBus, InMemoryAlertBus};

/// Stock ledger maintenance tasks, run against the database in `DATABASE_URL`.
#[derive(Parser, Debug)]
#[command(name = "pharmastock-worker")]
#[command(about = "Maintenance tasks for the pharmacy stock ledger")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Backfill missing per-medicine stock summaries
    RebuildSummaries,

    /// Run the low-stock and expiry scans and print alerts as JSON lines
    Sweep,

    /// Replay a batch's ledger against its stored balance
    Reconcile {
        /// Batch to check
        batch_id: BatchId,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    pharmastock_observability::init();

    let Cli { command } = Cli::parse();

    let config = StockConfig::from_env().context("reading configuration")?;
    let database_url = config.require_database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(3))
        .connect(database_url)
        .await
        .context("connecting to Postgres")?;

    sqlx::migrate!("../infra/migrations")
        .run(&pool)
        .await
        .context("running migrations")?;

    let store = PostgresStockStore::new(pool, config.lock_wait);

    match command {
        Command::RebuildSummaries => {
            let report = StockSummaryAggregator::new(store)
                .rebuild_missing_summaries()
                .await
                .context("rebuilding stock summaries")?;
            println!("{}", serde_json::to_string(&report)?);
            if !report.failed.is_empty() {
                bail!("{} summaries could not be rebuilt", report.failed.len());
            }
        }
        Command::Sweep => {
            let bus = InMemoryAlertBus::new();
            let outbox = bus.subscribe();
            let scanner = InventoryAlertScanner::new(store, config.scanner_config());

            let report = scanner
                .sweep(&config.alert_recipients, &bus, Utc::now())
                .await
                .context("running alert sweep")?;

            for alert in outbox.drain() {
                println!("{}", serde_json::to_string(&alert)?);
            }
            tracing::info!(published = report.published, failed = report.failed, "sweep done");
        }
        Command::Reconcile { batch_id } => {
            let engine = StockTransactionEngine::new(store);
            let report = engine
                .reconcile_batch(batch_id)
                .await
                .with_context(|| format!("reconciling batch {batch_id}"))?;
            println!("{}", serde_json::to_string(&report)?);
            if !report.is_consistent() {
                bail!("batch {batch_id} does not reconcile with its ledger");
            }
        }
    }

    Ok(())
}
