//! hie-integrator: incrementally copies documents for a set of subjects (EE
//! numbers) from an HIE document registry into a downstream ingest server.
//!
//! A SQLite transaction log records every discovered document and the
//! outcome of its last copy attempt. It drives the per-subject query
//! watermark, suppresses duplicates, and retries failures on the next run.

#![warn(clippy::all)]

mod cli;
mod config;
mod lock;
mod run;
mod shutdown;
mod sink;
mod source;
mod state;
mod sync;
mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use config::{expand_tilde, Config, HTTP_TIMEOUT};
use sink::HttpSinkClient;
use source::HttpSourceClient;
use state::SqliteLogStore;
use sync::SyncEngine;

/// Run the status command.
async fn run_status(args: cli::StatusArgs) -> anyhow::Result<()> {
    let db_path = expand_tilde(&args.db);

    if !db_path.exists() {
        println!("No transaction log found at {}", db_path.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let db = SqliteLogStore::open(&db_path).await?;
    let summary = db.summary().await?;

    println!("Transaction log: {}", db.path().display());
    println!();
    println!("Documents:");
    println!("  Total:     {}", summary.total_entries);
    println!("  Copied:    {}", summary.succeeded);
    println!("  Failing:   {}", summary.failing);
    println!("  EE numbers: {}", summary.subjects);
    println!();

    if let Some(started) = &summary.last_sync_started {
        println!(
            "Last sync started:   {}",
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }
    if let Some(completed) = &summary.last_sync_completed {
        println!(
            "Last sync completed: {}",
            completed.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if args.failed || args.ee.is_some() {
        let failing = db.failing(args.ee.as_deref()).await?;
        if !failing.is_empty() {
            println!();
            println!("Failing documents:");
            for entry in failing {
                println!(
                    "  {} {} (attempts: {}) - {}",
                    entry.subject, entry.document_id, entry.failure_count, entry.last_error
                );
            }
        }
    }

    Ok(())
}

async fn ensure_parent_dir(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

/// Run the sync command.
async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_args(args)?;
    tracing::info!(
        subjects = config.subjects.len(),
        concurrency = config.concurrency,
        "Starting hie-integrator"
    );
    tracing::debug!(?config, "Configuration");

    ensure_parent_dir(&config.db_path).await?;
    let lock = lock::acquire(&config.db_path).await?;
    tracing::debug!("Holding lock {}", lock.path().display());

    let store = Arc::new(SqliteLogStore::open(&config.db_path).await?);
    let source = HttpSourceClient::new(&config.hie_url, config.credentials.clone(), HTTP_TIMEOUT)?;
    let sink = HttpSinkClient::new(&config.ingest_url, HTTP_TIMEOUT)?;

    let mut engine = SyncEngine::new(Arc::new(source), Arc::new(sink), store.clone());
    if let Some(dir) = &config.copy_dir {
        engine = engine.with_local_copies(dir)?;
        tracing::info!("Keeping local copies in {}", dir.display());
    }

    let shutdown_token = shutdown::install_signal_handler()
        .context("Failed to install signal handlers")?;

    run::run(&engine, &store, &config, &shutdown_token).await
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.command {
        Command::Status(args) => run_status(args).await,
        Command::Sync(args) => run_sync(args).await,
    }
}
