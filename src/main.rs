//! leak-loader - Bulk Loader for Leaked Credential Dumps
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use leak_loader::config::{Backend, CliArgs, IngestConfig};
use leak_loader::db::{keys, CredentialStore, SqliteStore};
#[cfg(not(feature = "mysql"))]
use leak_loader::error::ConfigError;
use leak_loader::ingest::{IngestSummary, Ingestor};
use leak_loader::progress::{print_header, print_summary, update_bar, ProgressReporter};
use std::path::Path;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    // Parse CLI arguments
    let args = CliArgs::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    // Validate and create config
    let config = IngestConfig::from_args(args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.source.display_path(),
            config.source.kind(),
            config.backend.name(),
            &config.connection.database,
            config.batch.max_records,
        );
    }

    match config.backend {
        Backend::Sqlite => {
            let path = Path::new(&config.connection.database);
            let store = SqliteStore::open(path).context("Failed to open database")?;
            let summary = run_with_store(store, &config)?;
            let db_size = std::fs::metadata(path).ok().map(|m| m.len());
            report(&summary, &config, db_size);
        }
        Backend::MySql => {
            #[cfg(feature = "mysql")]
            {
                let store = leak_loader::db::MySqlStore::connect(&config.connection)
                    .context("Failed to connect to MySQL")?;
                let summary = run_with_store(store, &config)?;
                report(&summary, &config, None);
            }
            #[cfg(not(feature = "mysql"))]
            return Err(ConfigError::BackendUnavailable("mysql").into());
        }
    }

    Ok(())
}

/// Ingest the configured source into `store`
fn run_with_store<S: CredentialStore>(mut store: S, config: &IngestConfig) -> Result<IngestSummary> {
    if store.ensure_schema().context("Failed to create schema")? {
        info!("Created table leak in {}", config.connection.database);
    }

    store.record_run_info(keys::SOURCE, &config.source.display_path())?;
    store.record_run_info(keys::START_TIME, &chrono::Utc::now().to_rfc3339())?;
    store.record_run_info(keys::STATUS, "running")?;

    let mut ingestor = Ingestor::new(store, config.batch);

    // Setup signal handler for graceful shutdown
    let shutdown_flag = ingestor.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, rolling back current batch...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = config.show_progress.then(ProgressReporter::new);
    if let Some(ref p) = progress {
        p.set_status(&format!("Opening {}", config.source.display_path()));
    }

    let result = match &progress {
        Some(p) => {
            let bar = p.bar();
            ingestor.run_with_progress(&config.source, move |snapshot| update_bar(&bar, &snapshot))
        }
        None => ingestor.ingest_source(&config.source),
    };

    if let Some(ref p) = progress {
        match &result {
            Ok(summary) if summary.completed => p.finish("Load completed"),
            Ok(_) => p.finish("Load interrupted"),
            Err(_) => p.finish("Load failed"),
        }
    }

    let mut store = ingestor.into_store();
    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            // Best effort: the run is already failing
            let _ = store.record_run_info(keys::STATUS, "failed");
            return Err(e).context("Load failed");
        }
    };

    let status = if summary.completed { "completed" } else { "interrupted" };
    store.record_run_info(keys::STATUS, status)?;
    store.record_run_info(keys::END_TIME, &chrono::Utc::now().to_rfc3339())?;
    store.record_run_info(
        keys::DURATION_SECS,
        &format!("{:.3}", summary.duration.as_secs_f64()),
    )?;
    store.record_run_info(keys::RECORDS_COMMITTED, &summary.records.to_string())?;
    store.record_run_info(keys::ENTRIES, &summary.entries.to_string())?;
    store.record_run_info(
        keys::FAILED_ENTRIES,
        &(summary.failed_entries + summary.skipped_entries).to_string(),
    )?;

    info!("Building indexes...");
    store.finish().context("Failed to finalize database")?;

    Ok(summary)
}

fn report(summary: &IngestSummary, config: &IngestConfig, db_size: Option<u64>) {
    if config.show_progress {
        print_summary(summary, &config.connection.database, db_size);
    }

    if !summary.completed {
        info!("Load was interrupted before completion");
    }

    if summary.failed_entries + summary.skipped_entries > 0 {
        info!(
            failed = summary.failed_entries,
            skipped = summary.skipped_entries,
            "Load completed with errors"
        );
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("leak_loader=debug,warn")
    } else {
        EnvFilter::new("leak_loader=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
