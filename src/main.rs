use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{info, debug, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*};

mod args;
mod batch;
mod cfg;
mod db;
mod drive;
mod error;
mod metadata;
mod record;
mod relocate;
mod retrieve;
mod workbook;

use args::Args;
use batch::{BatchDriver, ErrorBudget, RunSummary};
use cfg::{Cfg, LogConfig};
use db::Database;
use drive::DriveUi;
use metadata::MetadataResolver;
use relocate::FileRelocator;
use retrieve::LinkRetriever;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let cfg = Cfg::load(&args)?;
    cfg.validate()?;

    // Initialize logging, then report what loading did
    init_logging(&args.log_level, &cfg.log)?;
    for note in &cfg.notes {
        debug!("{}", note);
    }
    debug!("Final configuration: {}", cfg.redacted());
    info!("Configuration validation passed");

    info!("Starting drive_links");
    if cfg.dry_run {
        info!("Dry run: no copies, no browser, no workbook writes");
    }

    let summary = run(&cfg).await?;

    if summary.aborted {
        warn!("drive_links stopped early");
    } else {
        info!("drive_links completed successfully");
    }
    Ok(())
}

/// Acquires the database and the browser, runs the batch, and releases both whatever happened.
async fn run(cfg: &Cfg) -> Result<RunSummary> {
    let mut store = workbook::open(&cfg.workbook.path, &cfg.workbook.sheet_name, &cfg.workbook.id_column)
        .context("Failed to load tracking workbook")?;

    let db = Database::connect(&cfg.database)
        .await
        .context("Failed to connect to database")?;

    let records = match db.load_records(&cfg.database.records_query).await {
        Ok(records) => records,
        Err(e) => {
            db.close().await;
            return Err(e).context("Failed to load record table");
        }
    };

    let browser = if cfg.dry_run {
        None
    } else {
        match DriveUi::launch(&cfg.browser, &cfg.retry).await {
            Ok(browser) => Some(browser),
            Err(e) => {
                db.close().await;
                return Err(e).context("Failed to start browser session");
            }
        }
    };

    let (result, retriever) = {
        let resolver = MetadataResolver::new(&records, &db, cfg.month_locale());
        let relocator = cfg
            .relocate
            .then(|| FileRelocator::new(&cfg.audio.destination_dir, resolver, cfg.dry_run));
        let retriever = browser.map(|ui| {
            LinkRetriever::new(ui, cfg.retry.attempts, Duration::from_secs(cfg.retry.delay_secs))
        });

        let mut driver = BatchDriver::new(relocator, retriever, ErrorBudget::new(cfg.retry.error_budget));
        let result = driver
            .run(Path::new(&cfg.audio.source_dir), store.as_mut())
            .await;
        info!("{} errors counted against the budget", driver.errors());
        (result, driver.into_retriever())
    };

    if let Some(retriever) = retriever {
        if let Err(e) = retriever.into_source().close().await {
            warn!("Browser session did not close cleanly: {}", e);
        }
    }
    db.close().await;

    result.context("Batch stopped on a workbook error")
}

fn parse_level(level: &str) -> tracing::Level {
    match level {
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}

fn init_logging(level: &str, log: &LogConfig) -> Result<()> {
    if let Some(parent) = Path::new(&log.file).parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log.file)
        .with_context(|| format!("Failed to open log file {}", log.file))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_filter(LevelFilter::from_level(parse_level(level))))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::from_level(parse_level(&log.file_level))),
        )
        .init();

    Ok(())
}
