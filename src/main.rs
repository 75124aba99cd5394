//! Wedding Guest Worker - guest list import service for the wedding planner
//!
//! This worker connects to NATS and handles guest import messages from the frontend.

mod cli;
mod config;
mod db;
mod error;
mod handlers;
mod services;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use cli::{Cli, Command};
use config::{Config, StoreBackend};
use services::guest_store::{create_guest_store, GuestStore};
use services::import_session::ImportSession;
use services::importer::{template::template_csv, GuestImporter};
use types::UploadedFile;

#[tokio::main]
async fn main() -> Result<()> {
    // Logs directory - use LOGS_DIR env var or default to ../logs (relative to worker)
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "../logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    // File appender for persistent logs (daily rotation)
    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Initialize logging - both stdout and file
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wedding_guest_worker=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer()) // stdout
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false)) // file
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve().await,
        Command::Migrate => {
            let config = Config::from_env()?;
            let pool = db::create_pool(config.require_database_url()?).await?;
            db::run_migrations(&pool).await
        }
        Command::Import { file, event, commit } => import_file(&file, event, commit).await,
        Command::Template { output } => {
            std::fs::write(&output, template_csv()?)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Template written to {}", output.display());
            Ok(())
        }
        Command::List { event } => list_guests(event).await,
    }
}

/// Connect the database when the configured store needs one
async fn connect_store(config: &Config) -> Result<Arc<dyn GuestStore>> {
    let pool: Option<PgPool> = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(config.require_database_url()?).await?;
            info!("Connected to PostgreSQL");
            db::run_migrations(&pool).await?;
            Some(pool)
        }
        StoreBackend::Memory => None,
    };

    Ok(Arc::from(create_guest_store(config, pool)?))
}

async fn serve() -> Result<()> {
    info!("Starting Wedding Guest Worker...");

    // Load configuration
    let config = Config::from_env()?;
    info!("Configuration loaded (store backend: {})", config.store_backend.as_str());

    let store = connect_store(&config).await?;

    // Connect to NATS (supports optional NATS_USER/NATS_PASSWORD auth).
    let nats_client = match (&config.nats_user, &config.nats_password) {
        (Some(user), Some(password)) => {
            async_nats::ConnectOptions::new()
                .user_and_password(user.clone(), password.clone())
                .connect(&config.nats_url)
                .await?
        }
        _ => async_nats::connect(&config.nats_url).await?,
    };
    info!("Connected to NATS at {}", config.nats_url);

    let importer = GuestImporter::new(config.max_file_bytes);

    // Start message handlers
    let handler_result = handlers::start_handlers(nats_client, importer, store).await;

    if let Err(e) = handler_result {
        error!("Handler error: {}", e);
        return Err(e);
    }

    Ok(())
}

/// Run the pipeline on a local file, optionally storing the valid guests
async fn import_file(path: &std::path::Path, event: Option<Uuid>, commit: bool) -> Result<()> {
    let config = Config::from_env()?;
    let importer = GuestImporter::new(config.max_file_bytes);

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let file = UploadedFile::new(filename, bytes);

    if !commit {
        let result = importer.run(&file, &CancellationToken::new(), |phase| {
            info!("{:?} ({}%)", phase, phase.percent());
        })?;
        print!("{}", result.report());
        return Ok(());
    }

    let event_id = event.context("--event is required with --commit")?;
    let store = connect_store(&config).await?;

    let session = ImportSession::new();
    session.select_file(file)?;
    let result = session
        .process(&importer, |phase| info!("{:?} ({}%)", phase, phase.percent()))
        .await?;
    print!("{}", result.report());

    let response = session.confirm(store.as_ref(), event_id).await?;
    println!(
        "Stored {} guests for event {} via {}",
        response.imported_count,
        event_id,
        store.name()
    );
    Ok(())
}

async fn list_guests(event_id: Uuid) -> Result<()> {
    let config = Config::from_env()?;
    let pool = db::create_pool(config.require_database_url()?).await?;
    let guests = db::queries::guest::list_guests(&pool, event_id).await?;

    for guest in &guests {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            guest.id,
            guest.name,
            guest.email,
            guest.rsvp_status,
            guest.events.join(", ")
        );
    }
    println!("{} guests", guests.len());
    Ok(())
}
