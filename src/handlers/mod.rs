//! NATS message handlers

pub mod import;
pub mod ping;

use std::sync::Arc;

use anyhow::Result;
use async_nats::Client;
use tokio::select;
use tracing::{error, info};

use crate::services::guest_store::GuestStore;
use crate::services::importer::GuestImporter;

use import::ImportContext;

/// Start all message handlers
pub async fn start_handlers(
    client: Client,
    importer: GuestImporter,
    store: Arc<dyn GuestStore>,
) -> Result<()> {
    info!("Starting message handlers...");
    info!(
        "Guest store: {}, upload limit: {} bytes",
        store.name(),
        importer.max_file_bytes()
    );

    let ctx = Arc::new(ImportContext::new(client.clone(), importer, store));

    // Subscribe to all subjects
    let ping_sub = client.subscribe("wedding.ping").await?;
    let select_sub = client.subscribe("wedding.guest.import.select").await?;
    let process_sub = client.subscribe("wedding.guest.import.process").await?;
    let confirm_sub = client.subscribe("wedding.guest.import.confirm").await?;
    let cancel_sub = client.subscribe("wedding.guest.import.cancel").await?;
    let status_sub = client.subscribe("wedding.guest.import.status").await?;
    let template_sub = client.subscribe("wedding.guest.import.template").await?;

    info!("Subscribed to NATS subjects");

    let client_ping = client.clone();
    let ping_handle = tokio::spawn(async move { ping::handle_ping(client_ping, ping_sub).await });

    let ctx_select = Arc::clone(&ctx);
    let select_handle =
        tokio::spawn(async move { import::handle_select(select_sub, ctx_select).await });

    let ctx_process = Arc::clone(&ctx);
    let process_handle =
        tokio::spawn(async move { import::handle_process(process_sub, ctx_process).await });

    let ctx_confirm = Arc::clone(&ctx);
    let confirm_handle =
        tokio::spawn(async move { import::handle_confirm(confirm_sub, ctx_confirm).await });

    let ctx_cancel = Arc::clone(&ctx);
    let cancel_handle =
        tokio::spawn(async move { import::handle_cancel(cancel_sub, ctx_cancel).await });

    let ctx_status = Arc::clone(&ctx);
    let status_handle =
        tokio::spawn(async move { import::handle_status(status_sub, ctx_status).await });

    let ctx_template = Arc::clone(&ctx);
    let template_handle =
        tokio::spawn(async move { import::handle_template(template_sub, ctx_template).await });

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which would indicate an error)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = select_handle => {
            error!("Import select handler finished: {:?}", result);
        }
        result = process_handle => {
            error!("Import process handler finished: {:?}", result);
        }
        result = confirm_handle => {
            error!("Import confirm handler finished: {:?}", result);
        }
        result = cancel_handle => {
            error!("Import cancel handler finished: {:?}", result);
        }
        result = status_handle => {
            error!("Import status handler finished: {:?}", result);
        }
        result = template_handle => {
            error!("Import template handler finished: {:?}", result);
        }
    }

    Ok(())
}
