//! Guest import handlers
//!
//! Subjects:
//! - `wedding.guest.import.select`: attach a file (base64) to the session
//! - `wedding.guest.import.process`: parse, map and validate the file
//! - `wedding.guest.import.confirm`: store the valid guests
//! - `wedding.guest.import.cancel`: drop the session contents
//! - `wedding.guest.import.status`: current session status
//! - `wedding.guest.import.template`: downloadable CSV template
//!
//! Progress of `process` is published on `wedding.guest.import.progress.<eventId>`.

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use base64::Engine;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::ImportError;
use crate::services::guest_store::GuestStore;
use crate::services::import_session::{ImportSession, ImportSessions};
use crate::services::importer::template::{template_csv, TEMPLATE_FILENAME};
use crate::services::importer::GuestImporter;
use crate::types::{
    EmptyPayload, ErrorResponse, ImportPhase, ImportProgressUpdate, ImportResultResponse, Request,
    SelectFileRequest, SessionRequest, SuccessResponse, TemplateResponse, UploadedFile,
};

pub const IMPORT_PROGRESS_PREFIX: &str = "wedding.guest.import.progress";

/// State shared by all import handlers
pub struct ImportContext {
    pub client: Client,
    pub sessions: ImportSessions,
    pub importer: GuestImporter,
    pub store: Arc<dyn GuestStore>,
}

impl ImportContext {
    pub fn new(client: Client, importer: GuestImporter, store: Arc<dyn GuestStore>) -> Self {
        Self {
            client,
            sessions: ImportSessions::new(),
            importer,
            store,
        }
    }

    fn session(&self, user_id: Uuid, event_id: Uuid) -> ImportSession {
        self.sessions.get_or_create(user_id, event_id)
    }

    pub async fn publish_progress(&self, event_id: Uuid, phase: ImportPhase) -> Result<()> {
        let update = ImportProgressUpdate::new(event_id, phase);
        let subject = format!("{}.{}", IMPORT_PROGRESS_PREFIX, event_id);
        let payload = serde_json::to_vec(&update)?;
        self.client.publish(subject, payload.into()).await?;
        Ok(())
    }

    async fn reply<T: Serialize>(&self, reply: async_nats::Subject, body: &T) -> Result<()> {
        self.client.publish(reply, serde_json::to_vec(body)?.into()).await?;
        Ok(())
    }
}

/// Decoded envelope plus the caller identity
struct Authorized<T> {
    request_id: Uuid,
    user_id: Uuid,
    payload: T,
}

/// Parse the envelope and require `userId`
fn authorize<T: DeserializeOwned>(payload: &[u8]) -> Result<Authorized<T>, ErrorResponse> {
    let request: Request<T> = serde_json::from_slice(payload)
        .map_err(|e| ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string()))?;

    match request.user_id {
        Some(user_id) => Ok(Authorized {
            request_id: request.id,
            user_id,
            payload: request.payload,
        }),
        None => Err(ErrorResponse::new(request.id, "UNAUTHORIZED", "user_id required")),
    }
}

/// Wire form of an import failure; storage failures list the committed guest ids
pub fn import_error_response(request_id: Uuid, err: &ImportError) -> ErrorResponse {
    let response = ErrorResponse::new(request_id, err.code(), err.to_string());
    match err {
        ImportError::Storage { committed, .. } => {
            response.with_details(serde_json::json!({ "committedGuestIds": committed }))
        }
        _ => response,
    }
}

fn decode_content(content_base64: &str) -> Result<Vec<u8>, ErrorResponse> {
    base64::engine::general_purpose::STANDARD
        .decode(content_base64.trim())
        .map_err(|e| {
            ErrorResponse::new(
                Uuid::nil(),
                "INVALID_REQUEST",
                format!("File content is not valid base64: {}", e),
            )
        })
}

/// Handle wedding.guest.import.select
pub async fn handle_select(mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received guest.import.select message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Authorized<SelectFileRequest> = match authorize(&msg.payload) {
            Ok(req) => req,
            Err(error) => {
                let _ = ctx.reply(reply, &error).await;
                continue;
            }
        };

        let bytes = match decode_content(&request.payload.content_base64) {
            Ok(bytes) => bytes,
            Err(mut error) => {
                error.id = request.request_id;
                let _ = ctx.reply(reply, &error).await;
                continue;
            }
        };

        let session = ctx.session(request.user_id, request.payload.event_id);
        let file = UploadedFile::new(request.payload.filename, bytes);
        match session.select_file(file) {
            Ok(status) => {
                let response = SuccessResponse::new(request.request_id, status);
                let _ = ctx.reply(reply, &response).await;
            }
            Err(e) => {
                let _ = ctx.reply(reply, &import_error_response(request.request_id, &e)).await;
            }
        }
    }

    Ok(())
}

/// Handle wedding.guest.import.process
///
/// Each request runs in its own task so a long parse does not hold up the
/// subscription.
pub async fn handle_process(mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received guest.import.process message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Authorized<SessionRequest> = match authorize(&msg.payload) {
            Ok(req) => req,
            Err(error) => {
                let _ = ctx.reply(reply, &error).await;
                continue;
            }
        };

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            if let Err(e) = process_one(&ctx, reply, request).await {
                error!("Failed to answer guest.import.process: {}", e);
            }
        });
    }

    Ok(())
}

async fn process_one(
    ctx: &Arc<ImportContext>,
    reply: async_nats::Subject,
    request: Authorized<SessionRequest>,
) -> Result<()> {
    let event_id = request.payload.event_id;
    let session = ctx.session(request.user_id, event_id);

    let (tx, mut rx) = mpsc::unbounded_channel::<ImportPhase>();
    let forwarder = {
        let ctx = Arc::clone(ctx);
        tokio::spawn(async move {
            while let Some(phase) = rx.recv().await {
                if let Err(e) = ctx.publish_progress(event_id, phase).await {
                    warn!("Failed to publish import progress: {}", e);
                }
            }
        })
    };

    let outcome = session
        .process(&ctx.importer, move |phase| {
            let _ = tx.send(phase);
        })
        .await;
    // The sender lives in the progress callback, so the forwarder ends once the parse does
    let _ = forwarder.await;

    match outcome {
        Ok(result) => {
            info!(
                "Processed '{}' for event {}: {} valid, {} rejected",
                result.filename,
                event_id,
                result.valid_guests.len(),
                result.invalid_rows.len()
            );
            let response = SuccessResponse::new(
                request.request_id,
                ImportResultResponse {
                    summary: result.summary(),
                    valid_guests: result.valid_guests.clone(),
                    invalid_rows: result.invalid_rows.clone(),
                    report: result.report(),
                },
            );
            ctx.reply(reply, &response).await
        }
        Err(e) => {
            warn!("Processing guest import for event {} failed: {}", event_id, e);
            ctx.reply(reply, &import_error_response(request.request_id, &e)).await
        }
    }
}

/// Handle wedding.guest.import.confirm
pub async fn handle_confirm(mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received guest.import.confirm message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Authorized<SessionRequest> = match authorize(&msg.payload) {
            Ok(req) => req,
            Err(error) => {
                let _ = ctx.reply(reply, &error).await;
                continue;
            }
        };

        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let event_id = request.payload.event_id;
            let session = ctx.session(request.user_id, event_id);
            let body = match session.confirm(ctx.store.as_ref(), event_id).await {
                Ok(response) => serde_json::to_vec(&SuccessResponse::new(request.request_id, response)),
                Err(e) => {
                    error!("Confirming guest import for event {} failed: {}", event_id, e);
                    serde_json::to_vec(&import_error_response(request.request_id, &e))
                }
            };
            match body {
                Ok(body) => {
                    let _ = ctx.client.publish(reply, body.into()).await;
                }
                Err(e) => error!("Failed to serialize confirm response: {}", e),
            }
        });
    }

    Ok(())
}

/// Handle wedding.guest.import.cancel
pub async fn handle_cancel(mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received guest.import.cancel message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Authorized<SessionRequest> = match authorize(&msg.payload) {
            Ok(req) => req,
            Err(error) => {
                let _ = ctx.reply(reply, &error).await;
                continue;
            }
        };

        let session = ctx.session(request.user_id, request.payload.event_id);
        match session.cancel() {
            Ok(status) => {
                info!("Guest import for event {} cancelled", request.payload.event_id);
                let _ = ctx.reply(reply, &SuccessResponse::new(request.request_id, status)).await;
            }
            Err(e) => {
                let _ = ctx.reply(reply, &import_error_response(request.request_id, &e)).await;
            }
        }
    }

    Ok(())
}

/// Handle wedding.guest.import.status
pub async fn handle_status(mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => continue,
        };

        let request: Authorized<SessionRequest> = match authorize(&msg.payload) {
            Ok(req) => req,
            Err(error) => {
                let _ = ctx.reply(reply, &error).await;
                continue;
            }
        };

        let status = ctx
            .sessions
            .get(request.user_id, request.payload.event_id)
            .map(|s| s.status())
            .unwrap_or(crate::types::ImportSessionStatus::Idle);
        let _ = ctx.reply(reply, &SuccessResponse::new(request.request_id, status)).await;
    }

    Ok(())
}

/// Handle wedding.guest.import.template
pub async fn handle_template(mut subscriber: Subscriber, ctx: Arc<ImportContext>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received guest.import.template message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => continue,
        };

        let request_id = serde_json::from_slice::<Request<EmptyPayload>>(&msg.payload)
            .map(|r| r.id)
            .unwrap_or_else(|_| Uuid::nil());

        match template_csv() {
            Ok(bytes) => {
                let response = SuccessResponse::new(
                    request_id,
                    TemplateResponse {
                        filename: TEMPLATE_FILENAME.to_string(),
                        content_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
                    },
                );
                let _ = ctx.reply(reply, &response).await;
            }
            Err(e) => {
                error!("Failed to render guest template: {}", e);
                let error = ErrorResponse::new(request_id, "INTERNAL", e.to_string());
                let _ = ctx.reply(reply, &error).await;
            }
        }
    }

    Ok(())
}
