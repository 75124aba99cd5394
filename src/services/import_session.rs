//! Import session state machine
//!
//! One session per (user, event). The session owns the selected file, the
//! in-flight parse and the parsed result until it is confirmed:
//!
//! ```text
//! Idle → FileSelected → Parsing → Parsed → Importing → Imported
//!                          └────→ Failed
//! ```
//!
//! Every parse is tagged with a generation number. Selecting another file or
//! cancelling bumps the generation and cancels the token, so a parse that
//! finishes late never overwrites newer state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ImportError;
use crate::services::guest_store::GuestStore;
use crate::services::importer::GuestImporter;
use crate::types::{
    ConfirmResponse, GuestRecord, ImportPhase, ImportResult, ImportSessionStatus, StoredGuest,
    UploadedFile,
};

/// Parsed result plus the guests an earlier confirm already stored
#[derive(Clone)]
struct ParsedImport {
    result: Arc<ImportResult>,
    committed: Vec<StoredGuest>,
}

impl ParsedImport {
    fn new(result: Arc<ImportResult>) -> Self {
        Self {
            result,
            committed: Vec::new(),
        }
    }

    /// Valid guests not stored yet, in record order
    fn pending(&self) -> Vec<GuestRecord> {
        let stored: HashSet<u32> = self.committed.iter().map(|g| g.record_id).collect();
        self.result
            .valid_guests
            .iter()
            .filter(|g| !stored.contains(&g.id))
            .cloned()
            .collect()
    }

    fn committed_ids(&self) -> Vec<u32> {
        self.committed.iter().map(|g| g.record_id).collect()
    }
}

enum SessionState {
    Idle,
    FileSelected(UploadedFile),
    Parsing {
        filename: String,
        token: CancellationToken,
    },
    Parsed(ParsedImport),
    Importing(ParsedImport),
    Imported(Vec<StoredGuest>),
    Failed(ImportError),
}

impl SessionState {
    fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::FileSelected(_) => "waiting to be processed",
            SessionState::Parsing { .. } => "parsing",
            SessionState::Parsed(_) => "parsed",
            SessionState::Importing(_) => "importing",
            SessionState::Imported(_) => "imported",
            SessionState::Failed(_) => "failed",
        }
    }

    fn status(&self) -> ImportSessionStatus {
        match self {
            SessionState::Idle => ImportSessionStatus::Idle,
            SessionState::FileSelected(file) => ImportSessionStatus::FileSelected {
                filename: file.filename.clone(),
                size_bytes: file.size(),
            },
            SessionState::Parsing { filename, .. } => ImportSessionStatus::Parsing {
                filename: filename.clone(),
            },
            SessionState::Parsed(parsed) => ImportSessionStatus::Parsed {
                summary: parsed.result.summary(),
            },
            SessionState::Importing(parsed) => ImportSessionStatus::Importing {
                guest_count: parsed.result.valid_guests.len(),
            },
            SessionState::Imported(stored) => ImportSessionStatus::Imported {
                imported_count: stored.len(),
            },
            SessionState::Failed(e) => ImportSessionStatus::Failed {
                code: e.code().to_string(),
                error: e.to_string(),
            },
        }
    }
}

struct Inner {
    state: SessionState,
    generation: u64,
}

/// Shared handle to one import session
#[derive(Clone)]
pub struct ImportSession {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ImportSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportSession {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                generation: 0,
            })),
        }
    }

    pub fn status(&self) -> ImportSessionStatus {
        self.inner.lock().state.status()
    }

    /// Parsed result, if the session holds one
    #[cfg(test)]
    fn result(&self) -> Option<Arc<ImportResult>> {
        match &self.inner.lock().state {
            SessionState::Parsed(parsed) | SessionState::Importing(parsed) => {
                Some(parsed.result.clone())
            }
            _ => None,
        }
    }

    /// Select a file, replacing whatever the session held.
    /// An unsupported extension leaves the session `Failed`.
    pub fn select_file(&self, file: UploadedFile) -> Result<ImportSessionStatus, ImportError> {
        let mut inner = self.inner.lock();
        if let SessionState::Importing(_) = inner.state {
            return Err(ImportError::InvalidState {
                action: "select a file",
                state: inner.state.label(),
            });
        }

        if let SessionState::Parsing { filename, token } = &inner.state {
            info!("Abandoning parse of '{}' for '{}'", filename, file.filename);
            token.cancel();
        }
        inner.generation += 1;

        match file.format() {
            Ok(format) => {
                debug!("Selected '{}' ({:?}, {} bytes)", file.filename, format, file.size());
                inner.state = SessionState::FileSelected(file);
                Ok(inner.state.status())
            }
            Err(e) => {
                warn!("Rejected '{}': {}", file.filename, e);
                inner.state = SessionState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Run the pipeline on the selected file.
    ///
    /// The parse runs on a blocking thread. Its outcome is applied only if no
    /// newer selection or cancel happened meanwhile; otherwise the call ends
    /// with `ImportError::Cancelled`. Phases reported after that point are
    /// not passed on to `progress`.
    pub async fn process<F>(
        &self,
        importer: &GuestImporter,
        mut progress: F,
    ) -> Result<Arc<ImportResult>, ImportError>
    where
        F: FnMut(ImportPhase) + Send + 'static,
    {
        let (file, token, generation) = {
            let mut inner = self.inner.lock();
            let file = match std::mem::replace(&mut inner.state, SessionState::Idle) {
                SessionState::FileSelected(file) => file,
                other => {
                    let state = other.label();
                    inner.state = other;
                    return Err(ImportError::InvalidState {
                        action: "process the file",
                        state,
                    });
                }
            };
            let token = CancellationToken::new();
            inner.generation += 1;
            inner.state = SessionState::Parsing {
                filename: file.filename.clone(),
                token: token.clone(),
            };
            (file, token, inner.generation)
        };

        let session = Arc::clone(&self.inner);
        let progress = move |phase: ImportPhase| {
            let current = session.lock().generation == generation;
            if current {
                progress(phase);
            }
        };

        let filename = file.filename.clone();
        let importer = importer.clone();
        let outcome = tokio::task::spawn_blocking(move || importer.run(&file, &token, progress))
            .await
            .unwrap_or_else(|e| Err(ImportError::parse_failure(&filename, format!("parser task failed: {}", e))));

        let mut inner = self.inner.lock();
        let current = inner.generation == generation
            && matches!(inner.state, SessionState::Parsing { .. });
        if !current {
            warn!("Discarding stale parse of '{}'", filename);
            return Err(ImportError::Cancelled);
        }

        match outcome {
            Ok(result) => {
                let result = Arc::new(result);
                inner.state = SessionState::Parsed(ParsedImport::new(result.clone()));
                Ok(result)
            }
            Err(ImportError::Cancelled) => {
                inner.state = SessionState::Idle;
                Err(ImportError::Cancelled)
            }
            Err(e) => {
                inner.state = SessionState::Failed(e.clone());
                Err(e)
            }
        }
    }

    /// Drop the session contents and cancel any in-flight parse
    pub fn cancel(&self) -> Result<ImportSessionStatus, ImportError> {
        let mut inner = self.inner.lock();
        match &inner.state {
            SessionState::Importing(_) => {
                return Err(ImportError::InvalidState {
                    action: "cancel",
                    state: inner.state.label(),
                })
            }
            SessionState::Parsing { filename, token } => {
                info!("Cancelling parse of '{}'", filename);
                token.cancel();
            }
            _ => {}
        }
        inner.generation += 1;
        inner.state = SessionState::Idle;
        Ok(ImportSessionStatus::Idle)
    }

    /// Hand the valid guests to the store in one call.
    ///
    /// A failed store call puts the result back for another attempt. Guests the
    /// store reported as committed are remembered and left out of the retry.
    pub async fn confirm(
        &self,
        store: &dyn GuestStore,
        event_id: Uuid,
    ) -> Result<ConfirmResponse, ImportError> {
        let (mut parsed, guard) = {
            let mut inner = self.inner.lock();
            let parsed = match &inner.state {
                SessionState::Parsed(parsed) => parsed.clone(),
                other => {
                    return Err(ImportError::InvalidState {
                        action: "confirm the import",
                        state: other.label(),
                    })
                }
            };
            inner.state = SessionState::Importing(parsed.clone());
            let guard = ImportingGuard {
                inner: Arc::clone(&self.inner),
                restore: Some(parsed.clone()),
            };
            (parsed, guard)
        };

        let pending = parsed.pending();
        info!(
            "Storing {} guests for event {} via {} ({} already stored)",
            pending.len(),
            event_id,
            store.name(),
            parsed.committed.len()
        );
        let outcome = store.insert_guests(event_id, &pending).await;
        guard.disarm();

        let mut inner = self.inner.lock();
        match outcome {
            Ok(stored) => {
                let mut guests = std::mem::take(&mut parsed.committed);
                guests.extend(stored);
                guests.sort_by_key(|g| g.record_id);
                info!("Imported {} guests for event {}", guests.len(), event_id);
                inner.state = SessionState::Imported(guests.clone());
                Ok(ConfirmResponse {
                    event_id,
                    imported_count: guests.len(),
                    guests,
                })
            }
            Err(e) => {
                parsed.committed.extend(e.committed().iter().copied());
                warn!(
                    "Storing guests for event {} failed, {} committed so far: {}",
                    event_id,
                    parsed.committed.len(),
                    e
                );
                let err = ImportError::Storage {
                    committed: parsed.committed_ids(),
                    message: e.to_string(),
                };
                inner.state = SessionState::Parsed(parsed);
                Err(err)
            }
        }
    }
}

/// Puts an `Importing` session back to `Parsed` if the confirm future is
/// dropped or the store panics before an outcome is recorded.
struct ImportingGuard {
    inner: Arc<Mutex<Inner>>,
    restore: Option<ParsedImport>,
}

impl ImportingGuard {
    fn disarm(mut self) {
        self.restore = None;
    }
}

impl Drop for ImportingGuard {
    fn drop(&mut self) {
        let Some(parsed) = self.restore.take() else {
            return;
        };
        let mut inner = self.inner.lock();
        if matches!(inner.state, SessionState::Importing(_)) {
            warn!("Confirm was interrupted, returning session to parsed");
            inner.state = SessionState::Parsed(parsed);
        }
    }
}

/// Sessions keyed by (user, event)
#[derive(Clone, Default)]
pub struct ImportSessions {
    sessions: Arc<Mutex<HashMap<(Uuid, Uuid), ImportSession>>>,
}

impl ImportSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, user_id: Uuid, event_id: Uuid) -> ImportSession {
        self.sessions
            .lock()
            .entry((user_id, event_id))
            .or_default()
            .clone()
    }

    pub fn get(&self, user_id: Uuid, event_id: Uuid) -> Option<ImportSession> {
        self.sessions.lock().get(&(user_id, event_id)).cloned()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::services::guest_store::MemoryGuestStore;
    use async_trait::async_trait;
    use std::sync::mpsc;

    /// Store whose insert never completes
    struct StalledStore;

    #[async_trait]
    impl GuestStore for StalledStore {
        async fn insert_guests(
            &self,
            _event_id: Uuid,
            _guests: &[GuestRecord],
        ) -> Result<Vec<StoredGuest>, StoreError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    const GUESTS_CSV: &str = "Name,Email\nJohn Smith,john@example.com\n,bad-email\nJane Doe,jane@example.com\n";

    fn csv(name: &str, content: &str) -> UploadedFile {
        UploadedFile::new(name, content.as_bytes().to_vec())
    }

    async fn parsed_session() -> ImportSession {
        let session = ImportSession::new();
        session.select_file(csv("guests.csv", GUESTS_CSV)).unwrap();
        session.process(&GuestImporter::default(), |_| {}).await.unwrap();
        session
    }

    #[tokio::test]
    async fn test_select_and_process_reaches_parsed() {
        let session = ImportSession::new();
        let status = session.select_file(csv("guests.csv", GUESTS_CSV)).unwrap();
        assert!(matches!(status, ImportSessionStatus::FileSelected { ref filename, .. } if filename == "guests.csv"));

        let result = session.process(&GuestImporter::default(), |_| {}).await.unwrap();
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.valid_guests.len(), 2);

        match session.status() {
            ImportSessionStatus::Parsed { summary } => {
                assert_eq!(summary.valid_count, 2);
                assert_eq!(summary.invalid_count, 1);
            }
            other => panic!("unexpected status {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unsupported_file_moves_to_failed() {
        let session = ImportSession::new();
        let err = session.select_file(csv("guests.pdf", GUESTS_CSV)).unwrap_err();
        assert!(matches!(err, ImportError::UnsupportedFormat { .. }));
        assert!(matches!(
            session.status(),
            ImportSessionStatus::Failed { ref code, .. } if code == "UNSUPPORTED_FORMAT"
        ));

        // No retry from Failed, only a new selection
        let err = session.process(&GuestImporter::default(), |_| {}).await.unwrap_err();
        assert!(matches!(err, ImportError::InvalidState { .. }));
        session.select_file(csv("guests.csv", GUESTS_CSV)).unwrap();
        assert!(session.process(&GuestImporter::default(), |_| {}).await.is_ok());
    }

    #[tokio::test]
    async fn test_parse_failure_moves_to_failed() {
        let session = ImportSession::new();
        session
            .select_file(UploadedFile::new("guests.csv", vec![0xff, 0xfe, 0xfd]))
            .unwrap();
        let err = session.process(&GuestImporter::default(), |_| {}).await.unwrap_err();
        assert!(matches!(err, ImportError::ParseFailure { .. }));
        assert!(matches!(
            session.status(),
            ImportSessionStatus::Failed { ref code, .. } if code == "PARSE_FAILURE"
        ));
    }

    #[tokio::test]
    async fn test_process_requires_selected_file() {
        let session = ImportSession::new();
        let err = session.process(&GuestImporter::default(), |_| {}).await.unwrap_err();
        assert_eq!(
            err,
            ImportError::InvalidState {
                action: "process the file",
                state: "idle"
            }
        );
        assert_eq!(session.status(), ImportSessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_new_selection_discards_running_parse() {
        let session = ImportSession::new();
        session.select_file(csv("first.csv", GUESTS_CSV)).unwrap();

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let forwarded = Arc::new(Mutex::new(Vec::new()));
        let progress = {
            let forwarded = Arc::clone(&forwarded);
            move |phase: ImportPhase| {
                forwarded.lock().push(phase);
                if phase == ImportPhase::Reading {
                    started_tx.send(()).ok();
                    release_rx.recv().ok();
                }
            }
        };

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.process(&GuestImporter::default(), progress).await })
        };
        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(session.status(), ImportSessionStatus::Parsing { .. }));

        session.select_file(csv("second.csv", "Name,Email\nA,a@x.com\n")).unwrap();
        release_tx.send(()).unwrap();

        let outcome = running.await.unwrap();
        assert_eq!(outcome.unwrap_err(), ImportError::Cancelled);
        // Phases of the abandoned parse stop at the new selection
        assert_eq!(*forwarded.lock(), vec![ImportPhase::Reading]);
        assert!(matches!(
            session.status(),
            ImportSessionStatus::FileSelected { ref filename, .. } if filename == "second.csv"
        ));

        let result = session.process(&GuestImporter::default(), |_| {}).await.unwrap();
        assert_eq!(result.filename, "second.csv");
        assert_eq!(result.total_rows, 1);
    }

    #[tokio::test]
    async fn test_cancel_during_parse_returns_to_idle() {
        let session = ImportSession::new();
        session.select_file(csv("guests.csv", GUESTS_CSV)).unwrap();

        let (started_tx, started_rx) = mpsc::channel::<()>();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let progress = move |phase: ImportPhase| {
            if phase == ImportPhase::Parsing {
                started_tx.send(()).ok();
                release_rx.recv().ok();
            }
        };

        let running = {
            let session = session.clone();
            tokio::spawn(async move { session.process(&GuestImporter::default(), progress).await })
        };
        tokio::task::spawn_blocking(move || started_rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(session.cancel().unwrap(), ImportSessionStatus::Idle);
        release_tx.send(()).unwrap();

        assert_eq!(running.await.unwrap().unwrap_err(), ImportError::Cancelled);
        assert_eq!(session.status(), ImportSessionStatus::Idle);
        assert!(session.result().is_none());
    }

    #[tokio::test]
    async fn test_cancel_from_parsed_drops_result() {
        let session = parsed_session().await;
        assert!(session.result().is_some());
        session.cancel().unwrap();
        assert_eq!(session.status(), ImportSessionStatus::Idle);
        assert!(session.result().is_none());
    }

    #[tokio::test]
    async fn test_reselect_from_parsed() {
        let session = parsed_session().await;
        session.select_file(csv("other.csv", "Name,Email\nA,a@x.com\n")).unwrap();
        assert!(matches!(session.status(), ImportSessionStatus::FileSelected { .. }));
        assert!(session.result().is_none());
    }

    #[tokio::test]
    async fn test_confirm_stores_exactly_the_valid_guests() {
        let session = parsed_session().await;
        let store = MemoryGuestStore::new();
        let event_id = Uuid::new_v4();
        let result = session.result().unwrap();

        let response = session.confirm(&store, event_id).await.unwrap();

        assert_eq!(response.imported_count, 2);
        assert_eq!(response.event_id, event_id);
        let ids: Vec<u32> = response.guests.iter().map(|g| g.record_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.guests(event_id), result.valid_guests);
        assert_eq!(
            session.status(),
            ImportSessionStatus::Imported { imported_count: 2 }
        );
        assert!(session.result().is_none());
    }

    #[tokio::test]
    async fn test_confirm_requires_parsed_state() {
        let session = ImportSession::new();
        session.select_file(csv("guests.csv", GUESTS_CSV)).unwrap();
        let err = session
            .confirm(&MemoryGuestStore::new(), Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::InvalidState { action: "confirm the import", .. }));
    }

    #[tokio::test]
    async fn test_failed_store_keeps_result_for_retry() {
        let session = parsed_session().await;
        let store = MemoryGuestStore::failing_after(0);
        let event_id = Uuid::new_v4();

        let err = session.confirm(&store, event_id).await.unwrap_err();
        match err {
            ImportError::Storage { committed, .. } => assert!(committed.is_empty()),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(session.status(), ImportSessionStatus::Parsed { .. }));

        let response = session.confirm(&store, event_id).await.unwrap();
        assert_eq!(response.imported_count, 2);
        assert_eq!(store.guests(event_id).len(), 2);
    }

    #[tokio::test]
    async fn test_partial_store_failure_lists_committed_ids() {
        let session = parsed_session().await;
        let store = MemoryGuestStore::failing_after(1);

        let err = session.confirm(&store, Uuid::new_v4()).await.unwrap_err();

        assert_eq!(err.code(), "STORAGE_FAILURE");
        match err {
            ImportError::Storage { committed, .. } => assert_eq!(committed, vec![1]),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(session.status(), ImportSessionStatus::Parsed { .. }));
    }

    #[tokio::test]
    async fn test_retry_after_partial_failure_stores_only_the_rest() {
        let session = parsed_session().await;
        let store = MemoryGuestStore::failing_after(1);
        let event_id = Uuid::new_v4();
        let valid = session.result().unwrap().valid_guests.clone();

        let err = session.confirm(&store, event_id).await.unwrap_err();
        assert!(matches!(err, ImportError::Storage { ref committed, .. } if committed == &vec![1]));
        assert_eq!(store.guests(event_id).len(), 1);

        let response = session.confirm(&store, event_id).await.unwrap();

        assert_eq!(response.imported_count, 2);
        let ids: Vec<u32> = response.guests.iter().map(|g| g.record_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(store.guests(event_id), valid);
        assert_eq!(
            session.status(),
            ImportSessionStatus::Imported { imported_count: 2 }
        );
    }

    #[tokio::test]
    async fn test_dropped_confirm_returns_session_to_parsed() {
        let session = parsed_session().await;
        let event_id = Uuid::new_v4();

        let mut confirming = Box::pin(session.confirm(&StalledStore, event_id));
        assert!(futures::poll!(confirming.as_mut()).is_pending());
        assert_eq!(
            session.status(),
            ImportSessionStatus::Importing { guest_count: 2 }
        );
        assert!(session.cancel().is_err());

        drop(confirming);
        assert!(matches!(session.status(), ImportSessionStatus::Parsed { .. }));

        let store = MemoryGuestStore::new();
        let response = session.confirm(&store, event_id).await.unwrap();
        assert_eq!(response.imported_count, 2);
        assert_eq!(store.guests(event_id).len(), 2);
    }

    #[test]
    fn test_registry_keys_sessions_by_user_and_event() {
        let sessions = ImportSessions::new();
        let user = Uuid::new_v4();
        let event_a = Uuid::new_v4();
        let event_b = Uuid::new_v4();

        let a = sessions.get_or_create(user, event_a);
        a.select_file(csv("guests.csv", GUESTS_CSV)).unwrap();

        assert!(matches!(
            sessions.get_or_create(user, event_a).status(),
            ImportSessionStatus::FileSelected { .. }
        ));
        assert_eq!(sessions.get_or_create(user, event_b).status(), ImportSessionStatus::Idle);
        assert!(sessions.get(Uuid::new_v4(), event_a).is_none());
        assert_eq!(sessions.len(), 2);
    }
}
