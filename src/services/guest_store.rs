//! Guest storage abstraction
//!
//! Confirmed imports are handed to a `GuestStore` as one batch:
//! - `PgGuestStore` writes the batch in a single transaction (all-or-nothing)
//! - `MemoryGuestStore` keeps guests in process (tests, dry runs)
//!
//! Configuration via GUEST_STORE_BACKEND env variable:
//! - "postgres" → PgGuestStore
//! - "memory" → MemoryGuestStore

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{Config, StoreBackend};
use crate::db::queries;
use crate::error::StoreError;
use crate::types::{GuestRecord, StoredGuest};

/// GuestStore trait - abstraction for all guest storage implementations
#[async_trait]
pub trait GuestStore: Send + Sync {
    /// Store every guest of the batch for an event.
    /// On failure, `StoreError::committed` lists the records that were kept anyway.
    async fn insert_guests(
        &self,
        event_id: Uuid,
        guests: &[GuestRecord],
    ) -> Result<Vec<StoredGuest>, StoreError>;

    /// Get the name of this store implementation
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RsvpStatus, DEFAULT_DIETARY_RESTRICTIONS};

    fn guest(id: u32, name: &str) -> GuestRecord {
        GuestRecord {
            id,
            name: name.to_string(),
            email: format!("{}@example.com", name.to_lowercase()),
            phone: None,
            rsvp_status: RsvpStatus::Pending,
            arrival_date: None,
            arrival_time: None,
            departure_date: None,
            departure_time: None,
            room_number: None,
            room_type: None,
            dietary_restrictions: DEFAULT_DIETARY_RESTRICTIONS.to_string(),
            plus_one: None,
            transport_needed: false,
            special_requests: None,
            events: vec![],
        }
    }

    #[tokio::test]
    async fn memory_store_keeps_every_guest() {
        let store = MemoryGuestStore::new();
        let event_id = Uuid::new_v4();
        let guests = vec![guest(1, "Anna"), guest(2, "Boris"), guest(3, "Cyril")];

        let stored = store.insert_guests(event_id, &guests).await.unwrap();

        assert_eq!(stored.len(), 3);
        let record_ids: Vec<u32> = stored.iter().map(|s| s.record_id).collect();
        assert_eq!(record_ids, vec![1, 2, 3]);
        assert_eq!(store.guests(event_id), guests);
    }

    #[tokio::test]
    async fn memory_store_separates_events() {
        let store = MemoryGuestStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        store.insert_guests(first, &[guest(1, "Anna")]).await.unwrap();
        store.insert_guests(second, &[guest(1, "Boris"), guest(2, "Cyril")]).await.unwrap();

        assert_eq!(store.guests(first).len(), 1);
        assert_eq!(store.guests(second).len(), 2);
        assert!(store.guests(Uuid::new_v4()).is_empty());
    }

    #[tokio::test]
    async fn memory_store_failing_after_reports_partial_commit() {
        let store = MemoryGuestStore::failing_after(2);
        let event_id = Uuid::new_v4();
        let guests = vec![guest(1, "Anna"), guest(2, "Boris"), guest(3, "Cyril")];

        let err = store.insert_guests(event_id, &guests).await.unwrap_err();

        let committed: Vec<u32> = err.committed().iter().map(|g| g.record_id).collect();
        assert_eq!(committed, vec![1, 2]);
        assert_eq!(store.guests(event_id).len(), 2);
    }

    #[tokio::test]
    async fn memory_store_failing_after_zero_commits_nothing() {
        let store = MemoryGuestStore::failing_after(0);
        let err = store.insert_guests(Uuid::new_v4(), &[guest(1, "Anna")]).await.unwrap_err();
        assert!(matches!(err, StoreError::Failed { .. }));
        assert!(err.committed().is_empty());
    }

    #[tokio::test]
    async fn memory_store_failure_budget_is_spent_once() {
        let store = MemoryGuestStore::failing_after(1);
        let event_id = Uuid::new_v4();
        let guests = vec![guest(1, "Anna"), guest(2, "Boris")];

        assert!(store.insert_guests(event_id, &guests).await.is_err());
        let stored = store.insert_guests(event_id, &guests[1..]).await.unwrap();

        assert_eq!(stored.len(), 1);
        assert_eq!(store.guests(event_id).len(), 2);
    }

    #[test]
    fn memory_store_name() {
        assert_eq!(MemoryGuestStore::new().name(), "memory");
    }
}

// ==========================================================================
// PgGuestStore Implementation
// ==========================================================================

/// PostgreSQL-backed store; one transaction per batch
pub struct PgGuestStore {
    pool: PgPool,
}

impl PgGuestStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GuestStore for PgGuestStore {
    async fn insert_guests(
        &self,
        event_id: Uuid,
        guests: &[GuestRecord],
    ) -> Result<Vec<StoredGuest>, StoreError> {
        queries::guest::insert_guest_batch(&self.pool, event_id, guests)
            .await
            .map_err(|e| StoreError::Failed {
                message: format!("{:#}", e),
            })
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}

// ==========================================================================
// MemoryGuestStore Implementation
// ==========================================================================

/// In-process store. Optionally fails once after a number of records, keeping
/// the ones it already accepted.
pub struct MemoryGuestStore {
    guests: RwLock<HashMap<Uuid, Vec<GuestRecord>>>,
    fail_after: RwLock<Option<usize>>,
}

impl MemoryGuestStore {
    pub fn new() -> Self {
        Self {
            guests: RwLock::new(HashMap::new()),
            fail_after: RwLock::new(None),
        }
    }

    /// Store that accepts `limit` records of the next batch and then fails
    #[cfg(test)]
    pub fn failing_after(limit: usize) -> Self {
        Self {
            guests: RwLock::new(HashMap::new()),
            fail_after: RwLock::new(Some(limit)),
        }
    }

    /// Guests stored for an event, in insertion order
    #[cfg(test)]
    pub fn guests(&self, event_id: Uuid) -> Vec<GuestRecord> {
        self.guests.read().get(&event_id).cloned().unwrap_or_default()
    }
}

impl Default for MemoryGuestStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GuestStore for MemoryGuestStore {
    async fn insert_guests(
        &self,
        event_id: Uuid,
        guests: &[GuestRecord],
    ) -> Result<Vec<StoredGuest>, StoreError> {
        let limit = self.fail_after.write().take();
        let accepted = match limit {
            Some(limit) if limit < guests.len() => &guests[..limit],
            _ => guests,
        };

        let stored: Vec<StoredGuest> = accepted
            .iter()
            .map(|g| StoredGuest {
                record_id: g.id,
                guest_id: Uuid::new_v4(),
            })
            .collect();
        self.guests
            .write()
            .entry(event_id)
            .or_default()
            .extend(accepted.iter().cloned());

        if accepted.len() == guests.len() {
            return Ok(stored);
        }

        let message = format!(
            "store accepted {} of {} guests",
            accepted.len(),
            guests.len()
        );
        if stored.is_empty() {
            Err(StoreError::Failed { message })
        } else {
            Err(StoreError::Partial {
                committed: stored,
                message,
            })
        }
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ==========================================================================
// Factory
// ==========================================================================

/// Create the store configured by GUEST_STORE_BACKEND
pub fn create_guest_store(config: &Config, pool: Option<PgPool>) -> anyhow::Result<Box<dyn GuestStore>> {
    match (config.store_backend, pool) {
        (StoreBackend::Postgres, Some(pool)) => {
            tracing::info!("Using PgGuestStore");
            Ok(Box::new(PgGuestStore::new(pool)))
        }
        (StoreBackend::Postgres, None) => {
            anyhow::bail!("postgres guest store needs a database connection")
        }
        (StoreBackend::Memory, _) => {
            tracing::warn!("Using MemoryGuestStore, guests are not persisted");
            Ok(Box::new(MemoryGuestStore::new()))
        }
    }
}
