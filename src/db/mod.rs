// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Persistence layer.
//!
//! The sync engine treats the store as a black box of upsert/query
//! primitives. `FirestoreDb` is the production backend; `MemoryStore` backs
//! tests and offline runs.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreDb;
pub use memory::MemoryStore;

use crate::error::SyncError;
use crate::models::{ActivityRecord, PhotoRecord, StoredActivity, StoredCredential};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Collection names as constants.
pub mod collections {
    pub const ACTIVITIES: &str = "activities";
    pub const PHOTOS: &str = "activity_photos";
    /// Per-user sync bookkeeping (last successful sync)
    pub const SYNC_STATE: &str = "sync_state";
    /// Encrypted provider credentials (keyed by user_id)
    pub const CREDENTIALS: &str = "credentials";
}

/// Store operations the sync engine relies on.
#[async_trait]
pub trait SyncStore: Send + Sync {
    /// Insert activities, skipping any whose natural key already exists.
    /// Returns the number of rows actually written.
    async fn bulk_insert_activities(&self, records: &[ActivityRecord]) -> Result<usize, SyncError>;

    /// Insert photos, skipping existing `provider_photo_id`s.
    /// Returns the number of rows actually written.
    async fn bulk_insert_photos(&self, records: &[PhotoRecord]) -> Result<usize, SyncError>;

    async fn find_activity(
        &self,
        user_id: &str,
        provider_activity_id: u64,
    ) -> Result<Option<StoredActivity>, SyncError>;

    async fn find_with_nonzero_photo_count(
        &self,
        user_id: &str,
    ) -> Result<Vec<StoredActivity>, SyncError>;

    /// Advance the "last successful sync" marker.
    async fn update_last_sync_timestamp(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError>;

    async fn last_sync_timestamp(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SyncError>;

    async fn get_credential(&self, user_id: &str) -> Result<Option<StoredCredential>, SyncError>;

    async fn set_credential(
        &self,
        user_id: &str,
        credential: &StoredCredential,
    ) -> Result<(), SyncError>;
}
