// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store with the same dedup semantics as Firestore.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{ActivityRecord, PhotoRecord, StoredActivity, StoredCredential};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Tables {
    /// Keyed by natural key; value keeps insertion order via internal id.
    activities: BTreeMap<String, StoredActivity>,
    photos: BTreeMap<String, PhotoRecord>,
    last_sync: HashMap<String, DateTime<Utc>>,
    credentials: HashMap<String, StoredCredential>,
    next_id: u64,
}

/// Memory-backed `SyncStore`.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    /// Number of bulk insert calls that reached the store
    insert_calls: AtomicUsize,
    /// When set, every write fails as if the store were unreachable
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, SyncError> {
        self.tables
            .lock()
            .map_err(|_| SyncError::Store("memory store lock poisoned".to_string()))
    }

    fn check_available(&self) -> Result<(), SyncError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SyncError::Store("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Simulate an outage for writes.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn insert_calls(&self) -> usize {
        self.insert_calls.load(Ordering::SeqCst)
    }

    /// All stored activities for a user, ordered by natural key.
    pub fn activities_for(&self, user_id: &str) -> Vec<ActivityRecord> {
        self.tables
            .lock()
            .map(|t| {
                t.activities
                    .values()
                    .filter(|a| a.record.user_id == user_id)
                    .map(|a| a.record.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn photos(&self) -> Vec<PhotoRecord> {
        self.tables
            .lock()
            .map(|t| t.photos.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn bulk_insert_activities(&self, records: &[ActivityRecord]) -> Result<usize, SyncError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut tables = self.tables()?;
        let mut inserted = 0;
        for record in records {
            let key = record.natural_key();
            if tables.activities.contains_key(&key) {
                continue;
            }
            tables.next_id += 1;
            let internal_id = format!("act-{}", tables.next_id);
            tables.activities.insert(
                key,
                StoredActivity {
                    internal_id,
                    record: record.clone(),
                },
            );
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn bulk_insert_photos(&self, records: &[PhotoRecord]) -> Result<usize, SyncError> {
        self.insert_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let mut tables = self.tables()?;
        let mut inserted = 0;
        for record in records {
            let key = record.natural_key();
            if tables.photos.contains_key(&key) {
                continue;
            }
            tables.photos.insert(key, record.clone());
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn find_activity(
        &self,
        user_id: &str,
        provider_activity_id: u64,
    ) -> Result<Option<StoredActivity>, SyncError> {
        let key = crate::models::activity::activity_key(user_id, provider_activity_id);
        Ok(self.tables()?.activities.get(&key).cloned())
    }

    async fn find_with_nonzero_photo_count(
        &self,
        user_id: &str,
    ) -> Result<Vec<StoredActivity>, SyncError> {
        Ok(self
            .tables()?
            .activities
            .values()
            .filter(|a| a.record.user_id == user_id && a.record.counts.photos > 0)
            .cloned()
            .collect())
    }

    async fn update_last_sync_timestamp(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        self.check_available()?;
        self.tables()?.last_sync.insert(user_id.to_string(), at);
        Ok(())
    }

    async fn last_sync_timestamp(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        Ok(self.tables()?.last_sync.get(user_id).copied())
    }

    async fn get_credential(&self, user_id: &str) -> Result<Option<StoredCredential>, SyncError> {
        Ok(self.tables()?.credentials.get(user_id).cloned())
    }

    async fn set_credential(
        &self,
        user_id: &str,
        credential: &StoredCredential,
    ) -> Result<(), SyncError> {
        self.check_available()?;
        self.tables()?
            .credentials
            .insert(user_id.to_string(), credential.clone());
        Ok(())
    }
}
