// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Create-or-skip persistence on natural keys.
//!
//! The returned count is what the store actually wrote. Callers gate the
//! "last successful sync" marker on it being nonzero.

use crate::db::SyncStore;
use crate::error::SyncError;
use crate::models::{ActivityRecord, PhotoRecord};
use std::sync::Arc;

#[derive(Clone)]
pub struct DedupInserter {
    store: Arc<dyn SyncStore>,
}

impl DedupInserter {
    pub fn new(store: Arc<dyn SyncStore>) -> Self {
        Self { store }
    }

    pub async fn insert_activities(&self, records: &[ActivityRecord]) -> Result<usize, SyncError> {
        if records.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.bulk_insert_activities(records).await?;
        tracing::debug!(
            requested = records.len(),
            inserted,
            skipped = records.len().saturating_sub(inserted),
            "Activity batch persisted"
        );
        Ok(inserted)
    }

    pub async fn insert_photos(&self, records: &[PhotoRecord]) -> Result<usize, SyncError> {
        if records.is_empty() {
            return Ok(0);
        }

        let inserted = self.store.bulk_insert_photos(records).await?;
        tracing::debug!(requested = records.len(), inserted, "Photo batch persisted");
        Ok(inserted)
    }
}
