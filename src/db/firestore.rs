// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides high-level operations for:
//! - Activities (create-or-skip on the natural key)
//! - Activity photos (create-or-skip on the provider photo ID)
//! - Sync state (last successful sync per user)
//! - Credentials (encrypted provider tokens)

use crate::db::{collections, SyncStore};
use crate::error::SyncError;
use crate::models::activity::activity_key;
use crate::models::{ActivityRecord, PhotoRecord, StoredActivity, StoredCredential};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const MAX_CONCURRENT_DB_OPS: usize = 50;
// Firestore limits batch/transaction writes to 500 operations.
// We use a safe limit of 400 to allow headroom.
const BATCH_SIZE: usize = 400;

/// Per-user sync bookkeeping document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SyncStateDoc {
    /// Last successful sync (ISO 8601)
    last_sync_at: String,
}

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: firestore::FirestoreDb,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, SyncError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| SyncError::Store(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, SyncError> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            SyncError::Store(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self { client })
    }

    fn client(&self) -> &firestore::FirestoreDb {
        &self.client
    }

    /// Write the records whose document does not exist yet.
    ///
    /// Existence is read concurrently per chunk, then the missing documents
    /// are committed in one transaction. Returns the number written.
    async fn insert_missing<T, F>(
        &self,
        collection: &str,
        records: &[T],
        key: F,
    ) -> Result<usize, SyncError>
    where
        T: Serialize + for<'de> Deserialize<'de> + Send + Sync,
        F: Fn(&T) -> String,
    {
        let client = self.client();
        let mut seen = HashSet::new();
        let mut written = 0;

        for chunk in records.chunks(BATCH_SIZE) {
            // Duplicates inside the input count once.
            let candidates: Vec<(String, &T)> = chunk
                .iter()
                .map(|r| (key(r), r))
                .filter(|(k, _)| seen.insert(k.clone()))
                .collect();

            let doc_ids: Vec<String> = candidates.iter().map(|(doc_id, _)| doc_id.clone()).collect();
            let existing = stream::iter(doc_ids)
                .map(|doc_id: String| async move {
                    let doc: Option<T> = client
                        .fluent()
                        .select()
                        .by_id_in(collection)
                        .obj()
                        .one(&doc_id)
                        .await
                        .map_err(|e| SyncError::Store(e.to_string()))?;
                    Ok::<_, SyncError>(doc.is_some())
                })
                .buffered(MAX_CONCURRENT_DB_OPS)
                .collect::<Vec<Result<bool, SyncError>>>()
                .await
                .into_iter()
                .collect::<Result<Vec<bool>, SyncError>>()?;

            let missing: Vec<&(String, &T)> = candidates
                .iter()
                .zip(existing)
                .filter(|(_, exists)| !exists)
                .map(|(candidate, _)| candidate)
                .collect();

            if missing.is_empty() {
                continue;
            }

            let mut transaction = client
                .begin_transaction()
                .await
                .map_err(|e| SyncError::Store(format!("Failed to begin transaction: {}", e)))?;

            for (doc_id, record) in &missing {
                client
                    .fluent()
                    .update()
                    .in_col(collection)
                    .document_id(doc_id)
                    .object(*record)
                    .add_to_transaction(&mut transaction)
                    .map_err(|e| {
                        SyncError::Store(format!(
                            "Failed to add {} document to transaction: {}",
                            collection, e
                        ))
                    })?;
            }

            transaction
                .commit()
                .await
                .map_err(|e| SyncError::Store(format!("Transaction commit failed: {}", e)))?;

            written += missing.len();
        }

        tracing::debug!(
            collection,
            requested = records.len(),
            written,
            "Bulk insert committed"
        );

        Ok(written)
    }
}

#[async_trait]
impl SyncStore for FirestoreDb {
    async fn bulk_insert_activities(&self, records: &[ActivityRecord]) -> Result<usize, SyncError> {
        self.insert_missing(collections::ACTIVITIES, records, ActivityRecord::natural_key)
            .await
    }

    async fn bulk_insert_photos(&self, records: &[PhotoRecord]) -> Result<usize, SyncError> {
        self.insert_missing(collections::PHOTOS, records, PhotoRecord::natural_key)
            .await
    }

    async fn find_activity(
        &self,
        user_id: &str,
        provider_activity_id: u64,
    ) -> Result<Option<StoredActivity>, SyncError> {
        let internal_id = activity_key(user_id, provider_activity_id);
        let record: Option<ActivityRecord> = self
            .client()
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(&internal_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        Ok(record.map(|record| StoredActivity {
            internal_id,
            record,
        }))
    }

    async fn find_with_nonzero_photo_count(
        &self,
        user_id: &str,
    ) -> Result<Vec<StoredActivity>, SyncError> {
        let records: Vec<ActivityRecord> = self
            .client()
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(|q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("counts.photos").greater_than(0u64),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        Ok(records
            .into_iter()
            .map(|record| StoredActivity {
                internal_id: record.natural_key(),
                record,
            })
            .collect())
    }

    async fn update_last_sync_timestamp(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let doc = SyncStateDoc {
            last_sync_at: format_utc_rfc3339(at),
        };
        let _: () = self
            .client()
            .fluent()
            .update()
            .in_col(collections::SYNC_STATE)
            .document_id(user_id)
            .object(&doc)
            .execute()
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(())
    }

    async fn last_sync_timestamp(&self, user_id: &str) -> Result<Option<DateTime<Utc>>, SyncError> {
        let doc: Option<SyncStateDoc> = self
            .client()
            .fluent()
            .select()
            .by_id_in(collections::SYNC_STATE)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;

        doc.map(|d| {
            DateTime::parse_from_rfc3339(&d.last_sync_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    SyncError::InvariantViolation(format!("Unparseable last_sync_at: {}", e))
                })
        })
        .transpose()
    }

    async fn get_credential(&self, user_id: &str) -> Result<Option<StoredCredential>, SyncError> {
        self.client()
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| SyncError::Store(e.to_string()))
    }

    async fn set_credential(
        &self,
        user_id: &str,
        credential: &StoredCredential,
    ) -> Result<(), SyncError> {
        let _: () = self
            .client()
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(user_id)
            .object(credential)
            .execute()
            .await
            .map_err(|e| SyncError::Store(e.to_string()))?;
        Ok(())
    }
}
