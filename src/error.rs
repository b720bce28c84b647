// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync error taxonomy and the messages shown for each outcome.

use chrono::{DateTime, Utc};

/// Errors raised by the provider sync engine.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Quota exhausted, either locally or as reported by the provider.
    /// Recoverable: pause and resume after `retry_after`.
    #[error("Rate limit exceeded for {window} window (retry after {retry_after})")]
    RateLimited {
        window: String,
        retry_after: DateTime<Utc>,
    },

    /// The provider rejected our credentials; the user must re-authorize.
    #[error("Provider authorization expired: {0}")]
    AuthExpired(String),

    /// Per-item detail fetch failure. Recovered locally by the orchestrator.
    #[error("Failed to fetch detail for activity {activity_id}: {message}")]
    DetailFetch { activity_id: u64, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider API error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    /// Programmer-facing invariant breach (malformed token bundle etc.)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl SyncError {
    /// Message shown when the run paused on quota.
    pub const RESUME_MESSAGE: &'static str = "Sync paused by rate limit and will resume";
    /// Message shown when the credential must be re-authorized.
    pub const RECONNECT_MESSAGE: &'static str = "Please reconnect your account";
    /// Message shown for every other failure.
    pub const FAILURE_MESSAGE: &'static str = "Sync failed";

    pub fn is_auth_expired(&self) -> bool {
        matches!(self, SyncError::AuthExpired(_))
    }

    /// Errors that degrade a single detail item instead of aborting the run.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            SyncError::DetailFetch { .. } | SyncError::Network(_) | SyncError::Provider { .. }
        )
    }

    /// User-visible summary. Diagnostic detail is carried separately.
    pub fn user_message(&self) -> &'static str {
        match self {
            SyncError::RateLimited { .. } => Self::RESUME_MESSAGE,
            SyncError::AuthExpired(_) => Self::RECONNECT_MESSAGE,
            _ => Self::FAILURE_MESSAGE,
        }
    }
}
