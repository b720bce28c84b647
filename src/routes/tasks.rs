// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Task handler routes for Cloud Tasks callbacks.
//!
//! These endpoints are called by the task queue, not directly by users.
//! A paused run answers 200 with the cursor and resume time so the queue
//! can schedule the continuation; only genuine failures return 500 and
//! trigger a queue retry.

use crate::error::SyncError;
use crate::middleware::require_tasks_auth;
use crate::models::{StoredCredential, SyncCursor, SyncMode, SyncOutcome, SyncSummary, TokenBundle};
use crate::services::{ProgressReporter, SyncReport, SyncRequest};
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;
use axum::{
    extract::{Json, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Task handler routes (called by Cloud Tasks).
pub fn routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/sync", post(run_sync))
        .route_layer(middleware::from_fn_with_state(state, require_tasks_auth))
}

/// Payload for a sync task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTaskPayload {
    pub user_id: String,
    pub mode: SyncMode,
    /// Present when the queue resumes a paused run
    #[serde(default)]
    pub cursor: Option<SyncCursor>,
}

/// Result reported back to the task queue.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncTaskResponse {
    Completed {
        message: String,
        summary: SyncSummary,
    },
    Paused {
        message: String,
        cursor: Option<SyncCursor>,
        window: String,
        resume_at: String,
        summary: SyncSummary,
    },
    ReauthorizationRequired {
        message: String,
    },
    Failed {
        message: String,
        /// Diagnostic detail, not for display
        details: String,
    },
}

impl SyncTaskResponse {
    fn from_error(err: &SyncError) -> Self {
        if err.is_auth_expired() {
            return SyncTaskResponse::ReauthorizationRequired {
                message: err.user_message().to_string(),
            };
        }
        SyncTaskResponse::Failed {
            message: err.user_message().to_string(),
            details: err.to_string(),
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            // Returning 500 makes Cloud Tasks retry.
            SyncTaskResponse::Failed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::OK,
        }
    }
}

impl From<&SyncReport> for SyncTaskResponse {
    fn from(report: &SyncReport) -> Self {
        let message = report.user_message().to_string();
        match &report.outcome {
            Ok(SyncOutcome::Completed(summary)) => SyncTaskResponse::Completed {
                message,
                summary: *summary,
            },
            Ok(SyncOutcome::Paused(paused)) => SyncTaskResponse::Paused {
                message,
                cursor: paused.cursor,
                window: paused.window.clone(),
                resume_at: format_utc_rfc3339(paused.resume_at),
                summary: paused.summary,
            },
            Err(e) => SyncTaskResponse::from_error(e),
        }
    }
}

impl IntoResponse for SyncTaskResponse {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

/// Run one sync job for one user.
async fn run_sync(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SyncTaskPayload>,
) -> SyncTaskResponse {
    tracing::info!(
        user_id = %payload.user_id,
        mode = ?payload.mode,
        cursor = ?payload.cursor,
        "Running sync from Cloud Task"
    );

    let credential = match load_credential(&state, &payload.user_id).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(user_id = %payload.user_id, error = %e, "Failed to load credential");
            return SyncTaskResponse::from_error(&e);
        }
    };

    let report = state
        .orchestrator
        .run(
            SyncRequest {
                user_id: payload.user_id.clone(),
                mode: payload.mode,
                credential,
                cursor: payload.cursor,
            },
            &ProgressReporter::silent(),
        )
        .await;

    // Persist a refreshed credential whatever the outcome. A failed write is
    // logged and the run's own outcome is still reported.
    if let Some(bundle) = &report.refreshed_credential {
        if let Err(e) = store_credential(&state, &payload.user_id, bundle).await {
            tracing::error!(
                user_id = %payload.user_id,
                error = %e,
                "Failed to persist refreshed credential"
            );
        }
    }

    SyncTaskResponse::from(&report)
}

/// Fetch and decrypt the user's provider credential.
async fn load_credential(state: &AppState, user_id: &str) -> Result<TokenBundle, SyncError> {
    let stored = state
        .store
        .get_credential(user_id)
        .await?
        .ok_or_else(|| SyncError::AuthExpired(format!("No credential stored for {}", user_id)))?;

    state.vault.decrypt(user_id, &stored.ciphertext).await
}

/// Encrypt and persist a refreshed credential.
async fn store_credential(
    state: &AppState,
    user_id: &str,
    bundle: &TokenBundle,
) -> Result<(), SyncError> {
    let ciphertext = state.vault.encrypt(user_id, bundle).await?;
    state
        .store
        .set_credential(
            user_id,
            &StoredCredential {
                ciphertext,
                updated_at: format_utc_rfc3339(Utc::now()),
            },
        )
        .await?;

    tracing::info!(user_id, "Stored refreshed credential");
    Ok(())
}
