// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Sync run state: cursors, progress snapshots and outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Resume marker for an interrupted run.
///
/// `before` is the start time (unix seconds) of the oldest record durably
/// processed so far; a resumed run asks for records at or before it and
/// relies on dedup for the ones already stored. `after` is the lower bound
/// the interrupted run started with, fixed for the lifetime of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub before: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<i64>,
}

impl SyncCursor {
    pub fn new(before: i64, after: Option<i64>) -> Self {
        Self { before, after }
    }
}

/// Which pipeline a run drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Everything the provider has, bounded only by the safety cap.
    Full,
    /// Records after the last successful sync minus the lookback window.
    Incremental,
    /// Photos for activities with a nonzero photo count.
    Photos,
}

/// Orchestrator state machine phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Listing,
    Detailing,
    Inserting,
    Checkpointed,
    Paused,
    Failed,
    Done,
}

/// Transient progress snapshot emitted at batch boundaries. Never persisted;
/// callers derive the next `SyncCursor` from `oldest_processed_timestamp`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: Option<SyncPhase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fetched: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inserted: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activities_processed: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_activities: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photos_inserted: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_processed_timestamp: Option<i64>,
}

/// Totals for a finished (or paused) run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Activities newly inserted
    pub imported: u32,
    /// Summaries returned by the list endpoint
    pub fetched: u32,
    /// Activities whose photos were requested
    pub activities_processed: u32,
    pub photos_inserted: u32,
}

/// A run that stopped on quota and can be rescheduled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PausedRun {
    /// Where the resumed run should pick up; `None` means start over.
    pub cursor: Option<SyncCursor>,
    pub window: String,
    pub resume_at: DateTime<Utc>,
    pub summary: SyncSummary,
}

/// Non-error terminal states of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncOutcome {
    Completed(SyncSummary),
    Paused(PausedRun),
}
