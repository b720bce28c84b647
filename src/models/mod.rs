// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the sync engine.

pub mod activity;
pub mod geometry;
pub mod photo;
pub mod sync;
pub mod token;

pub use activity::{ActivityCounts, ActivityRecord, HeartRate, StoredActivity};
pub use geometry::{GeoPoint, TrackLine};
pub use photo::{PhotoRecord, PhotoUrls};
pub use sync::{
    PausedRun, ProgressSnapshot, SyncCursor, SyncMode, SyncOutcome, SyncPhase, SyncSummary,
};
pub use token::{StoredCredential, TokenBundle};
