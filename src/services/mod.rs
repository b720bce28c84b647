// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - sync engine components.

pub mod dedup;
pub mod gateway;
pub mod kms;
pub mod progress;
pub mod rate_limit;
pub mod strava;
pub mod sync;
pub mod token_vault;
pub mod transform;

pub use dedup::DedupInserter;
pub use gateway::{ProviderGateway, ProviderReply, ProviderRequest};
pub use kms::{KmsService, TokenCipher};
pub use progress::{ProgressReporter, SyncEvent, SyncEvents};
pub use rate_limit::{EndpointClass, QuotaDecision, QuotaWindow, RateLimitGovernor, UsageStore};
pub use strava::{StravaActivity, StravaApi, StravaPhoto};
pub use sync::{SyncOrchestrator, SyncReport, SyncRequest, SyncSettings};
pub use token_vault::TokenVault;
pub use transform::{NoTimezoneLookup, RecordTransformer, TimezoneLookup};
