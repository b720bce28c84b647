// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity-Sync: pull activity and photo history from a fitness provider
//!
//! This crate provides the sync engine (token vault, quota governor,
//! provider gateway, record transformer, dedup inserter, orchestrator) and
//! the task endpoint a job queue calls to drive it.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use config::Config;
use db::SyncStore;
use error::SyncError;
use services::{
    ProviderGateway, RateLimitGovernor, RecordTransformer, StravaApi, SyncOrchestrator,
    TimezoneLookup, TokenCipher, TokenVault, UsageStore,
};
use std::sync::Arc;

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn SyncStore>,
    pub vault: TokenVault,
    pub orchestrator: SyncOrchestrator,
}

impl AppState {
    /// Wire the sync engine from its collaborators.
    ///
    /// One `UsageStore` is created here and shared by every run in the
    /// process.
    pub fn build(
        config: Config,
        store: Arc<dyn SyncStore>,
        cipher: Arc<dyn TokenCipher>,
        timezones: Arc<dyn TimezoneLookup>,
    ) -> Result<Self, SyncError> {
        let http = services::gateway::http_client()?;
        let vault = TokenVault::new(http.clone(), &config, cipher);

        let usage = Arc::new(UsageStore::new(config.usage_store_capacity));
        let governor = RateLimitGovernor::new(config.rate_limit_windows.clone(), usage);

        let gateway =
            ProviderGateway::new(http, config.provider_api_base.clone(), vault.clone(), governor);
        let orchestrator = SyncOrchestrator::new(
            StravaApi::new(gateway),
            RecordTransformer::new(timezones),
            store.clone(),
            config.sync.clone(),
        );

        Ok(Self {
            config,
            store,
            vault,
            orchestrator,
        })
    }
}
