// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application configuration loaded from environment variables.
//!
//! Provider rate-limit windows and sync caps are configuration rather than
//! policy: the defaults follow the provider's published limits but any
//! deployment can override them.

use crate::services::rate_limit::QuotaWindow;
use crate::services::sync::SyncSettings;
use std::env;
use std::str::FromStr;

/// Default Cloud Tasks queue that is allowed to trigger sync runs.
pub const SYNC_QUEUE_NAME: &str = "provider-sync";

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Provider OAuth ---
    /// OAuth client ID (public)
    pub provider_client_id: String,
    /// OAuth client secret
    pub provider_client_secret: String,
    /// Base URL for the provider REST API
    pub provider_api_base: String,
    /// Token endpoint (authorization-code and refresh grants)
    pub provider_token_url: String,
    /// Redirect URI sent with the authorization-code grant, if registered
    pub provider_redirect_uri: Option<String>,

    // --- GCP ---
    pub gcp_project_id: String,
    pub gcp_region: String,
    /// KMS key used to protect stored credentials
    pub kms_key_name: String,
    /// Queue name that `/tasks/*` requests must carry
    pub task_queue_name: String,

    /// Server port
    pub port: u16,

    // --- Sync policy ---
    pub rate_limit_windows: Vec<QuotaWindow>,
    pub sync: SyncSettings,
    /// Maximum number of users tracked by the in-process quota store
    pub usage_store_capacity: usize,
}

impl Config {
    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            provider_client_id: "test_client_id".to_string(),
            provider_client_secret: "test_secret".to_string(),
            provider_api_base: "http://localhost:9999/api/v3".to_string(),
            provider_token_url: "http://localhost:9999/oauth/token".to_string(),
            provider_redirect_uri: None,
            gcp_project_id: "test-project".to_string(),
            gcp_region: "us-west1".to_string(),
            kms_key_name: "token-encryption".to_string(),
            task_queue_name: SYNC_QUEUE_NAME.to_string(),
            port: 8080,
            rate_limit_windows: QuotaWindow::provider_defaults(),
            sync: SyncSettings::default(),
            usage_store_capacity: 10_000,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let defaults = SyncSettings::default();

        let rate_limit_windows = match env::var("RATE_LIMIT_WINDOWS") {
            Ok(raw) => parse_windows(&raw)?,
            Err(_) => QuotaWindow::provider_defaults(),
        };

        Ok(Self {
            provider_client_id: env::var("PROVIDER_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("PROVIDER_CLIENT_ID"))?,
            provider_client_secret: env::var("PROVIDER_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("PROVIDER_CLIENT_SECRET"))?,
            provider_api_base: env::var("PROVIDER_API_BASE")
                .unwrap_or_else(|_| "https://www.strava.com/api/v3".to_string()),
            provider_token_url: env::var("PROVIDER_TOKEN_URL")
                .unwrap_or_else(|_| "https://www.strava.com/oauth/token".to_string()),
            provider_redirect_uri: env::var("PROVIDER_REDIRECT_URI").ok(),

            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            gcp_region: env::var("GCP_REGION").unwrap_or_else(|_| "us-west1".to_string()),
            kms_key_name: env::var("KMS_KEY_NAME")
                .unwrap_or_else(|_| "token-encryption".to_string()),
            task_queue_name: env::var("TASK_QUEUE_NAME")
                .unwrap_or_else(|_| SYNC_QUEUE_NAME.to_string()),

            port: env_or("PORT", 8080)?,

            rate_limit_windows,
            sync: SyncSettings {
                page_size: env_or("SYNC_PAGE_SIZE", defaults.page_size)?,
                safety_cap: env_or("SYNC_SAFETY_CAP", defaults.safety_cap)?,
                batch_size: env_or("SYNC_BATCH_SIZE", defaults.batch_size)?,
                lookback_days: env_or("SYNC_LOOKBACK_DAYS", defaults.lookback_days)?,
                photo_size_hint: env_or("PHOTO_SIZE_HINT", defaults.photo_size_hint)?,
            },
            usage_store_capacity: env_or("USAGE_STORE_CAPACITY", 10_000)?,
        })
    }
}

/// Read and parse an optional variable, falling back to `default` when unset.
fn env_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}

/// Parse `name:limit:window_ms` entries separated by commas.
pub fn parse_windows(raw: &str) -> Result<Vec<QuotaWindow>, ConfigError> {
    let invalid = || ConfigError::Invalid("RATE_LIMIT_WINDOWS", raw.to_string());

    let windows = raw
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split(':');
            let name = parts.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
            let limit = parts
                .next()
                .and_then(|l| l.parse::<u32>().ok())
                .ok_or_else(invalid)?;
            let window_ms = parts
                .next()
                .and_then(|w| w.parse::<u64>().ok())
                .filter(|w| *w > 0)
                .ok_or_else(invalid)?;
            if parts.next().is_some() {
                return Err(invalid());
            }
            Ok(QuotaWindow::new(name, limit, window_ms))
        })
        .collect::<Result<Vec<_>, ConfigError>>()?;

    if windows.is_empty() {
        return Err(invalid());
    }
    Ok(windows)
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("PROVIDER_CLIENT_ID", "test_id");
        env::set_var("PROVIDER_CLIENT_SECRET", " test_secret\n");
        env::remove_var("RATE_LIMIT_WINDOWS");
        env::remove_var("SYNC_BATCH_SIZE");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.provider_client_id, "test_id");
        assert_eq!(config.provider_client_secret, "test_secret");
        assert_eq!(config.sync.batch_size, 50);
        assert_eq!(config.rate_limit_windows.len(), 2);
    }

    #[test]
    fn test_parse_windows() {
        let windows = parse_windows("short:100:900000, daily:1000:86400000").unwrap();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[0].name, "short");
        assert_eq!(windows[0].limit, 100);
        assert_eq!(windows[1].window_ms, 86_400_000);
    }

    #[test]
    fn test_parse_windows_rejects_garbage() {
        assert!(parse_windows("").is_err());
        assert!(parse_windows("short:abc:900000").is_err());
        assert!(parse_windows("short:100").is_err());
        assert!(parse_windows("short:100:0").is_err());
        assert!(parse_windows("short:100:900:extra").is_err());
    }
}
