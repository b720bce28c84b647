// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authenticated provider calls with quota accounting and token refresh.
//!
//! Every call goes through the same steps: pre-flight quota check, proactive
//! refresh, bearer request, and status classification. A refreshed credential
//! is always handed back to the caller, even when the call itself failed.

use crate::error::SyncError;
use crate::models::TokenBundle;
use crate::services::rate_limit::{EndpointClass, RateLimitGovernor};
use crate::services::token_vault::TokenVault;
use crate::time_utils::from_unix;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Per-request timeout for provider calls.
pub const PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

const SHORT_WINDOW_SECS: i64 = 15 * 60;
const DAY_SECS: i64 = 24 * 60 * 60;

/// Build the HTTP client shared by the gateway and the token vault.
pub fn http_client() -> Result<reqwest::Client, SyncError> {
    reqwest::Client::builder()
        .timeout(PROVIDER_TIMEOUT)
        .build()
        .map_err(|e| SyncError::Internal(anyhow::anyhow!("Failed to build HTTP client: {}", e)))
}

/// One provider endpoint invocation.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `/activities/123`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub endpoint_class: EndpointClass,
}

impl ProviderRequest {
    pub fn get(path: impl Into<String>, endpoint_class: EndpointClass) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            query: Vec::new(),
            endpoint_class,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }
}

/// Outcome of a provider call.
///
/// `refreshed_credential` is set whenever the gateway obtained a new bundle
/// during the call; the input bundle must not be reused after that.
#[derive(Debug)]
pub struct ProviderReply<T> {
    pub payload: Result<T, SyncError>,
    pub refreshed_credential: Option<TokenBundle>,
}

/// Provider HTTP gateway.
#[derive(Clone)]
pub struct ProviderGateway {
    http: reqwest::Client,
    base_url: String,
    vault: TokenVault,
    governor: RateLimitGovernor,
}

impl ProviderGateway {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        vault: TokenVault,
        governor: RateLimitGovernor,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            vault,
            governor,
        }
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        user_id: &str,
        credential: &TokenBundle,
        request: &ProviderRequest,
    ) -> ProviderReply<T> {
        let mut refreshed = None;
        let payload = self
            .call_with_refresh(user_id, credential, request, &mut refreshed)
            .await;

        ProviderReply {
            payload,
            refreshed_credential: refreshed,
        }
    }

    async fn call_with_refresh<T: DeserializeOwned>(
        &self,
        user_id: &str,
        credential: &TokenBundle,
        request: &ProviderRequest,
        refreshed: &mut Option<TokenBundle>,
    ) -> Result<T, SyncError> {
        self.preflight(user_id)?;

        let mut bundle = credential.clone();
        if TokenVault::is_expired(&bundle, Utc::now().timestamp()) {
            tracing::info!(user_id, "Access token expiring, refreshing before call");
            bundle = self.vault.refresh(&bundle.refresh_token).await?;
            *refreshed = Some(bundle.clone());
        }

        let mut response = self.send(user_id, &bundle, request).await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!(user_id, path = %request.path, "Provider returned 401, refreshing once");
            bundle = self.vault.refresh(&bundle.refresh_token).await?;
            *refreshed = Some(bundle.clone());

            self.preflight(user_id)?;
            response = self.send(user_id, &bundle, request).await?;

            if response.status() == StatusCode::UNAUTHORIZED {
                return Err(SyncError::AuthExpired(
                    "Provider rejected refreshed access token".to_string(),
                ));
            }
        }

        Self::parse(response, Utc::now()).await
    }

    fn preflight(&self, user_id: &str) -> Result<(), SyncError> {
        let decision = self.governor.check_quota(user_id);
        if decision.allowed {
            return Ok(());
        }

        Err(SyncError::RateLimited {
            window: decision.limit_type.unwrap_or_else(|| "unknown".to_string()),
            retry_after: decision.reset_at.unwrap_or_else(Utc::now),
        })
    }

    /// Issue the request. Anything that produced an HTTP response consumed quota.
    async fn send(
        &self,
        user_id: &str,
        bundle: &TokenBundle,
        request: &ProviderRequest,
    ) -> Result<reqwest::Response, SyncError> {
        let url = format!("{}{}", self.base_url, request.path);

        let response = self
            .http
            .request(request.method.clone(), &url)
            .bearer_auth(&bundle.access_token)
            .query(&request.query)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("{} {}: {}", request.method, request.path, e)))?;

        self.governor.record_request(user_id, request.endpoint_class);
        tracing::debug!(
            user_id,
            path = %request.path,
            status = response.status().as_u16(),
            "Provider call"
        );

        Ok(response)
    }

    async fn parse<T: DeserializeOwned>(
        response: reqwest::Response,
        now: DateTime<Utc>,
    ) -> Result<T, SyncError> {
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let err = rate_limit_from_headers(response.headers(), now);
            tracing::warn!(error = %err, "Provider rate limit hit (429)");
            return Err(err);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        response.json().await.map_err(|e| SyncError::Provider {
            status: status.as_u16(),
            message: format!("JSON parse error: {}", e),
        })
    }
}

/// Derive the exhausted window and its reset time from a 429 response.
///
/// `Retry-After` wins when present. Otherwise the provider's
/// `X-RateLimit-Limit` / `X-RateLimit-Usage` pairs ("short,daily") decide:
/// the short window resets on the next quarter hour, the daily one at the
/// next UTC midnight.
pub fn rate_limit_from_headers(headers: &HeaderMap, now: DateTime<Utc>) -> SyncError {
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    let pair = |name: &str| -> Option<(u64, u64)> {
        let (short, daily) = header_str(name)?.split_once(',')?;
        Some((short.trim().parse().ok()?, daily.trim().parse().ok()?))
    };

    let daily_exhausted = match (pair("x-ratelimit-limit"), pair("x-ratelimit-usage")) {
        (Some((_, daily_limit)), Some((_, daily_used))) => daily_used >= daily_limit,
        _ => false,
    };

    let window = if daily_exhausted { "daily" } else { "short" };

    let retry_after = header_str(RETRY_AFTER.as_str())
        .and_then(|v| v.trim().parse::<i64>().ok())
        .map(|secs| now + chrono::Duration::seconds(secs.max(0)))
        .unwrap_or_else(|| {
            let secs = now.timestamp();
            let boundary = if daily_exhausted {
                DAY_SECS
            } else {
                SHORT_WINDOW_SECS
            };
            from_unix((secs / boundary + 1) * boundary)
        });

    SyncError::RateLimited {
        window: window.to_string(),
        retry_after,
    }
}
