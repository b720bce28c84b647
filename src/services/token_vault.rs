// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Token vault: encrypted credential handling and OAuth refresh.

use crate::config::Config;
use crate::error::SyncError;
use crate::models::TokenBundle;
use crate::services::kms::TokenCipher;
use serde::Deserialize;
use std::sync::Arc;

/// Token endpoint response. `expires_at` is absolute (unix seconds), not a duration.
#[derive(Debug, Clone, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_at: i64,
}

/// Owns decrypt/encrypt of provider credentials and the refresh grant.
#[derive(Clone)]
pub struct TokenVault {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: Option<String>,
    cipher: Arc<dyn TokenCipher>,
}

impl TokenVault {
    pub fn new(http: reqwest::Client, config: &Config, cipher: Arc<dyn TokenCipher>) -> Self {
        Self {
            http,
            token_url: config.provider_token_url.clone(),
            client_id: config.provider_client_id.clone(),
            client_secret: config.provider_client_secret.clone(),
            redirect_uri: config.provider_redirect_uri.clone(),
            cipher,
        }
    }

    /// Authenticated-data context binding a ciphertext to its owner.
    fn context(user_id: &str) -> Vec<u8> {
        format!("user_id:{}", user_id).into_bytes()
    }

    /// Decrypt a stored credential into a bundle.
    pub async fn decrypt(&self, user_id: &str, ciphertext: &str) -> Result<TokenBundle, SyncError> {
        let plaintext = self
            .cipher
            .decrypt(ciphertext, &Self::context(user_id))
            .await?;

        serde_json::from_str(&plaintext).map_err(|e| {
            SyncError::InvariantViolation(format!("Malformed token bundle for {}: {}", user_id, e))
        })
    }

    /// Encrypt a bundle for storage.
    pub async fn encrypt(&self, user_id: &str, bundle: &TokenBundle) -> Result<String, SyncError> {
        let plaintext = serde_json::to_string(bundle)
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("Token serialization: {}", e)))?;
        self.cipher
            .encrypt(&plaintext, &Self::context(user_id))
            .await
    }

    /// Expired or expiring within five minutes of `now` (unix seconds).
    pub fn is_expired(bundle: &TokenBundle, now: i64) -> bool {
        bundle.is_expired(now)
    }

    /// Exchange a refresh token for a new bundle.
    ///
    /// A rejected refresh token is terminal: `AuthExpired`.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenBundle, SyncError> {
        let response = self
            .token_grant(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await?;

        tracing::info!(expires_at = response.expires_at, "Provider token refreshed");

        Ok(TokenBundle {
            access_token: response.access_token,
            // Some providers do not rotate the refresh token.
            refresh_token: response
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            expires_at: response.expires_at,
        })
    }

    /// Exchange an authorization code for the initial bundle.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenBundle, SyncError> {
        let mut form = vec![
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
        ];
        if let Some(redirect_uri) = self.redirect_uri.as_deref() {
            form.push(("redirect_uri", redirect_uri));
        }

        let response = self.token_grant(&form).await?;
        let refresh_token = response.refresh_token.ok_or_else(|| SyncError::Provider {
            status: 200,
            message: "Token exchange response has no refresh_token".to_string(),
        })?;

        Ok(TokenBundle {
            access_token: response.access_token,
            refresh_token,
            expires_at: response.expires_at,
        })
    }

    async fn token_grant(&self, form: &[(&str, &str)]) -> Result<TokenResponse, SyncError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| SyncError::Network(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Provider token endpoint rejected grant");

            return Err(match status.as_u16() {
                400 | 401 | 403 => SyncError::AuthExpired(format!("HTTP {}: {}", status, body)),
                code => SyncError::Provider {
                    status: code,
                    message: body,
                },
            });
        }

        response.json().await.map_err(|e| SyncError::Provider {
            status: status.as_u16(),
            message: format!("Failed to parse token response: {}", e),
        })
    }
}
