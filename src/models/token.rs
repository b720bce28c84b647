// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Provider OAuth credentials.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Decrypted provider credential. Only ever lives in memory for the duration
/// of a call; the persisted form is the encrypted JSON of this struct.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    pub access_token: String,
    pub refresh_token: String,
    /// Absolute expiry, unix seconds
    pub expires_at: i64,
}

impl TokenBundle {
    /// Expired, or expiring within the refresh margin.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now + TOKEN_REFRESH_MARGIN_SECS
    }
}

// Tokens must never reach the logs.
impl fmt::Debug for TokenBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenBundle")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Credential row as owned by the caller's credential store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCredential {
    /// Encrypted `TokenBundle` JSON (base64)
    pub ciphertext: String,
    /// When the credential was last written (ISO 8601)
    pub updated_at: String,
}
