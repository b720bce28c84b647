// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloud KMS service for encrypting/decrypting stored provider credentials.
//!
//! Uses direct KMS encryption (not envelope encryption). The owning user's ID
//! is bound as additional authenticated data so a ciphertext copied onto
//! another user's row will not decrypt.

use crate::error::SyncError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Opaque encryption primitive used by the token vault.
#[async_trait]
pub trait TokenCipher: Send + Sync {
    /// Encrypt `plaintext`, binding `context` as authenticated data.
    async fn encrypt(&self, plaintext: &str, context: &[u8]) -> Result<String, SyncError>;

    /// Decrypt a ciphertext produced by `encrypt` with the same `context`.
    async fn decrypt(&self, ciphertext: &str, context: &[u8]) -> Result<String, SyncError>;
}

/// KMS encryption service.
#[derive(Clone)]
pub struct KmsService {
    /// Full resource path to the KMS key
    /// Format: projects/{project}/locations/{location}/keyRings/{ring}/cryptoKeys/{key}
    key_path: String,

    /// GCP KMS client
    client: Option<std::sync::Arc<google_cloud_kms::client::Client>>,
}

impl KmsService {
    /// KMS Key Ring Name
    const KEY_RING_NAME: &str = "activity-sync";

    /// Mock ciphertext prefix (debug builds only).
    #[cfg(debug_assertions)]
    const MOCK_PREFIX: &str = "AAD:";

    /// Create a new KMS service connected to GCP KMS.
    pub async fn new(project_id: &str, location: &str, key_name: &str) -> Result<Self, SyncError> {
        let key_path = format!(
            "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
            project_id,
            location,
            Self::KEY_RING_NAME,
            key_name
        );

        let config = google_cloud_kms::client::ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| {
                SyncError::Internal(anyhow::anyhow!("Failed to create KMS auth config: {}", e))
            })?;

        let client = google_cloud_kms::client::Client::new(config)
            .await
            .map_err(|e| {
                SyncError::Internal(anyhow::anyhow!("Failed to create KMS client: {}", e))
            })?;

        Ok(Self {
            key_path,
            client: Some(std::sync::Arc::new(client)),
        })
    }

    /// Create a mock KMS service for testing (offline mode).
    /// Only available in debug/test builds.
    #[cfg(debug_assertions)]
    pub fn new_mock() -> Self {
        Self {
            key_path: "projects/mock/locations/mock/keyRings/mock/cryptoKeys/mock".to_string(),
            client: None,
        }
    }

    fn connected_client(&self) -> Result<&google_cloud_kms::client::Client, SyncError> {
        self.client
            .as_deref()
            .ok_or_else(|| SyncError::Internal(anyhow::anyhow!("KMS client not connected")))
    }

    #[cfg(debug_assertions)]
    fn mock_encrypt(plaintext: &str, context: &[u8]) -> String {
        format!(
            "{}{}:{}",
            Self::MOCK_PREFIX,
            BASE64.encode(context),
            BASE64.encode(plaintext)
        )
    }

    #[cfg(debug_assertions)]
    fn mock_decrypt(ciphertext: &str, context: &[u8]) -> Result<String, SyncError> {
        let mock_err = |msg: &str| SyncError::Internal(anyhow::anyhow!("{} (mock)", msg));

        let (aad_b64, body_b64) = ciphertext
            .strip_prefix(Self::MOCK_PREFIX)
            .and_then(|rest| rest.split_once(':'))
            .ok_or_else(|| mock_err("Malformed ciphertext"))?;

        let aad = BASE64
            .decode(aad_b64)
            .map_err(|_| mock_err("Base64 AAD decode failed"))?;
        if aad != context {
            return Err(mock_err("Additional authenticated data mismatch"));
        }

        let bytes = BASE64
            .decode(body_b64)
            .map_err(|_| mock_err("Base64 output decode failed"))?;
        String::from_utf8(bytes).map_err(|_| mock_err("UTF-8 decode failed"))
    }
}

#[async_trait]
impl TokenCipher for KmsService {
    /// Returns base64-encoded ciphertext.
    async fn encrypt(&self, plaintext: &str, context: &[u8]) -> Result<String, SyncError> {
        use google_cloud_googleapis::cloud::kms::v1::EncryptRequest;

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Ok(Self::mock_encrypt(plaintext, context));
            }
        }

        // In release builds a missing client is an error, never plaintext.
        let client = self.connected_client()?;

        let req = EncryptRequest {
            name: self.key_path.clone(),
            plaintext: plaintext.as_bytes().to_vec(),
            additional_authenticated_data: context.to_vec(),
            ..Default::default()
        };

        let response = client
            .encrypt(req, None)
            .await
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("KMS encrypt failed: {}", e)))?;

        Ok(BASE64.encode(response.ciphertext))
    }

    /// Expects base64-encoded ciphertext.
    async fn decrypt(&self, ciphertext_b64: &str, context: &[u8]) -> Result<String, SyncError> {
        use google_cloud_googleapis::cloud::kms::v1::DecryptRequest;

        #[cfg(debug_assertions)]
        {
            if self.client.is_none() {
                return Self::mock_decrypt(ciphertext_b64, context);
            }
        }

        let client = self.connected_client()?;

        let ciphertext = BASE64.decode(ciphertext_b64).map_err(|e| {
            SyncError::Internal(anyhow::anyhow!("Base64 output decode failed: {}", e))
        })?;

        let req = DecryptRequest {
            name: self.key_path.clone(),
            ciphertext,
            additional_authenticated_data: context.to_vec(),
            ..Default::default()
        };

        let response = client
            .decrypt(req, None)
            .await
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("KMS decrypt failed: {}", e)))?;

        String::from_utf8(response.plaintext)
            .map_err(|e| SyncError::Internal(anyhow::anyhow!("UTF-8 decode failed: {}", e)))
    }
}
