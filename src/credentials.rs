//! Deployment credential retrieval from object storage.
//!
//! Credentials are fetched once per run, owned by that run, and dropped at
//! run end. They are never written to durable storage and never logged.

use thiserror::Error;

/// Errors from the credential fetch. Both variants abort the run —
/// credentials are mandatory for provisioning.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential blob '{blob_id}' could not be fetched: {source}")]
    NotFound {
        blob_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("credential blob '{blob_id}' is not a valid credential document")]
    Corrupt { blob_id: String },
}

/// An opaque credential document. The contents are passed through to the
/// infrastructure provisioner verbatim; this type only guarantees the
/// document parsed as JSON.
pub struct DeploymentCredentials {
    raw: String,
}

impl DeploymentCredentials {
    /// Validate and wrap raw bytes fetched from the object store.
    ///
    /// # Errors
    ///
    /// `CredentialError::Corrupt` when the bytes are not a JSON document.
    pub fn from_bytes(blob_id: &str, bytes: &[u8]) -> Result<Self, CredentialError> {
        let raw = std::str::from_utf8(bytes)
            .ok()
            .filter(|s| serde_json::from_str::<serde_json::Value>(s).is_ok())
            .ok_or_else(|| CredentialError::Corrupt {
                blob_id: blob_id.to_string(),
            })?;
        Ok(Self {
            raw: raw.to_string(),
        })
    }

    /// The serialized document, for structured handoff to the provisioner.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl std::fmt::Debug for DeploymentCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeploymentCredentials(<redacted>)")
    }
}

/// Object store read access for credential blobs.
#[allow(async_fn_in_trait)]
pub trait CredentialStore {
    /// Fetch and validate the credential blob.
    ///
    /// # Errors
    ///
    /// `NotFound` when the blob cannot be fetched, `Corrupt` when it does
    /// not parse as a credential document.
    async fn fetch(&self, blob_id: &str) -> Result<DeploymentCredentials, CredentialError>;
}

/// Production store: a single `GET <base>/<bucket>/<blob_id>`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    base: String,
    bucket: String,
}

impl HttpObjectStore {
    #[must_use]
    pub fn new(client: reqwest::Client, base: String, bucket: String) -> Self {
        Self {
            client,
            base,
            bucket,
        }
    }
}

impl CredentialStore for HttpObjectStore {
    async fn fetch(&self, blob_id: &str) -> Result<DeploymentCredentials, CredentialError> {
        let url = format!(
            "{}/{}/{blob_id}",
            self.base.trim_end_matches('/'),
            self.bucket
        );
        let not_found = |source: anyhow::Error| CredentialError::NotFound {
            blob_id: blob_id.to_string(),
            source,
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| not_found(e.into()))?
            .error_for_status()
            .map_err(|e| not_found(e.into()))?;
        let bytes = response.bytes().await.map_err(|e| not_found(e.into()))?;
        DeploymentCredentials::from_bytes(blob_id, &bytes)
    }
}
