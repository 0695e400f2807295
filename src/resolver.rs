//! Config resolution: five Config Service lookups folded into one
//! `ResolvedConfig` per run.

use serde::Deserialize;
use thiserror::Error;

use crate::routing::PortBinding;

/// Fallback runtime mode when the lookup is unavailable.
pub const DEFAULT_RUNTIME_MODE: &str = "nodocker";

/// Errors from config resolution. Only the first two lookups are fatal;
/// the rest degrade to defaults.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no deployment config registered for {actor}/{repo}")]
    NotFound { actor: String, repo: String },

    #[error("config service lookup '{lookup}' failed: {source}")]
    Upstream {
        lookup: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

// ── Wire shapes ───────────────────────────────────────────────────────────────

/// Row from the config-id lookup.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigIdRow {
    #[serde(rename = "ID")]
    pub id: u64,
    pub visibility: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Detail record for one config id.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDetail {
    /// Object-store blob holding the deployment credentials.
    pub file_id: String,
    pub project_id: String,
    pub region: String,
}

/// The key endpoint answers with either a bare object or a
/// single-element array, depending on the upstream version.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PublicKeyDoc {
    One { public_key: String },
    Many(Vec<PublicKeyEntry>),
}

#[derive(Debug, Deserialize)]
pub struct PublicKeyEntry {
    pub public_key: String,
}

impl PublicKeyDoc {
    #[must_use]
    pub fn into_key(self) -> String {
        match self {
            Self::One { public_key } => public_key,
            Self::Many(entries) => entries
                .into_iter()
                .next()
                .map(|e| e.public_key)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RuntimeModeDoc {
    pub docker_status: String,
}

// ── Port ──────────────────────────────────────────────────────────────────────

/// Read-only Config Service client. Implementations must not cache —
/// configuration is recomputed on every run.
#[allow(async_fn_in_trait)]
pub trait ConfigApi {
    /// `GET configId?user=&repo=`
    async fn config_id(&self, user: &str, repo: &str) -> anyhow::Result<Vec<ConfigIdRow>>;
    /// `GET config?ID=`
    async fn config_detail(&self, id: u64) -> anyhow::Result<ConfigDetail>;
    /// `GET ports?ID=`
    async fn ports(&self, id: u64) -> anyhow::Result<Vec<PortBinding>>;
    /// `GET key?ID=`
    async fn public_key(&self, id: u64) -> anyhow::Result<PublicKeyDoc>;
    /// `GET docker?ID=`
    async fn runtime_mode(&self, id: u64) -> anyhow::Result<RuntimeModeDoc>;
}

// ── Resolved configuration ────────────────────────────────────────────────────

/// Everything the pipeline needs for one run. Never persisted.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config_id: u64,
    pub visibility: String,
    pub auth_token: Option<String>,
    pub project_id: String,
    pub region: String,
    pub credential_blob_id: String,
    pub public_key: String,
    pub runtime_mode: String,
    pub port_bindings: Vec<PortBinding>,
}

/// Resolve `(actor, repo)` into a full deployment configuration.
///
/// The id and detail lookups are fatal; ports, key and runtime mode
/// degrade to defaults when their lookups fail. The id lookup can yield
/// more than one row upstream — the first row is used as-is.
///
/// # Errors
///
/// `ResolveError::NotFound` when no config is registered for the pair;
/// `ResolveError::Upstream` when the id or detail lookup fails.
pub async fn resolve(
    api: &impl ConfigApi,
    actor: &str,
    repo: &str,
) -> Result<ResolvedConfig, ResolveError> {
    let rows = api
        .config_id(actor, repo)
        .await
        .map_err(|source| ResolveError::Upstream {
            lookup: "configId",
            source,
        })?;
    let Some(row) = rows.into_iter().next() else {
        return Err(ResolveError::NotFound {
            actor: actor.to_string(),
            repo: repo.to_string(),
        });
    };

    let detail = api
        .config_detail(row.id)
        .await
        .map_err(|source| ResolveError::Upstream {
            lookup: "config",
            source,
        })?;

    // The remaining lookups are independent of each other and non-fatal.
    let (ports, key, mode) = tokio::join!(
        api.ports(row.id),
        api.public_key(row.id),
        api.runtime_mode(row.id),
    );

    let port_bindings = ports.unwrap_or_else(|err| {
        tracing::warn!(config_id = row.id, error = %err, "port lookup failed, using no bindings");
        Vec::new()
    });
    let public_key = key.map(PublicKeyDoc::into_key).unwrap_or_else(|err| {
        tracing::warn!(config_id = row.id, error = %err, "key lookup failed, using empty key");
        String::new()
    });
    let runtime_mode = mode.map(|doc| doc.docker_status).unwrap_or_else(|err| {
        tracing::warn!(
            config_id = row.id,
            error = %err,
            "runtime mode lookup failed, defaulting to {DEFAULT_RUNTIME_MODE}"
        );
        DEFAULT_RUNTIME_MODE.to_string()
    });

    Ok(ResolvedConfig {
        config_id: row.id,
        visibility: row.visibility,
        auth_token: row.token,
        project_id: detail.project_id,
        region: detail.region,
        credential_blob_id: detail.file_id,
        public_key,
        runtime_mode,
        port_bindings,
    })
}

// ── HTTP implementation ───────────────────────────────────────────────────────

/// Production `ConfigApi` backed by the Config Service HTTP API.
pub struct HttpConfigApi {
    client: reqwest::Client,
    base: String,
}

impl HttpConfigApi {
    #[must_use]
    pub fn new(client: reqwest::Client, base: String) -> Self {
        Self { client, base }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> anyhow::Result<T> {
        use anyhow::Context;
        let url = format!("{}/{path}", self.base.trim_end_matches('/'));
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?
            .error_for_status()
            .with_context(|| format!("GET {url}"))?;
        response
            .json()
            .await
            .with_context(|| format!("decoding {url} response"))
    }
}

impl ConfigApi for HttpConfigApi {
    async fn config_id(&self, user: &str, repo: &str) -> anyhow::Result<Vec<ConfigIdRow>> {
        self.get_json(
            "configId",
            &[("user", user.to_string()), ("repo", repo.to_string())],
        )
        .await
    }

    async fn config_detail(&self, id: u64) -> anyhow::Result<ConfigDetail> {
        self.get_json("config", &[("ID", id.to_string())]).await
    }

    async fn ports(&self, id: u64) -> anyhow::Result<Vec<PortBinding>> {
        self.get_json("ports", &[("ID", id.to_string())]).await
    }

    async fn public_key(&self, id: u64) -> anyhow::Result<PublicKeyDoc> {
        self.get_json("key", &[("ID", id.to_string())]).await
    }

    async fn runtime_mode(&self, id: u64) -> anyhow::Result<RuntimeModeDoc> {
        self.get_json("docker", &[("ID", id.to_string())]).await
    }
}
