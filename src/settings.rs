//! Service configuration loaded from `WINDLASS_*` environment variables.

use serde::Deserialize;

/// Runtime settings, loaded once at startup via `envy`.
///
/// Each field maps to `WINDLASS_<FIELD>`:
///   - `WINDLASS_LISTEN_ADDR`            (default `0.0.0.0:8080`)
///   - `WINDLASS_CONFIG_API_BASE`        (required)
///   - `WINDLASS_OBJECT_STORE_BASE`      (required)
///   - `WINDLASS_CREDENTIAL_BUCKET`      (required)
///   - `WINDLASS_INTAKE_ENDPOINT`        (optional, notification sink)
///   - `WINDLASS_VERIFY_DIR`             (default `infra/verify`)
///   - `WINDLASS_DEPLOY_DIR`             (default `infra/deploy`)
///   - `WINDLASS_SSH_USER`               (default `deploy`)
///   - `WINDLASS_BOOTSTRAP_DELAY_SECS`   (default `30`)
///   - `WINDLASS_BOOTSTRAP_MAX_ATTEMPTS` (default `5`)
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Socket address the intake HTTP server binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Base URL of the Config Service.
    pub config_api_base: String,

    /// Base URL of the object store holding credential blobs.
    pub object_store_base: String,

    /// Bucket name under which credential blobs live.
    pub credential_bucket: String,

    /// Endpoint receiving fire-and-forget install notifications.
    /// When unset, notifications are logged but not forwarded.
    pub intake_endpoint: Option<String>,

    /// Provisioner root used for the account-verification phase.
    #[serde(default = "default_verify_dir")]
    pub verify_dir: String,

    /// Provisioner root used for the instance-creation phase.
    #[serde(default = "default_deploy_dir")]
    pub deploy_dir: String,

    /// Login identity used for the remote bootstrap channel.
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,

    /// Delay before each bootstrap connection attempt, in seconds.
    #[serde(default = "default_bootstrap_delay_secs")]
    pub bootstrap_delay_secs: u64,

    /// Ceiling on consecutive unreachable outcomes before giving up.
    #[serde(default = "default_bootstrap_max_attempts")]
    pub bootstrap_max_attempts: u32,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_verify_dir() -> String {
    "infra/verify".to_string()
}

fn default_deploy_dir() -> String {
    "infra/deploy".to_string()
}

fn default_ssh_user() -> String {
    "deploy".to_string()
}

fn default_bootstrap_delay_secs() -> u64 {
    30
}

fn default_bootstrap_max_attempts() -> u32 {
    5
}

impl Settings {
    /// Load settings from `WINDLASS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or malformed.
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;
        envy::prefixed("WINDLASS_").from_env().context(
            "failed to load config from WINDLASS_* env vars \
             (WINDLASS_CONFIG_API_BASE, WINDLASS_OBJECT_STORE_BASE and \
             WINDLASS_CREDENTIAL_BUCKET are required)",
        )
    }
}
