//! Infrastructure provisioning: account verification, then instance
//! creation, via the declarative provisioner CLI.
//!
//! Both phases shell out through a [`CommandRunner`]. Neither phase is
//! retried here — the provisioner's apply semantics already converge
//! idempotently, so a repeated run for the same (actor, repo) pair targets
//! the same instance.

use std::process::Output;

use thiserror::Error;

use crate::command_runner::{CommandRunner, PROVISION_TIMEOUT, QUERY_TIMEOUT, TokioCommandRunner};
use crate::credentials::DeploymentCredentials;

/// Declared output attribute carrying the instance address.
const ADDRESS_OUTPUT: &str = "instance_ip";

/// The provisioned virtual machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedInstance {
    pub name: String,
    pub region: String,
    pub ip_address: String,
}

/// Deterministic instance name for an (actor, repo) pair.
///
/// Same pair always yields the same name, so repeated runs converge on the
/// same instance.
#[must_use]
pub fn instance_name(actor: &str, repo: &str) -> String {
    format!("{}-{}", actor.to_lowercase(), repo.to_lowercase())
}

/// Provisioning failures. `MissingAddress` is an internal-invariant
/// violation (success exit without the declared output) and is logged
/// distinctly from ordinary provisioning failure.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("account verification failed: {stderr}")]
    AccountVerification { stderr: String },

    #[error("instance creation failed: {stderr}")]
    Creation { stderr: String },

    #[error("provisioner reported success but declared no '{ADDRESS_OUTPUT}' output")]
    MissingAddress,

    #[error("provisioner invocation failed")]
    Invocation(#[from] anyhow::Error),
}

/// Inputs for the instance-creation phase.
pub struct CreateSpec<'a> {
    pub name: &'a str,
    pub region: &'a str,
    pub project_id: &'a str,
    pub public_key: &'a str,
}

/// Coordinates the two provisioning phases against separate provisioner
/// roots. Generic over the runner so tests can inject canned outputs.
pub struct ProvisionCoordinator<R: CommandRunner> {
    runner: R,
    verify_dir: String,
    deploy_dir: String,
}

impl ProvisionCoordinator<TokioCommandRunner> {
    /// Production coordinator with the default provisioning timeout.
    #[must_use]
    pub fn new(verify_dir: String, deploy_dir: String) -> Self {
        Self::with_runner(TokioCommandRunner::new(PROVISION_TIMEOUT), verify_dir, deploy_dir)
    }
}

impl<R: CommandRunner> ProvisionCoordinator<R> {
    pub fn with_runner(runner: R, verify_dir: String, deploy_dir: String) -> Self {
        Self {
            runner,
            verify_dir,
            deploy_dir,
        }
    }

    /// The underlying runner, for invocation inspection in tests.
    #[must_use]
    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Verify cloud-account access with the supplied credentials.
    ///
    /// Must succeed before any creation attempt; a failure aborts the run
    /// and is not retried at this layer.
    ///
    /// # Errors
    ///
    /// `AccountVerification` on a non-zero provisioner exit, `Invocation`
    /// when the provisioner cannot be spawned.
    pub async fn verify_account(
        &self,
        credentials: &DeploymentCredentials,
        region: &str,
        project_id: &str,
    ) -> Result<(), ProvisionError> {
        let chdir = format!("-chdir={}", self.verify_dir);
        let credentials_var = var("credentials", credentials.as_str());
        let region_var = var("region", region);
        let project_var = var("project_id", project_id);
        let args = [
            chdir.as_str(),
            "apply",
            "-auto-approve",
            "-input=false",
            "-no-color",
            "-var",
            &credentials_var,
            "-var",
            &region_var,
            "-var",
            &project_var,
        ];
        let output = self.runner.run("terraform", &args).await?;
        if output.status.success() {
            tracing::info!(project_id, region, "account verification passed");
            Ok(())
        } else {
            Err(ProvisionError::AccountVerification {
                stderr: stderr_of(&output),
            })
        }
    }

    /// Create (or converge on) the instance for `spec`.
    ///
    /// After a success exit, the declared address output is read back; its
    /// absence despite success is an internal-invariant violation.
    ///
    /// # Errors
    ///
    /// `Creation` on a non-zero apply exit, `MissingAddress` when the
    /// declared output is absent after success, `Invocation` on spawn
    /// failure.
    pub async fn create_instance(
        &self,
        spec: &CreateSpec<'_>,
        credentials: &DeploymentCredentials,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        let chdir = format!("-chdir={}", self.deploy_dir);
        let zone = format!("{}-a", spec.region);
        let credentials_var = var("credentials", credentials.as_str());
        let region_var = var("region", spec.region);
        let project_var = var("project_id", spec.project_id);
        let name_var = var("instance_name", spec.name);
        let key_var = var("public_key", spec.public_key);
        let zone_var = var("zone", &zone);
        let args = [
            chdir.as_str(),
            "apply",
            "-auto-approve",
            "-input=false",
            "-no-color",
            "-var",
            &credentials_var,
            "-var",
            &region_var,
            "-var",
            &project_var,
            "-var",
            &name_var,
            "-var",
            &key_var,
            "-var",
            &zone_var,
        ];
        let output = self.runner.run("terraform", &args).await?;
        if !output.status.success() {
            return Err(ProvisionError::Creation {
                stderr: stderr_of(&output),
            });
        }

        let ip_address = self.read_address().await?;
        tracing::info!(instance = spec.name, ip = %ip_address, "instance provisioned");
        Ok(ProvisionedInstance {
            name: spec.name.to_string(),
            region: spec.region.to_string(),
            ip_address,
        })
    }

    /// Read the declared instance address after a successful apply.
    async fn read_address(&self) -> Result<String, ProvisionError> {
        let chdir = format!("-chdir={}", self.deploy_dir);
        let args = [chdir.as_str(), "output", "-raw", ADDRESS_OUTPUT];
        let output = self
            .runner
            .run_with_timeout("terraform", &args, QUERY_TIMEOUT)
            .await?;
        let address = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if output.status.success() && !address.is_empty() {
            Ok(address)
        } else {
            tracing::error!(
                output = ADDRESS_OUTPUT,
                "apply succeeded but the declared address output is missing"
            );
            Err(ProvisionError::MissingAddress)
        }
    }

    /// Full two-phase provisioning: verify, then create.
    ///
    /// # Errors
    ///
    /// Propagates the first failing phase; creation is never attempted
    /// after a failed verification.
    pub async fn provision(
        &self,
        spec: &CreateSpec<'_>,
        credentials: &DeploymentCredentials,
    ) -> Result<ProvisionedInstance, ProvisionError> {
        self.verify_account(credentials, spec.region, spec.project_id)
            .await?;
        self.create_instance(spec, credentials).await
    }
}

fn var(name: &str, value: &str) -> String {
    format!("{name}={value}")
}

fn stderr_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).trim().to_string()
}
