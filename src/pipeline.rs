//! The deployment pipeline: resolve, fetch credentials, provision,
//! bootstrap — strictly sequential, fail-fast at each stage.

use thiserror::Error;

use crate::bootstrap::{BootstrapArgs, BootstrapError, BootstrapExecutor, RemoteChannel};
use crate::command_runner::CommandRunner;
use crate::credentials::{CredentialError, CredentialStore};
use crate::provision::{CreateSpec, ProvisionCoordinator, ProvisionError, ProvisionedInstance, instance_name};
use crate::resolver::{ConfigApi, ResolveError, resolve};
use crate::routing::RoutingParams;

/// A failed run, tagged by the stage that aborted it.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
}

/// The collaborators one run needs. All injected as port traits so the
/// pipeline can be driven end to end without network, provisioner, or ssh.
pub struct Deps<A, S, R, C>
where
    A: ConfigApi,
    S: CredentialStore,
    R: CommandRunner,
    C: RemoteChannel,
{
    pub config_api: A,
    pub credential_store: S,
    pub provisioner: ProvisionCoordinator<R>,
    pub bootstrapper: BootstrapExecutor<C>,
}

/// Run the full pipeline for one (actor, repo) pair.
///
/// Concurrent runs for the same pair are not serialized here; instance
/// naming is deterministic, so they converge on the same instance through
/// the provisioner's apply semantics. The race is surfaced to operators in
/// the start log line.
///
/// # Errors
///
/// The first failing stage aborts the run with its tagged error.
pub async fn deploy<A, S, R, C>(
    deps: &Deps<A, S, R, C>,
    actor: &str,
    repo: &str,
) -> Result<ProvisionedInstance, DeployError>
where
    A: ConfigApi,
    S: CredentialStore,
    R: CommandRunner,
    C: RemoteChannel,
{
    let name = instance_name(actor, repo);
    tracing::info!(
        actor,
        repo,
        instance = %name,
        "deploy starting (concurrent runs for this pair share the instance)"
    );

    let config = resolve(&deps.config_api, actor, repo).await?;
    tracing::info!(config_id = config.config_id, region = %config.region, "config resolved");

    let credentials = deps
        .credential_store
        .fetch(&config.credential_blob_id)
        .await?;

    let instance = deps
        .provisioner
        .provision(
            &CreateSpec {
                name: &name,
                region: &config.region,
                project_id: &config.project_id,
                public_key: &config.public_key,
            },
            &credentials,
        )
        .await?;

    let routing = RoutingParams::derive(&config.port_bindings);
    deps.bootstrapper
        .run(
            &instance.ip_address,
            &BootstrapArgs {
                public_key: &config.public_key,
                actor,
                repo,
                visibility: &config.visibility,
                auth_token: config.auth_token.as_deref(),
                runtime_mode: &config.runtime_mode,
                routing: &routing,
            },
        )
        .await?;

    tracing::info!(instance = %instance.name, ip = %instance.ip_address, "deploy finished");
    Ok(instance)
    // `credentials` drops here — the document never outlives the run.
}
