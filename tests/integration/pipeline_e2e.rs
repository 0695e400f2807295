//! End-to-end pipeline scenarios over mocked ports.

#![allow(clippy::expect_used)]

use std::collections::VecDeque;
use std::process::Output;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Result;

use windlass::bootstrap::{BootstrapExecutor, RemoteChannel, SshOutcome};
use windlass::command_runner::CommandRunner;
use windlass::credentials::{CredentialError, CredentialStore, DeploymentCredentials};
use windlass::pipeline::{self, DeployError, Deps};
use windlass::provision::ProvisionCoordinator;
use windlass::resolver::{ConfigApi, ConfigDetail, ConfigIdRow, PublicKeyDoc, RuntimeModeDoc};
use windlass::routing::PortBinding;

// ── Mocks ─────────────────────────────────────────────────────────────────────

struct StaticConfigApi {
    rows: Vec<ConfigIdRow>,
    detail: ConfigDetail,
    ports: Vec<PortBinding>,
}

impl ConfigApi for StaticConfigApi {
    async fn config_id(&self, _: &str, _: &str) -> Result<Vec<ConfigIdRow>> {
        Ok(self.rows.clone())
    }
    async fn config_detail(&self, _: u64) -> Result<ConfigDetail> {
        Ok(self.detail.clone())
    }
    async fn ports(&self, _: u64) -> Result<Vec<PortBinding>> {
        Ok(self.ports.clone())
    }
    async fn public_key(&self, _: u64) -> Result<PublicKeyDoc> {
        Ok(PublicKeyDoc::One {
            public_key: "ssh-ed25519 AAAA".to_string(),
        })
    }
    async fn runtime_mode(&self, _: u64) -> Result<RuntimeModeDoc> {
        Ok(RuntimeModeDoc {
            docker_status: "nodocker".to_string(),
        })
    }
}

struct StaticStore {
    fail: bool,
}

impl CredentialStore for StaticStore {
    async fn fetch(&self, blob_id: &str) -> Result<DeploymentCredentials, CredentialError> {
        if self.fail {
            return Err(CredentialError::NotFound {
                blob_id: blob_id.to_string(),
                source: anyhow::anyhow!("object store unavailable"),
            });
        }
        DeploymentCredentials::from_bytes(blob_id, br#"{"type":"service_account"}"#)
    }
}

struct ScriptedRunner {
    outputs: Mutex<VecDeque<Output>>,
    calls: Mutex<usize>,
}

impl ScriptedRunner {
    fn new(outputs: Vec<Output>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            calls: Mutex::new(0),
        }
    }
}

/// Build an `ExitStatus` from a logical exit code (cross-platform).
#[cfg(unix)]
fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    std::process::ExitStatus::from_raw(code << 8)
}

#[cfg(windows)]
fn exit_status(code: i32) -> std::process::ExitStatus {
    use std::os::windows::process::ExitStatusExt;
    #[allow(clippy::cast_sign_loss)]
    std::process::ExitStatus::from_raw(code as u32)
}

fn ok_output(stdout: &[u8]) -> Output {
    Output {
        status: exit_status(0),
        stdout: stdout.to_vec(),
        stderr: Vec::new(),
    }
}

impl CommandRunner for ScriptedRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, Duration::ZERO).await
    }

    async fn run_with_timeout(&self, _: &str, _: &[&str], _: Duration) -> Result<Output> {
        *self.calls.lock().expect("calls lock") += 1;
        self.outputs
            .lock()
            .expect("outputs lock")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted output left"))
    }

    fn spawn(&self, _: &str, _: &[&str]) -> Result<tokio::process::Child> {
        anyhow::bail!("not expected in this test")
    }
}

struct OneShotChannel {
    commands: Mutex<Vec<Vec<String>>>,
}

impl RemoteChannel for OneShotChannel {
    async fn run(&self, _: &str, command: &[String]) -> Result<SshOutcome> {
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.to_vec());
        Ok(SshOutcome::Exit(0))
    }
}

fn deps(
    api: StaticConfigApi,
    store: StaticStore,
    runner: ScriptedRunner,
) -> Deps<StaticConfigApi, StaticStore, ScriptedRunner, OneShotChannel> {
    Deps {
        config_api: api,
        credential_store: store,
        provisioner: ProvisionCoordinator::with_runner(
            runner,
            "infra/verify".to_string(),
            "infra/deploy".to_string(),
        ),
        bootstrapper: BootstrapExecutor::new(
            OneShotChannel {
                commands: Mutex::new(Vec::new()),
            },
            Duration::ZERO,
            5,
        ),
    }
}

fn scenario_api() -> StaticConfigApi {
    StaticConfigApi {
        rows: vec![
            serde_json::from_value(serde_json::json!({"ID": 7, "visibility": "public"}))
                .expect("row"),
        ],
        detail: serde_json::from_value(
            serde_json::json!({"file_id": "f1", "project_id": "p1", "region": "r1"}),
        )
        .expect("detail"),
        ports: serde_json::from_value(
            serde_json::json!([{"port_no": 80, "port_proxy": "/", "port_type": "frontend"}]),
        )
        .expect("ports"),
    }
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn issue_opened_event_deploys_end_to_end() {
    let deps = deps(
        scenario_api(),
        StaticStore { fail: false },
        ScriptedRunner::new(vec![ok_output(b""), ok_output(b""), ok_output(b"1.2.3.4")]),
    );

    let instance = pipeline::deploy(&deps, "alice", "demo")
        .await
        .expect("pipeline succeeds");

    assert_eq!(instance.name, "alice-demo");
    assert_eq!(instance.region, "r1");
    assert_eq!(instance.ip_address, "1.2.3.4");

    // The bootstrap chain saw the resolved routing topology.
    let commands = deps
        .bootstrapper
        .channel()
        .commands
        .lock()
        .expect("commands lock");
    assert_eq!(commands.len(), 1);
    let command = &commands[0];
    assert!(command.contains(&"alice".to_string()));
    assert!(command.contains(&"1.2.3.4".to_string()));
    // frontend present at "/" on port 80, backend unset.
    let tail = &command[command.len() - 6..];
    assert_eq!(tail, ["yes", "/", "80", "no", "none", "none"]);
}

#[tokio::test]
async fn credential_failure_aborts_before_provisioning() {
    let deps = deps(
        scenario_api(),
        StaticStore { fail: true },
        ScriptedRunner::new(Vec::new()),
    );

    let err = pipeline::deploy(&deps, "alice", "demo")
        .await
        .expect_err("credential fetch must abort the run");
    assert!(matches!(err, DeployError::Credential(_)));
    // The provisioner was never invoked.
    assert_eq!(*deps.provisioner.runner().calls.lock().expect("calls"), 0);
}

#[tokio::test]
async fn missing_config_aborts_without_side_effects() {
    let mut api = scenario_api();
    api.rows.clear();
    let deps = deps(api, StaticStore { fail: false }, ScriptedRunner::new(Vec::new()));

    let err = pipeline::deploy(&deps, "alice", "demo")
        .await
        .expect_err("missing config must abort");
    assert!(matches!(err, DeployError::Resolve(_)));
    assert_eq!(*deps.provisioner.runner().calls.lock().expect("calls"), 0);
}
