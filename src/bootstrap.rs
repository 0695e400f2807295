//! Remote bootstrap of a freshly provisioned instance.
//!
//! Opens a remote execution channel to the instance and runs the bootstrap
//! script chain, waiting out the instance's network stack with a bounded
//! retry loop. Connectivity failure and script failure are distinct
//! terminal outcomes: only the former is retried.

use std::time::Duration;

use anyhow::{Context, Result};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::command_runner::CommandRunner;
use crate::routing::RoutingParams;

/// Remote script entry points, one per runtime mode. Each runs the full
/// chain: install key, configure site identity, provision the runtime,
/// write routing rules.
const DOCKER_SCRIPT: &str = "/opt/windlass/deploy-docker.sh";
const HOST_SCRIPT: &str = "/opt/windlass/deploy-nodocker.sh";

/// Result of one channel attempt, as observed at the remote-execution
/// boundary. Host unreachability is an explicit case rather than a magic
/// exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SshOutcome {
    /// The channel could not be established — the host is not reachable yet.
    Unreachable,
    /// The remote command ran to completion with this exit code.
    Exit(i32),
}

/// Terminal bootstrap failures.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("instance unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },

    #[error("bootstrap script exited with code {code}")]
    ScriptFailure { code: i32 },

    #[error("remote execution channel failed")]
    Channel(#[from] anyhow::Error),
}

/// Inputs to the bootstrap script chain for one run.
pub struct BootstrapArgs<'a> {
    pub public_key: &'a str,
    pub actor: &'a str,
    pub repo: &'a str,
    pub visibility: &'a str,
    pub auth_token: Option<&'a str>,
    pub runtime_mode: &'a str,
    pub routing: &'a RoutingParams,
}

impl BootstrapArgs<'_> {
    /// Build the composite remote command: one entry script (selected by
    /// runtime mode) plus its positional arguments.
    #[must_use]
    pub fn remote_command(&self, address: &str) -> Vec<String> {
        let script = if self.runtime_mode == "docker" {
            DOCKER_SCRIPT
        } else {
            HOST_SCRIPT
        };
        let mut command = vec![
            "sudo".to_string(),
            "bash".to_string(),
            script.to_string(),
            self.public_key.to_string(),
            self.actor.to_string(),
            self.repo.to_string(),
            self.visibility.to_string(),
            self.auth_token.unwrap_or_default().to_string(),
            self.repo.to_string(),
            address.to_string(),
        ];
        command.extend(self.routing.as_args());
        command
    }
}

/// Quote one word for the remote login shell.
///
/// ssh joins its command operands with single spaces and hands the result
/// to the remote shell, which re-splits and interprets it. Every word is
/// therefore single-quoted: spaced values (public keys) stay one word,
/// empty values ("" tokens) survive the join, and untrusted values (actor,
/// repo, token) cannot smuggle shell syntax onto the instance.
#[must_use]
pub fn quote_for_remote_shell(word: &str) -> String {
    format!("'{}'", word.replace('\'', r"'\''"))
}

/// Remote execution channel to one instance.
#[allow(async_fn_in_trait)]
pub trait RemoteChannel {
    /// Run `command` on `address`, forwarding remote output to the log
    /// sink as it arrives.
    ///
    /// # Errors
    ///
    /// Returns an error only when the channel itself cannot be set up
    /// locally; remote connectivity failure is `Ok(Unreachable)`.
    async fn run(&self, address: &str, command: &[String]) -> Result<SshOutcome>;
}

/// OpenSSH channel: fixed login identity, host-identity verification
/// disabled (trusted-network assumption).
pub struct OpenSshChannel<R: CommandRunner> {
    runner: R,
    login_user: String,
}

impl<R: CommandRunner> OpenSshChannel<R> {
    pub fn new(runner: R, login_user: String) -> Self {
        Self { runner, login_user }
    }
}

impl<R: CommandRunner> RemoteChannel for OpenSshChannel<R> {
    async fn run(&self, address: &str, command: &[String]) -> Result<SshOutcome> {
        let quoted: Vec<String> = command
            .iter()
            .map(|word| quote_for_remote_shell(word))
            .collect();
        let mut args = vec![
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "ConnectTimeout=15",
            "-l",
            &self.login_user,
            address,
            "--",
        ];
        args.extend(quoted.iter().map(String::as_str));

        let mut child = self.runner.spawn("ssh", &args)?;

        // Forward remote output line by line without blocking the wait.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stdout_task = tokio::spawn(async move {
            if let Some(out) = stdout {
                let mut lines = BufReader::new(out).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "bootstrap", "{line}");
                }
            }
        });
        let stderr_task = tokio::spawn(async move {
            if let Some(err) = stderr {
                let mut lines = BufReader::new(err).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(target: "bootstrap", "{line}");
                }
            }
        });

        let status = child.wait().await.context("waiting for ssh")?;
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        // ssh reserves 255 for its own connection errors; every other code
        // is the remote command's.
        Ok(match status.code() {
            Some(255) | None => SshOutcome::Unreachable,
            Some(code) => SshOutcome::Exit(code),
        })
    }
}

/// Drives the retrying bootstrap procedure for one instance.
pub struct BootstrapExecutor<C: RemoteChannel> {
    channel: C,
    delay: Duration,
    max_attempts: u32,
}

impl<C: RemoteChannel> BootstrapExecutor<C> {
    pub fn new(channel: C, delay: Duration, max_attempts: u32) -> Self {
        Self {
            channel,
            delay,
            max_attempts,
        }
    }

    /// The underlying channel, for attempt inspection in tests.
    #[must_use]
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Run the bootstrap chain on `address`.
    ///
    /// Waits `delay` before every connection attempt (the instance's
    /// network stack needs time to come up, and the same wait is re-entered
    /// after each unreachable outcome). Unreachability is retried up to the
    /// ceiling; a non-zero script exit is terminal immediately.
    ///
    /// # Errors
    ///
    /// `Unreachable` once the ceiling is exhausted, `ScriptFailure` on a
    /// non-zero remote exit, `Channel` when the channel cannot be set up.
    pub async fn run(
        &self,
        address: &str,
        args: &BootstrapArgs<'_>,
    ) -> Result<(), BootstrapError> {
        let command = args.remote_command(address);
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.delay).await;
            tracing::info!(address, attempt, max = self.max_attempts, "connecting");
            match self.channel.run(address, &command).await? {
                SshOutcome::Unreachable => {
                    tracing::warn!(address, attempt, "instance not reachable yet");
                }
                SshOutcome::Exit(0) => {
                    tracing::info!(address, "bootstrap succeeded");
                    return Ok(());
                }
                SshOutcome::Exit(code) => {
                    return Err(BootstrapError::ScriptFailure { code });
                }
            }
        }
        Err(BootstrapError::Unreachable {
            attempts: self.max_attempts,
        })
    }
}
