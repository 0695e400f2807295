//! Subprocess execution with timeout and guaranteed kill.
//!
//! Everything that shells out (the infrastructure provisioner, the remote
//! execution channel) goes through this port so tests can inject canned
//! results without spawning processes.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;

/// Default ceiling for provisioner invocations (plan/apply may converge
/// slowly on first creation).
pub const PROVISION_TIMEOUT: Duration = Duration::from_secs(900);

/// Default ceiling for short queries (declared-output reads).
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(60);

/// Generic command execution. Arguments are always passed as a structured
/// array — never interpolated into a shell string — so untrusted values
/// (actor, repo, credentials) cannot inject commands.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command with the instance's default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;

    /// Run a command with a custom timeout (overrides default).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;

    /// Spawn a command with piped stdout/stderr and return the child handle.
    /// No timeout — the caller owns the child lifetime. `kill_on_drop(true)`
    /// is set as a safety net.
    ///
    /// # Errors
    ///
    /// Returns an error if the process fails to spawn.
    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child>;
}

/// Production runner — tokio process execution with explicit kill on
/// timeout. `tokio::time::timeout` around `.output().await` alone does not
/// kill the child when the timeout fires, so `tokio::select!` with
/// `child.kill()` is used instead.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let mut stdout_handle = child.stdout.take();
        let mut stderr_handle = child.stderr.take();

        // Read stdout/stderr concurrently with wait() — a child writing
        // more than the OS pipe buffer would otherwise deadlock against a
        // bare wait().
        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(
                    child.wait(),
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stdout_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                    async {
                        let mut buf = Vec::new();
                        if let Some(ref mut h) = stderr_handle {
                            let _ = h.read_to_end(&mut buf).await;
                        }
                        buf
                    },
                );
                Ok(Output {
                    status: status.with_context(|| format!("waiting for {program}"))?,
                    stdout,
                    stderr,
                })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }

    fn spawn(&self, program: &str, args: &[&str]) -> Result<tokio::process::Child> {
        tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))
    }
}
