//! Process-spawning [`CommandRunner`] backed by `tokio::process`.
//!
//! Stdout and stderr are captured through separate pipes and concatenated
//! (stdout first) once the child exits. Stdin is closed so a CLI that
//! unexpectedly prompts fails instead of blocking forever.

use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;

use super::{CommandOutput, CommandRunner, Invocation};
use crate::error::{BackupError, BackupResult, CommandFailure};

/// Maximum stdout or stderr size captured per stream (10 MiB).
const MAX_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

/// How long the readers may keep draining after a timed-out child is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

const EXEC_BUSY_RETRY_ATTEMPTS: usize = 20;
const EXEC_BUSY_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Runs invocations as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    /// Runner with no timeout; a hung command blocks its caller.
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Runner that kills any command running longer than `timeout`.
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemCommandRunner {
    async fn run(&self, invocation: &Invocation) -> BackupResult<CommandOutput> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(command = %invocation, "Running command");
        let start = Instant::now();

        let mut child = spawn_retrying_busy(&mut cmd)
            .await
            .map_err(|e| failure(invocation, String::new(), CommandFailure::Launch(e)))?;

        // Read both pipes concurrently so a chatty child cannot fill one
        // pipe and deadlock while we wait on it.
        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let mut stdout_task = tokio::spawn(async move { read_stream(stdout_handle).await });
        let mut stderr_task = tokio::spawn(async move { read_stream(stderr_handle).await });

        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(waited) => waited,
                Err(_elapsed) => {
                    // Dropping `child` kills it because of `kill_on_drop(true)`.
                    // Grandchildren may still hold the pipes open, so the
                    // readers only get a short grace period.
                    drop(child);
                    let deadline = tokio::time::Instant::now() + DRAIN_GRACE;
                    let stdout = drain(&mut stdout_task, deadline).await;
                    let stderr = drain(&mut stderr_task, deadline).await;
                    return Err(failure(
                        invocation,
                        combine(&stdout, &stderr),
                        CommandFailure::Timeout(limit),
                    ));
                }
            },
            None => child.wait().await,
        };

        let text = combine(
            &stdout_task.await.unwrap_or_default(),
            &stderr_task.await.unwrap_or_default(),
        );
        let status =
            status.map_err(|e| failure(invocation, text.clone(), CommandFailure::Launch(e)))?;
        let duration_ms = start.elapsed().as_millis() as u64;

        if !status.success() {
            return Err(failure(
                invocation,
                text,
                CommandFailure::Exit(status.code()),
            ));
        }

        Ok(CommandOutput { text, duration_ms })
    }
}

fn failure(invocation: &Invocation, output: String, cause: CommandFailure) -> BackupError {
    BackupError::CommandFailed {
        program: invocation.program.clone(),
        args: invocation.display_args(),
        output,
        cause,
    }
}

fn combine(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(stderr));
    text
}

/// Wait for a reader until `deadline`, aborting it if it is still blocked.
async fn drain(task: &mut JoinHandle<Vec<u8>>, deadline: tokio::time::Instant) -> Vec<u8> {
    match tokio::time::timeout_at(deadline, &mut *task).await {
        Ok(bytes) => bytes.unwrap_or_default(),
        Err(_elapsed) => {
            task.abort();
            Vec::new()
        }
    }
}

/// Spawn `cmd`, retrying briefly while the executable is busy (ETXTBSY).
///
/// A freshly written executable can still be held open for writing by a
/// concurrently forked process. This is a launch retry only: a process
/// that actually ran is never started a second time.
async fn spawn_retrying_busy(cmd: &mut Command) -> std::io::Result<Child> {
    let mut attempt = 0;
    loop {
        match cmd.spawn() {
            Err(e) if is_exec_busy(&e) && attempt + 1 < EXEC_BUSY_RETRY_ATTEMPTS => {
                attempt += 1;
                tokio::time::sleep(EXEC_BUSY_RETRY_DELAY).await;
            }
            result => return result,
        }
    }
}

fn is_exec_busy(error: &std::io::Error) -> bool {
    error.kind() == std::io::ErrorKind::ExecutableFileBusy || error.raw_os_error() == Some(26)
}

/// Read an entire output stream into a byte buffer, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
