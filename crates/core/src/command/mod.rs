//! External command execution.
//!
//! Every interaction with the vault CLI and git goes through a
//! [`CommandRunner`]. The production runner spawns real processes
//! ([`subprocess::SystemCommandRunner`]); tests substitute a recorder.

pub mod subprocess;

use crate::error::BackupResult;

/// Placeholder shown instead of secret arguments in logs and errors.
pub const MASK: &str = "********";

/// A fully described external command.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program name or path.
    pub program: String,
    /// Ordered argument list.
    pub args: Vec<String>,
    /// Extra environment variables, layered over the inherited environment.
    pub env: Vec<(String, String)>,
    /// Indices into `args` that must never be displayed.
    pub secret_args: Vec<usize>,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            secret_args: Vec::new(),
        }
    }

    /// Append an argument whose value is masked when displayed.
    pub fn secret_arg(mut self, value: impl Into<String>) -> Self {
        self.secret_args.push(self.args.len());
        self.args.push(value.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Arguments with secret values replaced by [`MASK`].
    pub fn display_args(&self) -> Vec<String> {
        self.args
            .iter()
            .enumerate()
            .map(|(i, arg)| {
                if self.secret_args.contains(&i) {
                    MASK.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }
}

// Environment values carry credentials, so only their keys are shown.
impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.display_args())
            .field("env", &env_keys)
            .finish()
    }
}

impl std::fmt::Display for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in self.display_args() {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Output of a command that exited successfully.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Combined output: stdout followed by stderr.
    pub text: String,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Runs external commands to completion.
///
/// Implementations return `Ok` only for a zero exit status. Anything else
/// (non-zero exit, spawn failure, timeout) is a
/// [`BackupError::CommandFailed`](crate::error::BackupError::CommandFailed)
/// carrying the captured output and masked arguments.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl std::future::Future<Output = BackupResult<CommandOutput>> + Send;
}

impl<R: CommandRunner> CommandRunner for std::sync::Arc<R> {
    fn run(
        &self,
        invocation: &Invocation,
    ) -> impl std::future::Future<Output = BackupResult<CommandOutput>> + Send {
        (**self).run(invocation)
    }
}

/// Log a successful command's output line by line at info level, skipping
/// blanks, followed by its duration.
pub fn report_output(program: &str, output: &CommandOutput) {
    for line in output.text.lines().map(str::trim_end).filter(|l| !l.is_empty()) {
        tracing::info!(program, "{line}");
    }
    tracing::info!(program, duration_ms = output.duration_ms, "Command finished");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
