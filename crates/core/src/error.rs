//! Error taxonomy shared by every stage of a backup run.

use std::fmt;
use std::time::Duration;

/// Why an external command did not succeed.
#[derive(Debug)]
pub enum CommandFailure {
    /// The process ran and exited unsuccessfully (`None` if killed by signal).
    Exit(Option<i32>),
    /// The process could not be spawned or waited on.
    Launch(std::io::Error),
    /// The process exceeded the configured timeout and was killed.
    Timeout(Duration),
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exit(Some(code)) => write!(f, "exited with status {code}"),
            Self::Exit(None) => write!(f, "terminated by signal"),
            Self::Launch(err) if err.kind() == std::io::ErrorKind::NotFound => {
                write!(f, "binary not found: {err}")
            }
            Self::Launch(err) => write!(f, "failed to launch: {err}"),
            Self::Timeout(limit) => write!(f, "timed out after {}s", limit.as_secs()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{var} must be set")]
    ConfigMissing { var: &'static str },

    #[error("Invalid backup interval '{value}': {reason}")]
    InvalidInterval { value: String, reason: String },

    #[error("Invalid failure policy '{0}': expected 'exit' or 'continue'")]
    InvalidFailurePolicy(String),

    #[error("Invalid command timeout '{value}': expected a positive number of seconds")]
    InvalidTimeout { value: String },

    /// `args` are already masked; `output` is the combined stdout/stderr.
    #[error("Command `{program} {}` failed: {cause}", .args.join(" "))]
    CommandFailed {
        program: String,
        args: Vec<String>,
        output: String,
        cause: CommandFailure,
    },

    #[error("Session token not found in unlock output")]
    SessionNotFound,

    #[error("A backup cycle is already in progress")]
    CycleInProgress,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BackupError {
    /// Captured process output, if this error came from an external command.
    pub fn command_output(&self) -> Option<&str> {
        match self {
            Self::CommandFailed { output, .. } => Some(output),
            _ => None,
        }
    }
}

pub type BackupResult<T> = Result<T, BackupError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_config_missing() {
        let err = BackupError::ConfigMissing {
            var: "GIT_REPOSITORY",
        };
        assert_eq!(err.to_string(), "GIT_REPOSITORY must be set");
    }

    #[test]
    fn display_command_failed_exit() {
        let err = BackupError::CommandFailed {
            program: "git".to_string(),
            args: vec!["push".to_string(), "origin".to_string(), "main".to_string()],
            output: "rejected".to_string(),
            cause: CommandFailure::Exit(Some(1)),
        };
        assert_eq!(
            err.to_string(),
            "Command `git push origin main` failed: exited with status 1"
        );
        assert_eq!(err.command_output(), Some("rejected"));
    }

    #[test]
    fn display_command_failed_missing_binary() {
        let err = BackupError::CommandFailed {
            program: "bw".to_string(),
            args: vec!["lock".to_string()],
            output: String::new(),
            cause: CommandFailure::Launch(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No such file or directory",
            )),
        };
        assert!(err.to_string().contains("binary not found"));
    }

    #[test]
    fn display_timeout() {
        let cause = CommandFailure::Timeout(Duration::from_secs(30));
        assert_eq!(cause.to_string(), "timed out after 30s");
    }

    #[test]
    fn non_command_errors_have_no_output() {
        assert!(BackupError::SessionNotFound.command_output().is_none());
    }

    #[test]
    fn io_errors_convert_with_question_mark() {
        fn install() -> BackupResult<()> {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "signal handler denied",
            ))?;
            Ok(())
        }

        let err = install().expect_err("should fail");
        assert_eq!(err.to_string(), "I/O error: signal handler denied");
        assert!(err.command_output().is_none());
    }
}
