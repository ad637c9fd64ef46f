//! Git working-copy operations used by the backup job.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::command::{report_output, CommandRunner, Invocation};
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};

/// Fragments git prints when a commit has nothing staged.
const NOTHING_TO_COMMIT: [&str; 2] = ["nothing to commit", "no changes added to commit"];

/// Result of a commit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Committed,
    /// The working copy had no changes; no commit was created.
    NothingToCommit,
}

/// Commit message for a backup taken at `now`: `backup YYYYMMDDHHmm`.
pub fn commit_message<Tz>(now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("backup {}", now.format("%Y%m%d%H%M"))
}

/// A local clone driven through the git CLI (`git -C <dir> ...`).
pub struct GitRepo<R> {
    binary: String,
    dir: PathBuf,
    runner: R,
}

impl<R: CommandRunner> GitRepo<R> {
    pub fn new(binary: impl Into<String>, dir: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            dir: dir.into(),
            runner,
        }
    }

    pub fn from_config(config: &BackupConfig, runner: R) -> Self {
        Self::new(config.git_binary.clone(), config.working_copy.clone(), runner)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the working-copy directory is present on disk.
    pub fn exists(&self) -> bool {
        self.dir.exists()
    }

    pub async fn clone_from(&self, url: &str) -> BackupResult<()> {
        let invocation = Invocation::new(
            &self.binary,
            [
                "clone".to_string(),
                url.to_string(),
                self.dir.to_string_lossy().into_owned(),
            ],
        );
        self.run(invocation).await
    }

    pub async fn set_config(&self, key: &str, value: &str) -> BackupResult<()> {
        self.run(self.in_repo(["config", key, value])).await
    }

    /// Stage every change in the working copy.
    pub async fn add_all(&self) -> BackupResult<()> {
        self.run(self.in_repo(["add", "."])).await
    }

    /// Commit staged changes. A commit rejected only because nothing
    /// changed is reported as [`CommitStatus::NothingToCommit`].
    pub async fn commit(&self, message: &str) -> BackupResult<CommitStatus> {
        match self.runner.run(&self.in_repo(["commit", "-m", message])).await {
            Ok(output) => {
                report_output(&self.binary, &output);
                Ok(CommitStatus::Committed)
            }
            Err(err) if is_nothing_to_commit(&err) => Ok(CommitStatus::NothingToCommit),
            Err(err) => Err(err),
        }
    }

    pub async fn push(&self, branch: &str) -> BackupResult<()> {
        self.run(self.in_repo(["push", "origin", branch])).await
    }

    fn in_repo<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Invocation {
        let mut all = vec!["-C".to_string(), self.dir.to_string_lossy().into_owned()];
        all.extend(args.into_iter().map(str::to_string));
        Invocation::new(&self.binary, all)
    }

    async fn run(&self, invocation: Invocation) -> BackupResult<()> {
        let output = self.runner.run(&invocation).await?;
        report_output(&self.binary, &output);
        Ok(())
    }
}

fn is_nothing_to_commit(err: &BackupError) -> bool {
    err.command_output()
        .is_some_and(|output| NOTHING_TO_COMMIT.iter().any(|f| output.contains(f)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
