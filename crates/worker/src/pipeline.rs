//! One backup cycle: unlock, export, commit and push, lock.
//!
//! Every step before the lock is fatal to the cycle and stops it where it
//! failed. The lock is cleanup and only ever reported. Whether a failed
//! cycle stops the process is decided by the
//! [`Scheduler`](crate::scheduler::Scheduler), not here.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Local;
use tokio::sync::Mutex;

use vaultsync_core::command::CommandRunner;
use vaultsync_core::config::BackupConfig;
use vaultsync_core::error::{BackupError, BackupResult};
use vaultsync_core::git::{commit_message, CommitStatus, GitRepo};
use vaultsync_core::session::extract_session;
use vaultsync_core::vault::{VaultClient, VaultState};

/// What a successful cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A new commit was pushed.
    Committed,
    /// The export matched the previous one; no new commit was made.
    Unchanged,
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Committed => f.write_str("committed"),
            Self::Unchanged => f.write_str("unchanged"),
        }
    }
}

// ---------------------------------------------------------------------------
// CycleGuard
// ---------------------------------------------------------------------------

/// Single-flight flag: at most one cycle holds a [`CyclePermit`] at a time.
#[derive(Debug, Default)]
pub struct CycleGuard {
    busy: AtomicBool,
}

impl CycleGuard {
    pub fn try_acquire(&self) -> Option<CyclePermit<'_>> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CyclePermit { busy: &self.busy })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Releases the guard when dropped.
#[derive(Debug)]
pub struct CyclePermit<'a> {
    busy: &'a AtomicBool,
}

impl Drop for CyclePermit<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// BackupPipeline
// ---------------------------------------------------------------------------

pub struct BackupPipeline<R> {
    git: GitRepo<R>,
    vault: Mutex<VaultClient<R>>,
    master_password: String,
    export_path: PathBuf,
    branch: String,
    guard: CycleGuard,
}

impl<R: CommandRunner> BackupPipeline<R> {
    /// Build a pipeline from an initialized working copy and vault client.
    pub fn new(config: &BackupConfig, git: GitRepo<R>, vault: VaultClient<R>) -> Self {
        Self {
            git,
            vault: Mutex::new(vault),
            master_password: config.master_password.clone(),
            export_path: config.export_path(),
            branch: config.branch.clone(),
            guard: CycleGuard::default(),
        }
    }

    pub async fn vault_state(&self) -> VaultState {
        self.vault.lock().await.state()
    }

    /// Run one full backup cycle.
    ///
    /// Returns [`BackupError::CycleInProgress`] without touching the vault
    /// or the working copy if another cycle is still running.
    pub async fn run_cycle(&self) -> BackupResult<CycleOutcome> {
        let _permit = self
            .guard
            .try_acquire()
            .ok_or(BackupError::CycleInProgress)?;
        let mut vault = self.vault.lock().await;

        tracing::info!("Executing backup");

        let unlocked = vault.unlock(&self.master_password).await?;
        let session = extract_session(&unlocked.text)?;
        tracing::debug!(vault_state = %vault.state(), "Vault unlocked");

        vault.export(&self.export_path, &session).await?;
        tracing::info!(path = %self.export_path.display(), "Vault exported");

        let outcome = self.commit_and_push().await?;

        if let Err(e) = vault.lock().await {
            tracing::error!(
                error = %e,
                output = e.command_output().unwrap_or_default(),
                "Failed to lock vault after backup",
            );
        }

        tracing::info!(%outcome, vault_state = %vault.state(), "Backup cycle finished");
        Ok(outcome)
    }

    /// Log out of the vault. Used once, when the process shuts down.
    pub async fn logout(&self) -> BackupResult<()> {
        self.vault.lock().await.logout().await
    }

    async fn commit_and_push(&self) -> BackupResult<CycleOutcome> {
        self.git.add_all().await?;

        let message = commit_message(&Local::now());
        let outcome = match self.git.commit(&message).await? {
            CommitStatus::Committed => CycleOutcome::Committed,
            CommitStatus::NothingToCommit => {
                tracing::info!("Export unchanged since last backup");
                CycleOutcome::Unchanged
            }
        };

        // Always push: a commit left by an earlier failed push is still pending.
        self.git.push(&self.branch).await?;
        tracing::info!(%outcome, branch = %self.branch, "Backup pushed");
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
