//! Backup scheduler and process lifecycle.
//!
//! The scheduler runs one cycle immediately, then one per interval, until
//! the shutdown future resolves. Ticks and shutdown are handled one at a
//! time on a single task: a signal that arrives mid-cycle is seen once the
//! cycle has finished. On the way out the vault is logged out.

use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use vaultsync_core::command::CommandRunner;
use vaultsync_core::config::{BackupConfig, FailurePolicy};
use vaultsync_core::error::{BackupError, BackupResult};

use crate::pipeline::BackupPipeline;

pub struct Scheduler<R> {
    pipeline: BackupPipeline<R>,
    interval: Duration,
    failure_policy: FailurePolicy,
}

impl<R: CommandRunner> Scheduler<R> {
    pub fn new(pipeline: BackupPipeline<R>, config: &BackupConfig) -> Self {
        Self {
            pipeline,
            interval: config.interval,
            failure_policy: config.failure_policy,
        }
    }

    pub fn pipeline(&self) -> &BackupPipeline<R> {
        &self.pipeline
    }

    /// Drive backups until `shutdown` resolves, then log out of the vault.
    ///
    /// Returns the cycle error that stopped the loop when the failure policy
    /// is [`FailurePolicy::Exit`]; the vault is logged out first in that
    /// case too.
    pub async fn run<F>(&self, shutdown: F) -> BackupResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        // The first tick completes immediately, which is the cold-start run.
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            failure_policy = ?self.failure_policy,
            "Scheduler started",
        );

        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("Shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        self.shut_down().await;
                        return Err(e);
                    }
                }
            }
        }

        self.shut_down().await;
        Ok(())
    }

    /// Run one cycle and apply the failure policy to its result.
    ///
    /// `Err` means the scheduler must stop.
    async fn run_once(&self) -> BackupResult<()> {
        match self.pipeline.run_cycle().await {
            Ok(_) => Ok(()),
            Err(BackupError::CycleInProgress) => {
                tracing::warn!("Previous backup cycle still running, skipping tick");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    output = e.command_output().unwrap_or_default(),
                    "Backup cycle failed",
                );
                match self.failure_policy {
                    FailurePolicy::Exit => Err(e),
                    FailurePolicy::Continue => {
                        tracing::info!(
                            next_in_secs = self.interval.as_secs(),
                            "Continuing with next scheduled backup",
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    async fn shut_down(&self) {
        match self.pipeline.logout().await {
            Ok(()) => tracing::info!("Logged out of vault"),
            Err(e) => tracing::error!(
                error = %e,
                output = e.command_output().unwrap_or_default(),
                "Vault logout failed",
            ),
        }
    }
}

/// Resolve on SIGINT (Ctrl-C) or SIGTERM.
///
/// Listeners are installed when this is called, not when the returned
/// future is first polled, so a signal that arrives during startup or a
/// running cycle is not lost.
#[cfg(unix)]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {
                tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, starting graceful shutdown");
            }
        }
    })
}

#[cfg(not(unix))]
pub fn shutdown_signal() -> std::io::Result<impl Future<Output = ()>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
        tracing::info!("Received Ctrl-C, starting graceful shutdown");
    })
}
