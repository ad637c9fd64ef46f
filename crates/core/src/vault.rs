//! Vault CLI (`bw`) wrapper with explicit lock-state tracking.
//!
//! The CLI keeps its own notion of locked/unlocked in its data directory.
//! [`VaultClient`] mirrors that in-process: every login, unlock, lock and
//! logout updates [`VaultState`], and any failed transition makes the state
//! [`VaultState::Unknown`].

use std::path::Path;

use crate::command::{report_output, CommandOutput, CommandRunner, Invocation};
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};
use crate::session::SessionToken;

/// Environment variable the CLI reads the master password from.
pub const PASSWORD_ENV: &str = "BW_PASSWORD";
pub const CLIENT_ID_ENV: &str = "BW_CLIENTID";
pub const CLIENT_SECRET_ENV: &str = "BW_CLIENTSECRET";

/// Output fragment printed by `bw login` when a session already exists.
const ALREADY_LOGGED_IN: &str = "You are already logged in";

/// In-process view of the vault CLI's lock state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VaultState {
    /// Authenticated, no session open.
    Locked,
    /// A session token has been issued and not yet revoked.
    Unlocked,
    /// Startup, or the last transition failed.
    Unknown,
}

impl std::fmt::Display for VaultState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Locked => "locked",
            Self::Unlocked => "unlocked",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

pub struct VaultClient<R> {
    binary: String,
    runner: R,
    state: VaultState,
}

impl<R: CommandRunner> VaultClient<R> {
    pub fn new(binary: impl Into<String>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            runner,
            state: VaultState::Unknown,
        }
    }

    pub fn from_config(config: &BackupConfig, runner: R) -> Self {
        Self::new(config.vault_binary.clone(), runner)
    }

    pub fn state(&self) -> VaultState {
        self.state
    }

    /// Point the CLI at a self-hosted server. Does not touch lock state.
    pub async fn configure_server(&self, domain: &str) -> BackupResult<()> {
        let output = self
            .runner
            .run(&config_server_invocation(&self.binary, domain))
            .await?;
        report_output(&self.binary, &output);
        Ok(())
    }

    /// Authenticate with API-key credentials.
    ///
    /// An existing login is accepted as success so a restarted process does
    /// not trip over the session its predecessor left behind.
    pub async fn login(&mut self, client_id: &str, client_secret: &str) -> BackupResult<()> {
        let invocation = login_invocation(&self.binary, client_id, client_secret);
        match self.runner.run(&invocation).await {
            Ok(output) => {
                report_output(&self.binary, &output);
                self.state = VaultState::Locked;
                Ok(())
            }
            Err(err) if is_already_logged_in(&err) => {
                tracing::info!("Vault CLI already logged in, reusing existing login");
                self.state = VaultState::Locked;
                Ok(())
            }
            Err(err) => {
                self.state = VaultState::Unknown;
                Err(err)
            }
        }
    }

    /// Unlock the vault and return the raw CLI output, which carries the
    /// session marker.
    pub async fn unlock(&mut self, master_password: &str) -> BackupResult<CommandOutput> {
        let result = self
            .runner
            .run(&unlock_invocation(&self.binary, master_password))
            .await;
        self.state = match &result {
            Ok(_) => VaultState::Unlocked,
            Err(_) => VaultState::Unknown,
        };
        result
    }

    /// Write a zip export of the vault to `path`.
    pub async fn export(&self, path: &Path, session: &SessionToken) -> BackupResult<()> {
        let output = self
            .runner
            .run(&export_invocation(&self.binary, path, session))
            .await?;
        report_output(&self.binary, &output);
        Ok(())
    }

    pub async fn lock(&mut self) -> BackupResult<()> {
        let result = self
            .runner
            .run(&Invocation::new(&self.binary, ["lock"]))
            .await;
        self.transition(result, VaultState::Locked)
    }

    pub async fn logout(&mut self) -> BackupResult<()> {
        let result = self
            .runner
            .run(&Invocation::new(&self.binary, ["logout"]))
            .await;
        self.transition(result, VaultState::Locked)
    }

    fn transition(
        &mut self,
        result: BackupResult<CommandOutput>,
        on_success: VaultState,
    ) -> BackupResult<()> {
        match result {
            Ok(output) => {
                report_output(&self.binary, &output);
                self.state = on_success;
                Ok(())
            }
            Err(err) => {
                self.state = VaultState::Unknown;
                Err(err)
            }
        }
    }
}

fn is_already_logged_in(err: &BackupError) -> bool {
    err.command_output()
        .is_some_and(|output| output.contains(ALREADY_LOGGED_IN))
}

pub(crate) fn config_server_invocation(binary: &str, domain: &str) -> Invocation {
    Invocation::new(binary, ["config", "server", domain])
}

pub(crate) fn login_invocation(binary: &str, client_id: &str, client_secret: &str) -> Invocation {
    Invocation::new(binary, ["login", "--apikey"])
        .env(CLIENT_ID_ENV, client_id)
        .env(CLIENT_SECRET_ENV, client_secret)
}

pub(crate) fn unlock_invocation(binary: &str, master_password: &str) -> Invocation {
    Invocation::new(binary, ["unlock", "--passwordenv", PASSWORD_ENV])
        .env(PASSWORD_ENV, master_password)
}

pub(crate) fn export_invocation(binary: &str, path: &Path, session: &SessionToken) -> Invocation {
    Invocation::new(
        binary,
        [
            "export".to_string(),
            "--output".to_string(),
            path.to_string_lossy().into_owned(),
            "--format".to_string(),
            "zip".to_string(),
            "--session".to_string(),
        ],
    )
    .secret_arg(session.expose())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
