use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{BackupError, BackupResult};

/// Default interval between backup cycles: 12 hours.
pub const DEFAULT_INTERVAL_SECS: u64 = 43_200;

/// Default working-copy location, relative to the process working directory.
pub const DEFAULT_WORKING_COPY: &str = "./repo";

/// File name of the vault export inside the working copy.
pub const EXPORT_FILE_NAME: &str = "export.zip";

pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_GIT_NAME: &str = "vaultsync";
pub const DEFAULT_GIT_EMAIL: &str = "vaultsync@localhost";

/// What the scheduler does after a backup cycle fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log out of the vault and stop; a process supervisor restarts us.
    #[default]
    Exit,
    /// Log the failure and wait for the next tick.
    Continue,
}

impl std::str::FromStr for FailurePolicy {
    type Err = BackupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exit" => Ok(Self::Exit),
            "continue" => Ok(Self::Continue),
            _ => Err(BackupError::InvalidFailurePolicy(s.to_string())),
        }
    }
}

/// Backup configuration loaded once at startup.
///
/// Required values must be present and non-empty; everything else falls
/// back to a default. Empty optional values are treated as unset.
#[derive(Clone)]
pub struct BackupConfig {
    /// Remote repository URL (`GIT_REPOSITORY`).
    pub repository_url: String,
    /// Vault API client id (`BW_CLIENTID`).
    pub client_id: String,
    /// Vault API client secret (`BW_CLIENTSECRET`).
    pub client_secret: String,
    /// Vault master password (`BW_PASSWORD`).
    pub master_password: String,
    /// Alternate vault server (`VAULT_DOMAIN`).
    pub vault_domain: Option<String>,
    /// Commit author name (`GIT_NAME`).
    pub git_name: String,
    /// Commit author email (`GIT_EMAIL`).
    pub git_email: String,
    /// Time between cycles (`INTERVALL`, seconds).
    pub interval: Duration,
    /// Local clone of the repository (`BACKUP_DIR`).
    pub working_copy: PathBuf,
    /// Branch pushed after each commit (`GIT_BRANCH`).
    pub branch: String,
    /// Vault CLI program (`BW_BINARY`).
    pub vault_binary: String,
    /// Git program (`GIT_BINARY`).
    pub git_binary: String,
    /// Behaviour after a failed cycle (`BACKUP_ON_FAILURE`).
    pub failure_policy: FailurePolicy,
    /// Upper bound for any single external command (`COMMAND_TIMEOUT_SECS`).
    pub command_timeout: Option<Duration>,
}

impl BackupConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                | Default                 |
    /// |------------------------|-------------------------|
    /// | `GIT_REPOSITORY`       | required                |
    /// | `BW_CLIENTID`          | required                |
    /// | `BW_CLIENTSECRET`      | required                |
    /// | `BW_PASSWORD`          | required                |
    /// | `INTERVALL`            | `43200`                 |
    /// | `VAULT_DOMAIN`         | unset                   |
    /// | `GIT_NAME`             | `vaultsync`             |
    /// | `GIT_EMAIL`            | `vaultsync@localhost`   |
    /// | `BACKUP_DIR`           | `./repo`                |
    /// | `GIT_BRANCH`           | `main`                  |
    /// | `BW_BINARY`            | `bw`                    |
    /// | `GIT_BINARY`           | `git`                   |
    /// | `BACKUP_ON_FAILURE`    | `exit`                  |
    /// | `COMMAND_TIMEOUT_SECS` | unset (no timeout)      |
    pub fn from_env() -> BackupResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> BackupResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| {
            optional(key).ok_or(BackupError::ConfigMissing { var: key })
        };

        let repository_url = required("GIT_REPOSITORY")?;
        let client_id = required("BW_CLIENTID")?;
        let client_secret = required("BW_CLIENTSECRET")?;
        let master_password = required("BW_PASSWORD")?;

        let interval = match optional("INTERVALL") {
            Some(raw) => parse_interval(&raw)?,
            None => Duration::from_secs(DEFAULT_INTERVAL_SECS),
        };

        let failure_policy = match optional("BACKUP_ON_FAILURE") {
            Some(raw) => raw.parse()?,
            None => FailurePolicy::default(),
        };

        let command_timeout = optional("COMMAND_TIMEOUT_SECS")
            .map(|raw| parse_timeout(&raw))
            .transpose()?;

        Ok(Self {
            repository_url,
            client_id,
            client_secret,
            master_password,
            vault_domain: optional("VAULT_DOMAIN"),
            git_name: optional("GIT_NAME").unwrap_or_else(|| DEFAULT_GIT_NAME.into()),
            git_email: optional("GIT_EMAIL").unwrap_or_else(|| DEFAULT_GIT_EMAIL.into()),
            interval,
            working_copy: optional("BACKUP_DIR")
                .unwrap_or_else(|| DEFAULT_WORKING_COPY.into())
                .into(),
            branch: optional("GIT_BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.into()),
            vault_binary: optional("BW_BINARY").unwrap_or_else(|| "bw".into()),
            git_binary: optional("GIT_BINARY").unwrap_or_else(|| "git".into()),
            failure_policy,
            command_timeout,
        })
    }

    /// Path the vault export is written to.
    pub fn export_path(&self) -> PathBuf {
        self.working_copy.join(EXPORT_FILE_NAME)
    }
}

impl fmt::Debug for BackupConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupConfig")
            .field("repository_url", &self.repository_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("master_password", &"<redacted>")
            .field("vault_domain", &self.vault_domain)
            .field("git_name", &self.git_name)
            .field("git_email", &self.git_email)
            .field("interval", &self.interval)
            .field("working_copy", &self.working_copy)
            .field("branch", &self.branch)
            .field("vault_binary", &self.vault_binary)
            .field("git_binary", &self.git_binary)
            .field("failure_policy", &self.failure_policy)
            .field("command_timeout", &self.command_timeout)
            .finish()
    }
}

fn parse_interval(raw: &str) -> BackupResult<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| BackupError::InvalidInterval {
            value: raw.to_string(),
            reason: e.to_string(),
        })?;
    // A zero period would make the timer spin.
    if secs == 0 {
        return Err(BackupError::InvalidInterval {
            value: raw.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

fn parse_timeout(raw: &str) -> BackupResult<Duration> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(BackupError::InvalidTimeout {
            value: raw.to_string(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn required_vars() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("GIT_REPOSITORY", "git@example.com:me/vault-backup.git"),
            ("BW_CLIENTID", "user.client"),
            ("BW_CLIENTSECRET", "s3cret"),
            ("BW_PASSWORD", "hunter2"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> BackupResult<BackupConfig> {
        BackupConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_required_values_are_set() {
        let config = load(&required_vars()).expect("config");
        assert_eq!(config.interval, Duration::from_secs(43_200));
        assert_eq!(config.vault_domain, None);
        assert_eq!(config.git_name, DEFAULT_GIT_NAME);
        assert_eq!(config.git_email, DEFAULT_GIT_EMAIL);
        assert_eq!(config.working_copy, PathBuf::from("./repo"));
        assert_eq!(config.export_path(), PathBuf::from("./repo/export.zip"));
        assert_eq!(config.branch, "main");
        assert_eq!(config.vault_binary, "bw");
        assert_eq!(config.git_binary, "git");
        assert_eq!(config.failure_policy, FailurePolicy::Exit);
        assert_eq!(config.command_timeout, None);
    }

    #[test]
    fn each_required_value_is_enforced() {
        for key in ["GIT_REPOSITORY", "BW_CLIENTID", "BW_CLIENTSECRET", "BW_PASSWORD"] {
            let mut vars = required_vars();
            vars.remove(key);
            assert_matches!(load(&vars), Err(BackupError::ConfigMissing { var }) if var == key);

            let mut vars = required_vars();
            vars.insert(key, "");
            assert_matches!(load(&vars), Err(BackupError::ConfigMissing { var }) if var == key);
        }
    }

    #[test]
    fn optional_values_override_defaults() {
        let mut vars = required_vars();
        vars.insert("INTERVALL", "600");
        vars.insert("VAULT_DOMAIN", "https://vault.example.com");
        vars.insert("GIT_NAME", "Backup Bot");
        vars.insert("GIT_EMAIL", "bot@example.com");
        vars.insert("BACKUP_DIR", "/data/backup");
        vars.insert("GIT_BRANCH", "backups");
        vars.insert("BACKUP_ON_FAILURE", "Continue");
        vars.insert("COMMAND_TIMEOUT_SECS", "120");

        let config = load(&vars).expect("config");
        assert_eq!(config.interval, Duration::from_secs(600));
        assert_eq!(
            config.vault_domain.as_deref(),
            Some("https://vault.example.com")
        );
        assert_eq!(config.git_name, "Backup Bot");
        assert_eq!(config.git_email, "bot@example.com");
        assert_eq!(config.export_path(), PathBuf::from("/data/backup/export.zip"));
        assert_eq!(config.branch, "backups");
        assert_eq!(config.failure_policy, FailurePolicy::Continue);
        assert_eq!(config.command_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn empty_optional_values_are_ignored() {
        let mut vars = required_vars();
        vars.insert("VAULT_DOMAIN", "");
        vars.insert("INTERVALL", "  ");
        let config = load(&vars).expect("config");
        assert_eq!(config.vault_domain, None);
        assert_eq!(config.interval, Duration::from_secs(DEFAULT_INTERVAL_SECS));
    }

    #[test]
    fn non_numeric_interval_is_rejected() {
        let mut vars = required_vars();
        vars.insert("INTERVALL", "twelve hours");
        assert_matches!(load(&vars), Err(BackupError::InvalidInterval { value, .. }) if value == "twelve hours");
    }

    #[test]
    fn zero_interval_is_rejected() {
        let mut vars = required_vars();
        vars.insert("INTERVALL", "0");
        assert_matches!(load(&vars), Err(BackupError::InvalidInterval { .. }));
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let mut vars = required_vars();
        vars.insert("BACKUP_ON_FAILURE", "retry");
        assert_matches!(load(&vars), Err(BackupError::InvalidFailurePolicy(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let mut vars = required_vars();
        vars.insert("COMMAND_TIMEOUT_SECS", "0");
        assert_matches!(load(&vars), Err(BackupError::InvalidTimeout { .. }));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let config = load(&required_vars()).expect("config");
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("user.client"));
    }
}
