//! `vaultsync-worker` -- scheduled vault-to-git backup daemon.
//!
//! Exports the vault through the `bw` CLI on a fixed interval and commits
//! the export to a git repository. Runs until SIGINT or SIGTERM, then logs
//! out of the vault.
//!
//! # Environment variables
//!
//! | Variable               | Required | Default               | Description                        |
//! |------------------------|----------|-----------------------|------------------------------------|
//! | `GIT_REPOSITORY`       | yes      | --                    | Backup repository URL              |
//! | `BW_CLIENTID`          | yes      | --                    | Vault API client id                |
//! | `BW_CLIENTSECRET`      | yes      | --                    | Vault API client secret            |
//! | `BW_PASSWORD`          | yes      | --                    | Vault master password              |
//! | `INTERVALL`            | no       | `43200`               | Seconds between backups            |
//! | `VAULT_DOMAIN`         | no       | --                    | Self-hosted vault server           |
//! | `GIT_NAME`             | no       | `vaultsync`           | Commit author name                 |
//! | `GIT_EMAIL`            | no       | `vaultsync@localhost` | Commit author email                |
//! | `BACKUP_DIR`           | no       | `./repo`              | Working-copy directory             |
//! | `GIT_BRANCH`           | no       | `main`                | Branch to push                     |
//! | `BW_BINARY`            | no       | `bw`                  | Vault CLI program                  |
//! | `GIT_BINARY`           | no       | `git`                 | Git program                        |
//! | `BACKUP_ON_FAILURE`    | no       | `exit`                | `exit` or `continue`               |
//! | `COMMAND_TIMEOUT_SECS` | no       | --                    | Kill commands running longer       |

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vaultsync_core::command::subprocess::SystemCommandRunner;
use vaultsync_core::config::BackupConfig;
use vaultsync_core::error::BackupResult;
use vaultsync_core::git::GitRepo;
use vaultsync_core::vault::VaultClient;
use vaultsync_worker::init;
use vaultsync_worker::pipeline::BackupPipeline;
use vaultsync_worker::scheduler::{self, Scheduler};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vaultsync_worker=info,vaultsync_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = BackupConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        std::process::exit(1);
    });

    if let Err(e) = run(config).await {
        tracing::error!(
            error = %e,
            output = e.command_output().unwrap_or_default(),
            "vaultsync-worker stopped",
        );
        std::process::exit(1);
    }
}

async fn run(config: BackupConfig) -> BackupResult<()> {
    tracing::info!(
        repository = %config.repository_url,
        working_copy = %config.working_copy.display(),
        interval_secs = config.interval.as_secs(),
        "Starting vaultsync-worker",
    );

    // Installed before any command runs so an early SIGTERM still takes
    // the clean shutdown path.
    let shutdown = scheduler::shutdown_signal()?;

    let runner = SystemCommandRunner::with_timeout(config.command_timeout);
    let git = GitRepo::from_config(&config, runner.clone());
    let mut vault = VaultClient::from_config(&config, runner);

    init::initialize(&config, &git, &mut vault).await?;

    let pipeline = BackupPipeline::new(&config, git, vault);
    Scheduler::new(pipeline, &config).run(shutdown).await
}
