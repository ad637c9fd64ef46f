//! One-time startup preparation: working copy and vault login.

use vaultsync_core::command::CommandRunner;
use vaultsync_core::config::BackupConfig;
use vaultsync_core::error::BackupResult;
use vaultsync_core::git::GitRepo;
use vaultsync_core::vault::VaultClient;

/// Prepare the working copy and authenticate the vault CLI.
///
/// Steps, each fatal on failure:
/// 1. Clone the repository unless the working-copy directory exists. An
///    existing directory is trusted as-is; its remote is not checked.
/// 2. Set the commit identity on the working copy.
/// 3. Point the vault CLI at the alternate server, if one is configured.
/// 4. Log in with the API key.
pub async fn initialize<R: CommandRunner>(
    config: &BackupConfig,
    git: &GitRepo<R>,
    vault: &mut VaultClient<R>,
) -> BackupResult<()> {
    if git.exists() {
        tracing::info!(dir = %git.dir().display(), "Working copy present, skipping clone");
    } else {
        tracing::info!(
            url = %config.repository_url,
            dir = %git.dir().display(),
            "Cloning backup repository",
        );
        git.clone_from(&config.repository_url).await?;
    }

    git.set_config("user.name", &config.git_name).await?;
    git.set_config("user.email", &config.git_email).await?;

    if let Some(domain) = &config.vault_domain {
        tracing::info!(domain = %domain, "Configuring vault server");
        vault.configure_server(domain).await?;
    }

    tracing::info!("Logging in to vault");
    vault.login(&config.client_id, &config.client_secret).await?;
    tracing::info!(vault_state = %vault.state(), "Initialization complete");

    Ok(())
}
