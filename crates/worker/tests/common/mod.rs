#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use vaultsync_core::command::{CommandOutput, CommandRunner, Invocation};
use vaultsync_core::config::BackupConfig;
use vaultsync_core::error::{BackupError, BackupResult, CommandFailure};
use vaultsync_core::git::GitRepo;
use vaultsync_core::vault::VaultClient;

/// Output `bw unlock` prints on success.
pub const UNLOCK_OUTPUT: &str = "Your vault is now unlocked!\n\
    $ export BW_SESSION=\"c2Vzc2lvbi10b2tlbg==\"\n\
    > $env:BW_SESSION=\"c2Vzc2lvbi10b2tlbg==\"\n";

pub const SESSION: &str = "c2Vzc2lvbi10b2tlbg==";

/// Scripted response for one command.
#[derive(Debug, Clone)]
pub enum Reply {
    Ok(String),
    Fail { output: String, code: i32 },
}

impl Reply {
    pub fn fail(output: &str) -> Self {
        Self::Fail {
            output: output.to_string(),
            code: 1,
        }
    }
}

/// [`CommandRunner`] that records every invocation and replays scripted
/// replies keyed by [`command_key`]. Unscripted commands succeed with no
/// output, except `bw unlock`, which prints a session marker.
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    replies: Mutex<HashMap<String, Reply>>,
    delay: Option<Duration>,
}

impl RecordingRunner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::build(None))
    }

    /// Every command sleeps for `delay` before replying.
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self::build(Some(delay)))
    }

    fn build(delay: Option<Duration>) -> Self {
        let replies = HashMap::from([(
            "bw unlock".to_string(),
            Reply::Ok(UNLOCK_OUTPUT.to_string()),
        )]);
        Self {
            calls: Mutex::new(Vec::new()),
            replies: Mutex::new(replies),
            delay,
        }
    }

    pub fn reply(&self, key: &str, reply: Reply) {
        self.replies
            .lock()
            .expect("replies lock")
            .insert(key.to_string(), reply);
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Recorded calls as `program subcommand` keys, in order.
    pub fn keys(&self) -> Vec<String> {
        self.calls().iter().map(command_key).collect()
    }

    pub fn count(&self, key: &str) -> usize {
        self.keys().iter().filter(|k| *k == key).count()
    }

    pub fn find(&self, key: &str) -> Option<Invocation> {
        self.calls().into_iter().find(|inv| command_key(inv) == key)
    }
}

impl CommandRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> BackupResult<CommandOutput> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(invocation.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .replies
            .lock()
            .expect("replies lock")
            .get(&command_key(invocation))
            .cloned()
            .unwrap_or(Reply::Ok(String::new()));

        match reply {
            Reply::Ok(text) => Ok(CommandOutput {
                text,
                duration_ms: 0,
            }),
            Reply::Fail { output, code } => Err(BackupError::CommandFailed {
                program: invocation.program.clone(),
                args: invocation.display_args(),
                output,
                cause: CommandFailure::Exit(Some(code)),
            }),
        }
    }
}

/// `program subcommand`, skipping git's `-C <dir>` prefix.
pub fn command_key(invocation: &Invocation) -> String {
    let mut args = invocation.args.iter().map(String::as_str);
    let first = args.next();
    let sub = if first == Some("-C") {
        args.nth(1)
    } else {
        first
    };
    format!("{} {}", invocation.program, sub.unwrap_or_default())
}

/// Configuration with every required value set and the working copy under
/// `dir`.
pub fn test_config(dir: &Path) -> BackupConfig {
    test_config_with(dir, &[])
}

pub fn test_config_with(dir: &Path, extra: &[(&str, &str)]) -> BackupConfig {
    let working_copy = dir.join("repo").to_string_lossy().into_owned();
    let mut vars: HashMap<String, String> = HashMap::from([
        (
            "GIT_REPOSITORY".to_string(),
            "https://git.example.com/me/vault-backup.git".to_string(),
        ),
        ("BW_CLIENTID".to_string(), "user.client-id".to_string()),
        ("BW_CLIENTSECRET".to_string(), "client-secret".to_string()),
        ("BW_PASSWORD".to_string(), "master-password".to_string()),
        ("BACKUP_DIR".to_string(), working_copy),
    ]);
    for (k, v) in extra {
        vars.insert(k.to_string(), v.to_string());
    }
    BackupConfig::from_lookup(|key| vars.get(key).cloned()).expect("valid test config")
}

pub fn clients(
    config: &BackupConfig,
    runner: &Arc<RecordingRunner>,
) -> (GitRepo<Arc<RecordingRunner>>, VaultClient<Arc<RecordingRunner>>) {
    (
        GitRepo::from_config(config, Arc::clone(runner)),
        VaultClient::from_config(config, Arc::clone(runner)),
    )
}
