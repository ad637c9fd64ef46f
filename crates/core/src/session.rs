//! Session token extraction from `bw unlock` output.
//!
//! The unlock command prints shell instructions such as
//! `$ export BW_SESSION="<token>"`. The token is the only part we need.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{BackupError, BackupResult};

/// Marker line printed by the vault CLI after a successful unlock.
const SESSION_PATTERN: &str = r#"export BW_SESSION="([^"]+)""#;

static SESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(SESSION_PATTERN).expect("valid regex"));

/// Opaque vault session credential, valid for a single backup cycle.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Extract the session token from unlock output.
///
/// Returns the value of the first `export BW_SESSION="..."` marker, or
/// [`BackupError::SessionNotFound`] when there is none.
pub fn extract_session(output: &str) -> BackupResult<SessionToken> {
    SESSION_RE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| SessionToken(m.as_str().to_string()))
        .ok_or(BackupError::SessionNotFound)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
