//! Building blocks for the vault-to-git backup job: configuration, the
//! error taxonomy, external command execution and the `bw` / `git`
//! wrappers the worker drives.

pub mod command;
pub mod config;
pub mod error;
pub mod git;
pub mod session;
pub mod vault;
