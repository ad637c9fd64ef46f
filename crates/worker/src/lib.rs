//! `vaultsync-worker` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod init;
pub mod pipeline;
pub mod scheduler;
