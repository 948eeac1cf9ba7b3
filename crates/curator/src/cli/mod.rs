//! CLI module for Curator
//!
//! One module per command. Commands share the registry session and the
//! output helpers.

pub mod error;
pub mod output;

pub mod config;
pub mod export;
pub mod label;
pub mod resolve;
pub mod upload;

use curator::Session;
use curator_protocol::CuratorConfig;
use curator_worker::CancellationToken;

/// Open the registry snapshot named by `config`.
pub fn open_session(config: CuratorConfig, cancel: CancellationToken) -> anyhow::Result<Session> {
    let path = config.snapshot_path();
    Session::open(config, cancel).map_err(|err| error::HelpfulError::registry_unavailable(&path, &err).into())
}
