use tracing_subscriber::EnvFilter;

use crate::config::DeployerConfig;
use crate::error::{DeployerError, Result};

/// Initializes the process-wide `tracing` subscriber once, respecting
/// `--verbose` and `RUST_LOG`. Every deployment stage opens an `info_span!`
/// on top of this (see `scheduler::deploy_environment`), annotated with
/// coordinate, type, environment, and group.
pub fn init(config: &DeployerConfig) -> Result<()> {
    let default_directive = if config.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|err| DeployerError::Other(format!("failed to install tracing subscriber: {err}")))
}
