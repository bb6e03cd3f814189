// Path: crates/validator/src/config.rs
//! Configuration loading for the validator daemon.

use anyhow::Context;
use serde::Deserialize;
use sigil_types::config::ValidatorConfig;
use std::path::Path;

/// The daemon's full configuration file (`validator.toml`): the protocol
/// configuration plus the deployment-specific endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct DaemonConfig {
    /// The chain endpoint URL.
    pub rpc_url: String,
    /// Everything the core needs.
    #[serde(flatten)]
    pub validator: ValidatorConfig,
}

/// Loads and validates the daemon configuration from a TOML file.
pub fn load(path: &Path) -> anyhow::Result<DaemonConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    let config: DaemonConfig =
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;

    if config.validator.participants.is_empty() {
        anyhow::bail!("config must list at least one participant");
    }
    if config.validator.self_participant_id().is_none() {
        anyhow::bail!("self_address is not in the participant set");
    }
    if !config.validator.nonce_tree_size.is_power_of_two() {
        anyhow::bail!("nonce_tree_size must be a power of two");
    }
    if config.validator.blocks_per_epoch == 0 {
        anyhow::bail!("blocks_per_epoch must be positive");
    }
    Ok(config)
}
