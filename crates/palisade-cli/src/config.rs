//! Configuration loading for the CLI

use anyhow::{Context, Result};
use palisade_core::{PalisadeConfig, SecurityConfig};
use std::path::Path;

/// Defaults, overlaid by `path` when given, then by `PALISADE_*` variables
pub fn load(path: Option<&Path>) -> Result<SecurityConfig> {
    let mut config = match path {
        Some(path) => SecurityConfig::load_from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => SecurityConfig::default(),
    };
    config.merge_with_env().context("applying environment overrides")?;
    config.validate().context("invalid configuration")?;
    tracing::debug!(?config, "configuration loaded");
    Ok(config)
}
