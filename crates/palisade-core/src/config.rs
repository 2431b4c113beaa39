//! Configuration for the security engine
//!
//! Configuration is read from TOML, then overridden by `PALISADE_*`
//! environment variables, then validated.

use crate::types::{ClaimCapabilities, ClaimCapabilityAdditionalInfo};
use crate::{PermissionError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix of environment variables that override configuration keys
pub const ENV_PREFIX: &str = "PALISADE_";

/// Core trait for Palisade configuration types
pub trait PalisadeConfig: Clone + Default + Send + Sync + 'static {
    /// Load configuration from a TOML file
    fn load_from_file(path: &Path) -> Result<Self>;

    /// Apply `PALISADE_*` overrides from the process environment
    fn merge_with_env(&mut self) -> Result<()> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply overrides from `(name, value)` pairs, ignoring unrelated names
    fn merge_with_vars<I>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            if let Some(key) = name.strip_prefix(ENV_PREFIX) {
                self.set_from_string(&key.to_lowercase(), &value)?;
            }
        }
        Ok(())
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()>;

    /// Set a configuration value from a string
    fn set_from_string(&mut self, key: &str, value: &str) -> Result<()>;
}

/// Security engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Timeout handed to the transport for each RPC, in milliseconds
    pub rpc_timeout_ms: u64,
    /// Reject certificates whose declared usage does not match the operation
    pub strict_certificate_usage: bool,
    /// Claim capabilities of a freshly created configurator
    pub default_claim_capabilities: u16,
    /// Claim capability additional info of a freshly created configurator
    pub default_claim_capability_info: u16,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            rpc_timeout_ms: 10_000,
            strict_certificate_usage: false,
            default_claim_capabilities: ClaimCapabilities::default().bits(),
            default_claim_capability_info: ClaimCapabilityAdditionalInfo::default().bits(),
        }
    }
}

impl SecurityConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| PermissionError::config(format!("Invalid TOML: {e}")))
    }

    /// Per-call RPC timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// Claim capabilities for a new configurator
    pub fn claim_capabilities(&self) -> ClaimCapabilities {
        ClaimCapabilities::from_bits(self.default_claim_capabilities)
    }

    /// Claim capability additional info for a new configurator
    pub fn claim_capability_info(&self) -> ClaimCapabilityAdditionalInfo {
        ClaimCapabilityAdditionalInfo::from_bits(self.default_claim_capability_info)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PermissionError::config(format!("Invalid value for {key}: '{value}'")))
}

impl PalisadeConfig for SecurityConfig {
    fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PermissionError::config(format!("Failed to read config file: {e}")))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "loaded security config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.rpc_timeout_ms == 0 {
            return Err(PermissionError::config("rpc_timeout_ms must be positive"));
        }
        if self.default_claim_capabilities == 0 {
            return Err(PermissionError::config(
                "default_claim_capabilities must enable at least one mechanism",
            ));
        }
        Ok(())
    }

    fn set_from_string(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "rpc_timeout_ms" => self.rpc_timeout_ms = parse_value(key, value)?,
            "strict_certificate_usage" => self.strict_certificate_usage = parse_value(key, value)?,
            "default_claim_capabilities" => {
                self.default_claim_capabilities = parse_value(key, value)?;
            }
            "default_claim_capability_info" => {
                self.default_claim_capability_info = parse_value(key, value)?;
            }
            _ => return Err(PermissionError::config(format!("Unknown config key: {key}"))),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = SecurityConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rpc_timeout(), Duration::from_secs(10));
        assert_eq!(config.claim_capabilities(), ClaimCapabilities::default());
    }

    #[test]
    fn test_load_from_file_fills_missing_keys() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "strict_certificate_usage = true").unwrap();
        let config = SecurityConfig::load_from_file(file.path()).unwrap();
        assert!(config.strict_certificate_usage);
        assert_eq!(config.rpc_timeout_ms, 10_000);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SecurityConfig::default();
        config
            .merge_with_vars(vec![
                ("PALISADE_RPC_TIMEOUT_MS".to_string(), "250".to_string()),
                ("HOME".to_string(), "/root".to_string()),
            ])
            .unwrap();
        assert_eq!(config.rpc_timeout_ms, 250);

        let err = config
            .merge_with_vars(vec![("PALISADE_COLOR".to_string(), "blue".to_string())])
            .unwrap_err();
        assert!(matches!(err, PermissionError::Config { .. }));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = SecurityConfig::from_toml_str("rpc_timeout_ms = 0").unwrap();
        assert!(config.validate().is_err());
        assert!(SecurityConfig::from_toml_str("rpc_timeout_ms = \"soon\"").is_err());
    }
}
