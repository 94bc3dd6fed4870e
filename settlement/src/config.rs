//! Configuration for the settlement scheduler

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Settlement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Ledger data directory (for the `settlementd` binary)
    pub ledger_data_dir: PathBuf,

    /// Seconds between scheduler ticks
    pub poll_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "settlement".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger_data_dir: PathBuf::from("./data/bank"),
            poll_interval_secs: 60,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(dir) = std::env::var("SETTLEMENT_LEDGER_DIR") {
            config.ledger_data_dir = PathBuf::from(dir);
        }

        if let Ok(interval) = std::env::var("SETTLEMENT_POLL_INTERVAL_SECS") {
            config.poll_interval_secs = interval.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid SETTLEMENT_POLL_INTERVAL_SECS: {}", e))
            })?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "settlement");
        assert_eq!(config.poll_interval_secs, 60);
    }
}
