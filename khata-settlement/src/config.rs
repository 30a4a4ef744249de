//! Configuration for the settlement engine

use serde::{Deserialize, Serialize};

/// Settlement engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Replay configuration
    pub replay: ReplayConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "khata-settlement".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            replay: ReplayConfig::default(),
        }
    }
}

/// Replay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Verify obligation and transaction conservation after every
    /// replay, failing the operation on a violation
    pub verify_conservation: bool,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            verify_conservation: true,
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

        if let Ok(name) = std::env::var("KHATA_SERVICE_NAME") {
            config.service_name = name;
        }

        if let Ok(verify) = std::env::var("KHATA_VERIFY_CONSERVATION") {
            config.replay.verify_conservation = verify == "1" || verify.eq_ignore_ascii_case("true");
        }

        Ok(config)
    }
}
