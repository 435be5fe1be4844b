use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::crypto::Network;

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// "mainnet" or "testnet"
    pub name: String,
}

impl NetworkConfig {
    pub fn network(&self) -> Result<Network, ConfigError> {
        self.name
            .parse()
            .map_err(|e: crate::error::AppError| ConfigError::Message(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    /// Fee rate used when building change outputs
    pub fee_per_kb: u64,
    /// Minimum fee rate accepted before a transaction is handed off for broadcast
    pub min_sat_per_byte: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LowSConfig {
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    pub dir: String,
    /// Default filter directive, overridden by RUST_LOG
    pub filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub fee: FeeConfig,
    pub lows: LowSConfig,
    pub log: LogConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            .set_default("network.name", "testnet")?
            // Fee defaults
            .set_default("fee.fee_per_kb", 500)?
            .set_default("fee.min_sat_per_byte", 0.5)?
            // Low-S normalization
            .set_default("lows.max_attempts", 25)?
            // Logging
            .set_default("log.dir", "logs")?
            .set_default("log.filter", "info")?
            // Load from config.toml if exists
            .add_source(File::with_name("config").required(false))
            // Override with environment variables (prefix: BSV_)
            // Use __ as separator so BSV_LOWS__MAX_ATTEMPTS -> lows.max_attempts
            .add_source(
                Environment::with_prefix("BSV")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app_config: AppConfig = config.try_deserialize()?;

        app_config.validate()?;

        Ok(app_config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.network.network()?;

        if self.lows.max_attempts == 0 {
            return Err(ConfigError::Message(
                "lows.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.fee.min_sat_per_byte.is_nan() || self.fee.min_sat_per_byte < 0.0 {
            return Err(ConfigError::Message(
                "fee.min_sat_per_byte cannot be negative".to_string(),
            ));
        }

        if self.log.dir.is_empty() {
            return Err(ConfigError::Message(
                "Log directory cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig {
                name: "testnet".to_string(),
            },
            fee: FeeConfig {
                fee_per_kb: 500,
                min_sat_per_byte: 0.5,
            },
            lows: LowSConfig { max_attempts: 25 },
            log: LogConfig {
                dir: "logs".to_string(),
                filter: "info".to_string(),
            },
        }
    }
}
