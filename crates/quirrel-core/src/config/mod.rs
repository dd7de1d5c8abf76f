//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section.

pub mod logging;
pub mod producer;
pub mod realtime;
pub mod signing;
pub mod store;
pub mod worker;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::producer::ProducerConfig;
use self::realtime::RealtimeConfig;
use self::signing::SigningConfig;
use self::store::StoreConfig;
use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuirrelConfig {
    /// Backing store settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Producer API settings.
    #[serde(default)]
    pub producer: ProducerConfig,
    /// Delivery worker settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Payload signing settings.
    #[serde(default)]
    pub signing: SigningConfig,
    /// Activity stream settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl QuirrelConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `QUIRREL__`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("QUIRREL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}

impl Default for QuirrelConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            producer: ProducerConfig::default(),
            worker: WorkerConfig::default(),
            signing: SigningConfig::default(),
            realtime: RealtimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
