//! Store manager that dispatches to the configured provider.

use std::sync::Arc;

use tracing::info;

#[cfg(feature = "redis-backend")]
use quirrel_core::config::store::RedisStoreConfig;
use quirrel_core::config::store::StoreConfig;
use quirrel_core::error::AppError;
use quirrel_core::result::AppResult;

use crate::traits::JobStore;

/// Selects and constructs the configured store provider.
#[derive(Debug, Clone, Copy)]
pub struct StoreManager;

impl StoreManager {
    /// Connect the provider named in the configuration.
    pub async fn connect(config: &StoreConfig) -> AppResult<Arc<dyn JobStore>> {
        let store: Arc<dyn JobStore> = match config.provider.as_str() {
            #[cfg(feature = "redis-backend")]
            "redis" => {
                info!("Initializing Redis store provider");
                Arc::new(Self::connect_redis(&config.redis).await?)
            }
            #[cfg(feature = "memory")]
            "memory" => {
                info!("Initializing in-memory store provider");
                Arc::new(crate::memory::MemoryJobStore::new())
            }
            other => {
                return Err(AppError::configuration(format!(
                    "Unknown store provider: '{other}'. Supported: memory, redis"
                )));
            }
        };

        Ok(store)
    }

    /// Connect a Redis store directly (also used for the legacy
    /// instance during a migration window).
    #[cfg(feature = "redis-backend")]
    pub async fn connect_redis(config: &RedisStoreConfig) -> AppResult<crate::redis::RedisJobStore> {
        let client = crate::redis::RedisStoreClient::connect(config).await?;
        Ok(crate::redis::RedisJobStore::new(client))
    }
}
