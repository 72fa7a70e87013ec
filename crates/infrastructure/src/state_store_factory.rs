use scheduler_config::{StateStoreBackend, StateStoreConfig};
use scheduler_core::{SchedulerResult, StateStore};
use std::sync::Arc;
use tracing::{debug, info};

use crate::{InMemoryStateStore, RedisStateStore};

pub struct StateStoreFactory;

impl StateStoreFactory {
    pub async fn create(config: &StateStoreConfig) -> SchedulerResult<Arc<dyn StateStore>> {
        debug!("Creating state store with backend: {:?}", config.backend);

        match config.backend {
            StateStoreBackend::Redis => {
                info!("Initializing Redis state store");
                let store = RedisStateStore::new(config).await?;
                Ok(Arc::new(store))
            }
            StateStoreBackend::Memory => {
                info!("Initializing in-memory state store");
                Ok(Arc::new(InMemoryStateStore::new()))
            }
        }
    }
}
