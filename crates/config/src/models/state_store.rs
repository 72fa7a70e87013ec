use serde::{Deserialize, Serialize};

use crate::validation::{ConfigValidator, ValidationUtils};
use crate::{ConfigError, ConfigResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateStoreBackend {
    #[default]
    Redis,
    /// 进程内存储，仅适用于单进程部署和测试
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateStoreConfig {
    pub backend: StateStoreBackend,
    pub url: String,
    /// 所有键共享的命名空间前缀
    pub key_prefix: String,
    pub connection_timeout_seconds: u64,
}

impl Default for StateStoreConfig {
    fn default() -> Self {
        Self {
            backend: StateStoreBackend::Redis,
            url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "n8n_factory".to_string(),
            connection_timeout_seconds: 5,
        }
    }
}

impl ConfigValidator for StateStoreConfig {
    fn validate(&self) -> ConfigResult<()> {
        ValidationUtils::validate_not_empty(&self.key_prefix, "state_store.key_prefix")?;
        if self.backend == StateStoreBackend::Redis {
            ValidationUtils::validate_url(&self.url, "state_store.url")?;
            if !(self.url.starts_with("redis://") || self.url.starts_with("rediss://")) {
                return Err(ConfigError::Validation(format!(
                    "state_store.url must use redis:// or rediss://, got {}",
                    self.url
                )));
            }
        }
        ValidationUtils::validate_seconds(
            self.connection_timeout_seconds,
            "state_store.connection_timeout_seconds",
        )?;
        Ok(())
    }
}
