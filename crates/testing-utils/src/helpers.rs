//! Test helper utilities

use scheduler_core::StateStore;
use scheduler_infrastructure::InMemoryStateStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Fresh in-memory store behind the trait object the components expect
pub fn memory_store() -> Arc<dyn StateStore> {
    Arc::new(InMemoryStateStore::new())
}

/// Test environment setup utilities
pub struct TestEnv;

impl TestEnv {
    /// Wait for a condition to be true with timeout
    pub async fn wait_for<F, Fut>(mut condition: F, timeout: Duration) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < timeout {
            if condition().await {
                return true;
            }
            sleep(Duration::from_millis(20)).await;
        }

        false
    }
}
