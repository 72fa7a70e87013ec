pub mod cursor_file;
pub mod http_backend;
pub mod in_memory_store;
pub mod job_log;
pub mod observability;
pub mod process_launcher;
pub mod redis_store;
pub mod state_store_factory;

pub use cursor_file::LocalCursorFile;
pub use http_backend::HttpExecutionBackend;
pub use in_memory_store::InMemoryStateStore;
pub use job_log::FileJobLog;
pub use observability::{init_logging, init_metrics, SchedulerMetrics};
pub use process_launcher::ShellRefillLauncher;
pub use redis_store::RedisStateStore;
pub use state_store_factory::StateStoreFactory;
