pub mod app_config;
pub mod backend;
pub mod observability;
pub mod scheduler;
pub mod state_store;

pub use app_config::*;
pub use backend::*;
pub use observability::*;
pub use scheduler::*;
pub use state_store::*;
