pub mod execution_backend;
pub mod job_log;
pub mod launcher;
pub mod state_store;

pub use execution_backend::*;
pub use job_log::*;
pub use launcher::*;
pub use state_store::*;
