pub mod app;
pub mod operator;
pub mod shutdown;
