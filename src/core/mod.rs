pub mod config;
pub mod dispatcher;
pub mod error;
pub mod lifecycle;
pub mod publisher;
pub mod scheduler;
pub mod store;
pub mod vault;
