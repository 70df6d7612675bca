pub mod config;
pub mod event;
pub mod health;
pub mod metrics;
pub mod mock;
pub mod queue;
pub mod store;
