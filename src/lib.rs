pub mod config;
pub mod enricher;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod notifier;
pub mod scheduler;
pub mod state;
pub mod sync;
