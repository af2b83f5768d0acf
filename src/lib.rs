pub mod api;
pub mod config;
pub mod engine;
pub mod exporters;
pub mod metrics;
pub mod monitors;
pub mod storage;
pub mod types;

pub use config::Config;
pub use types::*;
