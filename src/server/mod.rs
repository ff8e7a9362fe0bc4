pub mod config;
pub mod monitor_service;

pub use config::{ConfigError, ServerConfig};
pub use monitor_service::MonitorService;
