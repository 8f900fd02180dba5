mod config;
mod error;

pub use config::{AppConfig, AppConfigExt, ColumnMapping, EngineSettings};
pub use error::ConfigError;
