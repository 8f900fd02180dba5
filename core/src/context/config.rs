//! Application configuration
//!
//! Re-exports the shared config types from marketlens-types and adds
//! persistence on top via confy.

use std::path::Path;

pub use marketlens_types::{AppConfig, ColumnMapping, EngineSettings};

use super::error::ConfigError;

const APP_NAME: &str = "marketlens";
const CONFIG_NAME: &str = "config";

/// Extension trait for AppConfig persistence
pub trait AppConfigExt: Sized {
    /// Load the user config, falling back to defaults if it is missing or unreadable.
    fn load() -> Self;
    fn load_from(path: &Path) -> Result<Self, ConfigError>;
    fn save(&self) -> Result<(), ConfigError>;
    fn save_to(&self, path: &Path) -> Result<(), ConfigError>;
    fn validate(&self) -> Result<(), ConfigError>;
}

impl AppConfigExt for AppConfig {
    fn load() -> Self {
        let config = match confy::load::<AppConfig>(APP_NAME, CONFIG_NAME) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load config, using defaults");
                return AppConfig::default();
            }
        };
        if let Err(e) = config.validate() {
            tracing::warn!(error = %e, "invalid config, using defaults");
            return AppConfig::default();
        }
        config
    }

    fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config: AppConfig = confy::load_path(path)?;
        config.validate()?;
        Ok(config)
    }

    fn save(&self) -> Result<(), ConfigError> {
        confy::store(APP_NAME, CONFIG_NAME, self).map_err(ConfigError::Save)
    }

    fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        confy::store_path(path, self).map_err(ConfigError::Save)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.relation_name.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "relation_name",
                reason: "must not be empty".to_string(),
            });
        }
        if self.ranking_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "ranking_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        let required = self.columns.required();
        if let Some(blank) = required.iter().position(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid {
                field: "columns",
                reason: format!("required column #{} has an empty name", blank + 1),
            });
        }
        Ok(())
    }
}
