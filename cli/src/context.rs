use std::sync::Arc;

use marketlens_core::context::{AppConfig, AppConfigExt};
use marketlens_core::{Dashboard, FilterSelection, Session};
use tokio::sync::RwLock;

/// Holds all shared state for the CLI application.
/// This is a lightweight container - logic lives in the session and dashboard.
#[derive(Clone)]
pub struct CliContext {
    pub config: Arc<RwLock<AppConfig>>,
    pub session: Arc<Session>,
    pub dashboard: Arc<Dashboard>,
    /// Filter applied to every dashboard command
    pub filter: Arc<RwLock<FilterSelection>>,
}

impl CliContext {
    pub fn new() -> Self {
        Self::with_config(AppConfig::load())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            session: Arc::new(Session::from_config(&config)),
            dashboard: Arc::new(Dashboard::new(config.ranking_limit)),
            config: Arc::new(RwLock::new(config)),
            filter: Arc::new(RwLock::new(FilterSelection::default())),
        }
    }

    pub async fn filter(&self) -> FilterSelection {
        self.filter.read().await.clone()
    }
}

impl Default for CliContext {
    fn default() -> Self {
        Self::new()
    }
}
