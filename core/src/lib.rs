pub mod context;
pub mod query;
pub mod session;
pub mod source;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use context::{AppConfig, AppConfigExt, ConfigError};
pub use query::{DatasetInfo, QueryError, QueryGateway};
pub use session::{Dashboard, Overview, Session, SessionError};
pub use source::{LoadError, LoadSource};

pub use marketlens_types as types;
pub use marketlens_types::{
    Cell, Dimension, FilterOptions, FilterSelection, KpiSummary, RankingRow, Row, SessionPhase,
    SessionSnapshot, TrendPoint,
};
