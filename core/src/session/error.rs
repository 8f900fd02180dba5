//! Error types for session operations

use thiserror::Error;

use crate::query::QueryError;
use crate::source::LoadError;

/// Errors surfaced to the view layer. Each one is also recorded as the
/// session's latest error message.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to initialize query engine: {0}")]
    EngineInit(#[source] QueryError),

    #[error("failed to load dataset: {0}")]
    DatasetLoad(#[source] LoadError),

    #[error("dataset is missing required columns: {}", missing.join(", "))]
    SchemaMismatch { missing: Vec<String> },

    #[error("query failed: {0}")]
    Query(#[from] QueryError),

    #[error("data not loaded")]
    NotLoaded,

    #[error("{dimension} cannot be used as a filter")]
    NotAFilter { dimension: &'static str },

    #[error("unknown {dimension} value(s): {}", values.join(", "))]
    UnknownFilterValues {
        dimension: &'static str,
        values: Vec<String>,
    },
}

impl From<LoadError> for SessionError {
    fn from(err: LoadError) -> Self {
        SessionError::DatasetLoad(err)
    }
}
