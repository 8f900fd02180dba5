//! Error types for the query gateway

use thiserror::Error;

use marketlens_types::Dimension;

/// Errors raised by the embedded engine or while decoding its results
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query engine could not be provisioned: {reason}")]
    EngineInit { reason: String },

    #[error("query engine runtime could not be built: {0}")]
    Runtime(#[source] datafusion::error::DataFusionError),

    #[error("query engine is not initialized")]
    NotInitialized,

    #[error("no dataset has been loaded")]
    NoDataset,

    #[error("{name} is not a readable parquet file: {source}")]
    DecodeParquet {
        name: String,
        #[source]
        source: parquet::errors::ParquetError,
    },

    #[error("{name} contains no {what}")]
    EmptyDataset { name: String, what: &'static str },

    #[error("failed to register relation {relation}: {source}")]
    RegisterTable {
        relation: String,
        #[source]
        source: datafusion::error::DataFusionError,
    },

    #[error("SQL execution failed: {source}")]
    SqlExecution {
        query: String,
        #[source]
        source: datafusion::error::DataFusionError,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("column {name} not found in result")]
    ColumnNotFound { name: String },

    #[error("unexpected column type for {name}: expected {expected}, got {actual}")]
    UnexpectedColumnType {
        name: String,
        expected: &'static str,
        actual: String,
    },

    #[error("no column is mapped for {0:?}")]
    UnmappedDimension(Dimension),
}
