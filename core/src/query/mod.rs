//! Query gateway over the embedded DataFusion engine.
//!
//! Owns the engine lifecycle (initialize / load / shutdown) and the single
//! named relation the dashboard queries run against:
//! - Parquet bytes are decoded in memory and registered as a `MemTable`
//! - Every load replaces the relation inside a fresh `SessionContext`
//! - Typed dashboard queries live in the sibling modules

mod breakdown;
pub mod builder;
mod column_helpers;
mod error;
pub mod filters;
mod overview;
mod time_series;


use std::sync::Arc;

use bytes::Bytes;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::common::TableReference;
use datafusion::datasource::MemTable;
use datafusion::execution::runtime_env::{RuntimeEnv, RuntimeEnvBuilder};
use datafusion::prelude::*;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

use column_helpers::*;
use filters::Predicate;

pub use builder::{Projection, SelectQuery, SortOrder};
pub use error::QueryError;
pub use filters::{build_predicate, quote_literal, where_clause};

pub use marketlens_types::{
    Cell, ColumnMapping, Dimension, EngineSettings, FilterSelection, KpiSummary, Measure,
    RankingRow, Row, TrendPoint,
};

/// Metadata of the relation produced by a successful load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetInfo {
    /// Source name the bytes were registered under (file name or URL tail)
    pub source: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

// ─────────────────────────────────────────────────────────────────────────────
// Query Gateway
// ─────────────────────────────────────────────────────────────────────────────

/// Provisioned engine: runtime plus the context holding the relation.
struct Engine {
    runtime: Arc<RuntimeEnv>,
    ctx: SessionContext,
}

/// Internal state protected by the lock
struct GatewayState {
    engine: Option<Engine>,
    dataset: Option<DatasetInfo>,
}

/// Single point of access to the embedded analytical engine.
///
/// Owned by one session; nothing is global, so independent gateways can run
/// side by side (one per test, for instance).
pub struct QueryGateway {
    settings: EngineSettings,
    relation: String,
    /// Loads take the write lock, queries share the read lock
    state: tokio::sync::RwLock<GatewayState>,
}

fn build_runtime(settings: &EngineSettings) -> Result<Arc<RuntimeEnv>, QueryError> {
    let mut builder = RuntimeEnvBuilder::new();
    if let Some(mb) = settings.memory_limit_mb {
        if mb == 0 {
            return Err(QueryError::EngineInit {
                reason: "memory limit must be greater than zero".to_string(),
            });
        }
        builder = builder.with_memory_limit(mb * 1024 * 1024, 1.0);
    }
    builder.build_arc().map_err(QueryError::Runtime)
}

/// Create a fresh SessionContext with our tuned config
fn create_session_context(settings: &EngineSettings, runtime: Arc<RuntimeEnv>) -> SessionContext {
    let config = SessionConfig::new()
        .with_target_partitions(settings.target_partitions)
        .with_batch_size(settings.batch_size);
    SessionContext::new_with_config_rt(config, runtime)
}

impl QueryGateway {
    pub fn new(settings: EngineSettings, relation: impl Into<String>) -> Self {
        Self {
            settings,
            relation: relation.into(),
            state: tokio::sync::RwLock::new(GatewayState {
                engine: None,
                dataset: None,
            }),
        }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub async fn is_initialized(&self) -> bool {
        self.state.read().await.engine.is_some()
    }

    /// Provision the engine. Returns `Ok(false)` when it was already running.
    pub async fn initialize(&self) -> Result<bool, QueryError> {
        let mut state = self.state.write().await;
        if state.engine.is_some() {
            tracing::debug!("query engine already initialized");
            return Ok(false);
        }

        if self.settings.target_partitions == 0 || self.settings.batch_size == 0 {
            return Err(QueryError::EngineInit {
                reason: format!(
                    "target_partitions ({}) and batch_size ({}) must be non-zero",
                    self.settings.target_partitions, self.settings.batch_size
                ),
            });
        }
        if self.relation.is_empty() {
            return Err(QueryError::EngineInit {
                reason: "relation name is empty".to_string(),
            });
        }

        let runtime = build_runtime(&self.settings)?;
        let ctx = create_session_context(&self.settings, Arc::clone(&runtime));
        state.engine = Some(Engine { runtime, ctx });
        tracing::info!(
            target_partitions = self.settings.target_partitions,
            batch_size = self.settings.batch_size,
            memory_limit_mb = ?self.settings.memory_limit_mb,
            "query engine initialized"
        );
        Ok(true)
    }

    /// Decode parquet bytes and make them the one relation, replacing any
    /// previous dataset. The previous relation is gone even if decoding fails.
    pub async fn load_dataset(
        &self,
        bytes: Bytes,
        source: &str,
    ) -> Result<DatasetInfo, QueryError> {
        let mut state = self.state.write().await;
        let state = &mut *state;
        let engine = state.engine.as_mut().ok_or(QueryError::NotInitialized)?;

        // A FRESH SessionContext drops the old table along with cached plans
        engine.ctx = create_session_context(&self.settings, Arc::clone(&engine.runtime));
        state.dataset = None;

        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).map_err(|source_err| {
            QueryError::DecodeParquet {
                name: source.to_string(),
                source: source_err,
            }
        })?;
        let schema = Arc::clone(builder.schema());
        let reader = builder
            .with_batch_size(self.settings.batch_size)
            .build()
            .map_err(|source_err| QueryError::DecodeParquet {
                name: source.to_string(),
                source: source_err,
            })?;
        let batches = reader.collect::<Result<Vec<RecordBatch>, _>>()?;

        if schema.fields().is_empty() {
            return Err(QueryError::EmptyDataset {
                name: source.to_string(),
                what: "columns",
            });
        }
        let row_count: usize = batches.iter().map(RecordBatch::num_rows).sum();
        if row_count == 0 {
            return Err(QueryError::EmptyDataset {
                name: source.to_string(),
                what: "rows",
            });
        }

        let table = MemTable::try_new(Arc::clone(&schema), vec![batches]).map_err(|e| {
            QueryError::RegisterTable {
                relation: self.relation.clone(),
                source: e,
            }
        })?;
        engine
            .ctx
            .register_table(TableReference::bare(self.relation.as_str()), Arc::new(table))
            .map_err(|e| QueryError::RegisterTable {
                relation: self.relation.clone(),
                source: e,
            })?;

        let info = DatasetInfo {
            source: source.to_string(),
            columns: schema.fields().iter().map(|f| f.name().clone()).collect(),
            row_count,
        };
        tracing::info!(
            source,
            relation = %self.relation,
            rows = row_count,
            columns = info.columns.len(),
            "dataset loaded"
        );
        state.dataset = Some(info.clone());
        Ok(info)
    }

    /// Currently loaded dataset, if any
    pub async fn dataset(&self) -> Option<DatasetInfo> {
        self.state.read().await.dataset.clone()
    }

    /// Acquire a read guard for running queries against the current relation.
    pub async fn query(&self) -> Result<GatewayGuard<'_>, QueryError> {
        let guard = self.state.read().await;
        if guard.engine.is_none() {
            return Err(QueryError::NotInitialized);
        }
        Ok(GatewayGuard {
            guard,
            relation: &self.relation,
        })
    }

    /// Execute arbitrary SQL and return untyped rows.
    pub async fn run_query(&self, sql: &str) -> Result<Vec<Row>, QueryError> {
        let guard = self.query().await?;
        let batches = guard.sql(sql).await?;
        batches_to_rows(&batches)
    }

    /// Sorted non-null distinct values of one column, as strings.
    pub async fn list_distinct(&self, column: &str) -> Result<Vec<String>, QueryError> {
        let guard = self.query().await?;
        let sql = SelectQuery::from(&self.relation)
            .project(Projection::Column {
                column: column.to_string(),
                alias: "value",
            })
            .filter([Predicate::not_null(column)])
            .group_by(column)
            .order_by("value", SortOrder::Asc)
            .to_sql();
        let batches = guard.sql(&sql).await?;

        let mut values = Vec::new();
        for batch in &batches {
            values.extend(col_strings(batch, 0)?);
        }
        Ok(values)
    }

    /// Release the engine. Safe to call repeatedly or before `initialize`.
    pub async fn shutdown(&self) -> bool {
        let mut state = self.state.write().await;
        state.dataset = None;
        match state.engine.take() {
            Some(_) => {
                tracing::info!("query engine shut down");
                true
            }
            None => false,
        }
    }
}

/// RAII guard that holds a read lock on the gateway
pub struct GatewayGuard<'a> {
    guard: tokio::sync::RwLockReadGuard<'a, GatewayState>,
    relation: &'a str,
}

impl GatewayGuard<'_> {
    fn ctx(&self) -> Result<&SessionContext, QueryError> {
        self.guard
            .engine
            .as_ref()
            .map(|e| &e.ctx)
            .ok_or(QueryError::NotInitialized)
    }

    async fn sql(&self, query: &str) -> Result<Vec<RecordBatch>, QueryError> {
        execute(self.ctx()?, query).await
    }

    /// Typed dashboard queries using the given column contract
    pub fn market<'g>(&'g self, columns: &'g ColumnMapping) -> Result<MarketQuery<'g>, QueryError> {
        if self.guard.dataset.is_none() {
            return Err(QueryError::NoDataset);
        }
        Ok(MarketQuery {
            ctx: self.ctx()?,
            relation: self.relation,
            columns,
        })
    }
}

/// Execute SQL, surfacing engine errors (missing relation included).
async fn execute(ctx: &SessionContext, query: &str) -> Result<Vec<RecordBatch>, QueryError> {
    tracing::debug!(sql = query, "executing query");
    let df = ctx.sql(query).await.map_err(|source| QueryError::SqlExecution {
        query: query.to_string(),
        source,
    })?;
    df.collect().await.map_err(|source| QueryError::SqlExecution {
        query: query.to_string(),
        source,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Query Executor
// ─────────────────────────────────────────────────────────────────────────────

pub struct MarketQuery<'a> {
    ctx: &'a SessionContext,
    relation: &'a str,
    columns: &'a ColumnMapping,
}

impl MarketQuery<'_> {
    async fn sql(&self, query: &str) -> Result<Vec<RecordBatch>, QueryError> {
        execute(self.ctx, query).await
    }

    fn select(&self) -> SelectQuery {
        SelectQuery::from(self.relation)
    }

    /// `SUM` of a measure column, zero when nothing matches
    fn sum(&self, measure: Measure, alias: &'static str) -> Projection {
        Projection::Sum {
            column: self.columns.measure(measure).to_string(),
            alias,
        }
    }

    fn dimension_column(&self, dim: Dimension) -> Result<&str, QueryError> {
        self.columns
            .dimension(dim)
            .ok_or(QueryError::UnmappedDimension(dim))
    }
}
