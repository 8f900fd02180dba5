//! Data session: engine/dataset lifecycle and the query surface views use.
//!
//! Phases: `Uninitialized -> Initializing -> EngineReady -> Loading -> Loaded`,
//! with `Error` reachable from initialization and loading. Queries are only
//! permitted in `Loaded`; anything else fails fast with [`SessionError::NotLoaded`].

mod dashboard;
mod error;
pub mod requests;

#[cfg(test)]
mod session_tests;

use bytes::Bytes;
use tokio::sync::RwLock;

use marketlens_types::{
    AppConfig, ColumnMapping, Dimension, FilterOptions, FilterSelection, KpiSummary, RankingRow,
    Row, SessionPhase, SessionSnapshot, TrendPoint,
};

use crate::query::{DatasetInfo, QueryError, QueryGateway};
use crate::source::{LoadError, LoadSource};

pub use dashboard::{Dashboard, Overview, Panel};
pub use error::SessionError;
pub use requests::{QueryCache, QueryShape, RequestKey, Ticket, ViewSlot};

#[derive(Debug, Default)]
struct SessionState {
    phase: SessionPhase,
    columns: Vec<String>,
    row_count: usize,
    error: Option<String>,
    generation: u64,
    /// Required columns absent from the active dataset
    missing: Vec<String>,
}

/// One session per host: owns the gateway, tracks the lifecycle phase and
/// the active dataset's metadata.
pub struct Session {
    gateway: QueryGateway,
    contract: ColumnMapping,
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new(gateway: QueryGateway, contract: ColumnMapping) -> Self {
        Self {
            gateway,
            contract,
            state: RwLock::new(SessionState::default()),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            QueryGateway::new(config.engine.clone(), config.relation_name.clone()),
            config.columns.clone(),
        )
    }

    /// Column contract the dashboard queries are written against
    pub fn contract(&self) -> &ColumnMapping {
        &self.contract
    }

    pub fn gateway(&self) -> &QueryGateway {
        &self.gateway
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.state.read().await;
        SessionSnapshot {
            phase: st.phase,
            columns: st.columns.clone(),
            row_count: st.row_count,
            error: st.error.clone(),
            generation: st.generation,
            missing_columns: st.missing.clone(),
        }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.read().await.phase
    }

    pub async fn is_loaded(&self) -> bool {
        self.phase().await == SessionPhase::Loaded
    }

    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Provision the engine. No-op once it is up; retried from `Error` only
    /// when the engine itself failed to come up.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        {
            let mut st = self.state.write().await;
            match st.phase {
                SessionPhase::Uninitialized => {}
                SessionPhase::Error if !self.gateway.is_initialized().await => {}
                _ => return Ok(()),
            }
            st.phase = SessionPhase::Initializing;
        }

        let result = self.gateway.initialize().await;

        let mut st = self.state.write().await;
        match result {
            Ok(_) => {
                st.phase = SessionPhase::EngineReady;
                st.error = None;
                Ok(())
            }
            Err(e) => {
                let err = SessionError::EngineInit(e);
                tracing::error!(error = %err, "engine initialization failed");
                st.phase = SessionPhase::Error;
                st.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Load a dataset from a file or URL, replacing the active one.
    pub async fn load(&self, source: &LoadSource) -> Result<DatasetInfo, SessionError> {
        self.initialize().await?;
        self.begin_loading().await?;
        tracing::info!(source = %source.name(), "loading dataset");

        let result = async {
            let bytes = source.fetch().await?;
            Ok::<_, LoadError>(self.gateway.load_dataset(bytes, &source.name()).await?)
        }
        .await;
        self.finish_loading(result).await
    }

    /// Load a dataset from bytes already in memory.
    pub async fn load_bytes(&self, bytes: Bytes, name: &str) -> Result<DatasetInfo, SessionError> {
        self.initialize().await?;
        self.begin_loading().await?;
        let result = self
            .gateway
            .load_dataset(bytes, name)
            .await
            .map_err(LoadError::from);
        self.finish_loading(result).await
    }

    async fn begin_loading(&self) -> Result<(), SessionError> {
        let mut st = self.state.write().await;
        match st.phase {
            SessionPhase::EngineReady | SessionPhase::Loaded | SessionPhase::Error => {
                st.phase = SessionPhase::Loading;
                st.error = None;
                Ok(())
            }
            phase => {
                let err = SessionError::DatasetLoad(LoadError::Busy);
                tracing::warn!(phase = phase.label(), "load rejected");
                st.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    async fn finish_loading(
        &self,
        result: Result<DatasetInfo, LoadError>,
    ) -> Result<DatasetInfo, SessionError> {
        let mut st = self.state.write().await;
        match result {
            Ok(info) => {
                st.phase = SessionPhase::Loaded;
                st.columns = info.columns.clone();
                st.row_count = info.row_count;
                st.generation += 1;
                st.missing = self.contract.missing_from(&info.columns);

                if !st.missing.is_empty() {
                    let err = SessionError::SchemaMismatch {
                        missing: st.missing.clone(),
                    };
                    tracing::warn!(
                        missing = ?st.missing,
                        source = %info.source,
                        "dataset schema mismatch"
                    );
                    st.error = Some(err.to_string());
                    return Err(err);
                }

                st.error = None;
                tracing::info!(
                    rows = info.row_count,
                    columns = info.columns.len(),
                    generation = st.generation,
                    "dataset ready"
                );
                Ok(info)
            }
            Err(e) => {
                let err = SessionError::DatasetLoad(e);
                tracing::warn!(error = %err, "dataset load failed");
                st.phase = SessionPhase::Error;
                st.columns.clear();
                st.row_count = 0;
                st.missing.clear();
                st.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Release the engine and forget the dataset. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        self.gateway.shutdown().await;
        let mut st = self.state.write().await;
        let generation = st.generation;
        *st = SessionState {
            generation,
            ..SessionState::default()
        };
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query gates
    // ─────────────────────────────────────────────────────────────────────────

    async fn require_loaded(&self) -> Result<(), SessionError> {
        if self.phase().await != SessionPhase::Loaded {
            return Err(SessionError::NotLoaded);
        }
        Ok(())
    }

    /// Loaded and the column contract is satisfied
    async fn require_dashboard(&self) -> Result<(), SessionError> {
        let st = self.state.read().await;
        if st.phase != SessionPhase::Loaded {
            return Err(SessionError::NotLoaded);
        }
        if !st.missing.is_empty() {
            return Err(SessionError::SchemaMismatch {
                missing: st.missing.clone(),
            });
        }
        Ok(())
    }

    /// Dashboard gate plus presence of an optional dimension column
    async fn require_dimension(&self, dim: Dimension) -> Result<(), SessionError> {
        self.require_dashboard().await?;
        let Some(column) = self.contract.dimension(dim) else {
            return Err(QueryError::UnmappedDimension(dim).into());
        };
        let st = self.state.read().await;
        if !st.columns.iter().any(|c| c == column) {
            return Err(SessionError::SchemaMismatch {
                missing: vec![column.to_string()],
            });
        }
        Ok(())
    }

    /// Whether `dim` can be queried against the active dataset
    pub async fn supports(&self, dim: Dimension) -> bool {
        self.require_dimension(dim).await.is_ok()
    }

    /// Store a failed query's message as the session error.
    async fn record<T>(&self, result: Result<T, QueryError>) -> Result<T, SessionError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = SessionError::Query(e);
                tracing::warn!(error = %err, "query failed");
                self.state.write().await.error = Some(err.to_string());
                Err(err)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Query surface
    // ─────────────────────────────────────────────────────────────────────────

    /// Run arbitrary SQL against the active relation.
    pub async fn query(&self, sql: &str) -> Result<Vec<Row>, SessionError> {
        self.require_loaded().await?;
        let result = self.gateway.run_query(sql).await;
        self.record(result).await
    }

    /// Sorted distinct non-null values of a column.
    pub async fn distinct(&self, column: &str) -> Result<Vec<String>, SessionError> {
        self.require_loaded().await?;
        let result = self.gateway.list_distinct(column).await;
        self.record(result).await
    }

    /// First rows of the dataset, available even when the schema is incomplete.
    pub async fn preview(&self, limit: usize) -> Result<Vec<Row>, SessionError> {
        self.require_loaded().await?;
        let result = async {
            let guard = self.gateway.query().await?;
            guard.market(&self.contract)?.preview(limit).await
        }
        .await;
        self.record(result).await
    }

    pub async fn kpis(&self, filter: &FilterSelection) -> Result<KpiSummary, SessionError> {
        self.require_dashboard().await?;
        let result = async {
            let guard = self.gateway.query().await?;
            guard.market(&self.contract)?.kpis(filter).await
        }
        .await;
        self.record(result).await
    }

    pub async fn trend(&self, filter: &FilterSelection) -> Result<Vec<TrendPoint>, SessionError> {
        self.require_dashboard().await?;
        let result = async {
            let guard = self.gateway.query().await?;
            guard.market(&self.contract)?.trend(filter).await
        }
        .await;
        self.record(result).await
    }

    /// Top `limit` groups of `dim` by premium.
    pub async fn ranking(
        &self,
        dim: Dimension,
        filter: &FilterSelection,
        limit: usize,
    ) -> Result<Vec<RankingRow>, SessionError> {
        self.require_dimension(dim).await?;
        let result = async {
            let guard = self.gateway.query().await?;
            guard.market(&self.contract)?.ranking(dim, filter, limit).await
        }
        .await;
        self.record(result).await
    }

    /// Every group of `dim`, for the per-dimension analysis panels.
    pub async fn breakdown(
        &self,
        dim: Dimension,
        filter: &FilterSelection,
    ) -> Result<Vec<RankingRow>, SessionError> {
        self.require_dimension(dim).await?;
        let result = async {
            let guard = self.gateway.query().await?;
            guard.market(&self.contract)?.breakdown(dim, filter, None).await
        }
        .await;
        self.record(result).await
    }

    /// Selector options for the four filter dimensions.
    pub async fn filter_options(&self) -> Result<FilterOptions, SessionError> {
        self.require_dashboard().await?;
        let c = &self.contract;
        let (periods, regions, insurance_types, business_types) = tokio::try_join!(
            self.distinct(&c.period),
            self.distinct(&c.region),
            self.distinct(&c.insurance_type),
            self.distinct(&c.business_type),
        )?;
        Ok(FilterOptions {
            periods,
            regions,
            insurance_types,
            business_types,
        })
    }

    /// Check that every value occurs in `dim`'s column of the active dataset.
    /// Unknown values are listed in the error, in the order given.
    pub async fn validate_selection(
        &self,
        dim: Dimension,
        values: &[String],
    ) -> Result<(), SessionError> {
        if !dim.is_filter() {
            return Err(SessionError::NotAFilter {
                dimension: dim.label(),
            });
        }
        self.require_dashboard().await?;
        let Some(column) = self.contract.dimension(dim) else {
            return Err(QueryError::UnmappedDimension(dim).into());
        };
        if values.is_empty() {
            return Ok(());
        }

        let known = self.distinct(column).await?;
        let mut unknown: Vec<String> = Vec::new();
        for value in values {
            if !known.contains(value) && !unknown.contains(value) {
                unknown.push(value.clone());
            }
        }
        if !unknown.is_empty() {
            return Err(SessionError::UnknownFilterValues {
                dimension: dim.label(),
                values: unknown,
            });
        }
        Ok(())
    }

    /// Replace the selection for `dim` after validating the values. On error
    /// the selection is left untouched.
    pub async fn select(
        &self,
        selection: &mut FilterSelection,
        dim: Dimension,
        values: Vec<String>,
    ) -> Result<(), SessionError> {
        self.validate_selection(dim, &values).await?;
        selection.set(dim, values);
        Ok(())
    }

    /// Drop selected values the active dataset no longer contains, e.g. after
    /// loading a different file. Returns how many values were dropped.
    pub async fn revalidate(&self, selection: &mut FilterSelection) -> Result<usize, SessionError> {
        if selection.is_empty() {
            return Ok(0);
        }
        let options = self.filter_options().await?;
        let dropped: usize = Dimension::FILTERS
            .iter()
            .map(|dim| selection.retain_known(*dim, options.values(*dim)))
            .sum();
        if dropped > 0 {
            tracing::warn!(dropped, "removed filter values absent from the dataset");
        }
        Ok(dropped)
    }
}
