//! Shared query and configuration types for marketlens
//!
//! This crate contains serializable types that are shared between the query
//! backend (marketlens-core) and any frontend rendering its results.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ─────────────────────────────────────────────────────────────────────────────
// Dimensions & Measures
// ─────────────────────────────────────────────────────────────────────────────

/// Categorical column a dataset can be filtered or grouped by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Dimension {
    /// Time period identifier (e.g. "2024-06")
    Period,
    Region,
    InsuranceType,
    BusinessType,
    /// Insurer name. Optional in the data contract, never a filter.
    Company,
}

impl Dimension {
    /// Dimensions exposed as filter selectors, in predicate order.
    pub const FILTERS: [Dimension; 4] = [
        Dimension::Period,
        Dimension::Region,
        Dimension::InsuranceType,
        Dimension::BusinessType,
    ];

    /// Returns true if this dimension can carry a filter selection
    pub fn is_filter(&self) -> bool {
        !matches!(self, Dimension::Company)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Dimension::Period => "年月",
            Dimension::Region => "地市",
            Dimension::InsuranceType => "险种",
            Dimension::BusinessType => "业务类型",
            Dimension::Company => "保险公司",
        }
    }

    /// Parse a user-facing dimension name ("region", "company", ...)
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "period" | "month" | "yearmonth" => Some(Dimension::Period),
            "region" | "city" => Some(Dimension::Region),
            "insurancetype" | "insurance" => Some(Dimension::InsuranceType),
            "businesstype" | "business" => Some(Dimension::BusinessType),
            "company" => Some(Dimension::Company),
            _ => None,
        }
    }
}

/// Numeric column aggregated by dashboard queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Measure {
    Premium,
    Policies,
}

// ─────────────────────────────────────────────────────────────────────────────
// Data Contract
// ─────────────────────────────────────────────────────────────────────────────

/// Physical column names the loaded dataset is expected to carry.
///
/// The defaults match the monthly regional market export the dashboard was
/// built around. All fields except `company` are required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default = "default_period_column")]
    pub period: String,
    #[serde(default = "default_premium_column")]
    pub premium: String,
    #[serde(default = "default_policies_column")]
    pub policies: String,
    #[serde(default = "default_region_column")]
    pub region: String,
    #[serde(default = "default_insurance_type_column")]
    pub insurance_type: String,
    #[serde(default = "default_business_type_column")]
    pub business_type: String,
    #[serde(default = "default_company_column")]
    pub company: Option<String>,
}

fn default_period_column() -> String {
    "年月".to_string()
}
fn default_premium_column() -> String {
    "标准保费".to_string()
}
fn default_policies_column() -> String {
    "标准件数".to_string()
}
fn default_region_column() -> String {
    "地市".to_string()
}
fn default_insurance_type_column() -> String {
    "险种".to_string()
}
fn default_business_type_column() -> String {
    "业务类型".to_string()
}
fn default_company_column() -> Option<String> {
    Some("保险".to_string())
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            period: default_period_column(),
            premium: default_premium_column(),
            policies: default_policies_column(),
            region: default_region_column(),
            insurance_type: default_insurance_type_column(),
            business_type: default_business_type_column(),
            company: default_company_column(),
        }
    }
}

impl ColumnMapping {
    /// Column backing a dimension. `None` only for an unmapped company column.
    pub fn dimension(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Period => Some(&self.period),
            Dimension::Region => Some(&self.region),
            Dimension::InsuranceType => Some(&self.insurance_type),
            Dimension::BusinessType => Some(&self.business_type),
            Dimension::Company => self.company.as_deref(),
        }
    }

    pub fn measure(&self, measure: Measure) -> &str {
        match measure {
            Measure::Premium => &self.premium,
            Measure::Policies => &self.policies,
        }
    }

    /// Required columns in contract order.
    pub fn required(&self) -> [&str; 6] {
        [
            &self.period,
            &self.premium,
            &self.policies,
            &self.region,
            &self.insurance_type,
            &self.business_type,
        ]
    }

    /// Required columns absent from `columns`, in contract order.
    pub fn missing_from<S: AsRef<str>>(&self, columns: &[S]) -> Vec<String> {
        self.required()
            .into_iter()
            .filter(|req| !columns.iter().any(|c| c.as_ref() == *req))
            .map(str::to_string)
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Filter Selection
// ─────────────────────────────────────────────────────────────────────────────

/// Selected values per filter dimension. An empty set means "no restriction".
///
/// Sets are ordered so that rendering and hashing are deterministic for a
/// given selection regardless of the order values were picked in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FilterSelection {
    #[serde(default)]
    pub periods: BTreeSet<String>,
    #[serde(default)]
    pub regions: BTreeSet<String>,
    #[serde(default)]
    pub insurance_types: BTreeSet<String>,
    #[serde(default)]
    pub business_types: BTreeSet<String>,
}

impl FilterSelection {
    /// Selected values for a dimension, `None` for Company which is never filtered.
    pub fn values(&self, dim: Dimension) -> Option<&BTreeSet<String>> {
        match dim {
            Dimension::Period => Some(&self.periods),
            Dimension::Region => Some(&self.regions),
            Dimension::InsuranceType => Some(&self.insurance_types),
            Dimension::BusinessType => Some(&self.business_types),
            Dimension::Company => None,
        }
    }

    fn values_mut(&mut self, dim: Dimension) -> Option<&mut BTreeSet<String>> {
        match dim {
            Dimension::Period => Some(&mut self.periods),
            Dimension::Region => Some(&mut self.regions),
            Dimension::InsuranceType => Some(&mut self.insurance_types),
            Dimension::BusinessType => Some(&mut self.business_types),
            Dimension::Company => None,
        }
    }

    /// Replace the selection for one dimension. Returns false for a
    /// non-filter dimension.
    pub fn set<I, S>(&mut self, dim: Dimension, values: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.values_mut(dim) {
            Some(set) => {
                *set = values.into_iter().map(Into::into).collect();
                true
            }
            None => false,
        }
    }

    pub fn with<I, S>(mut self, dim: Dimension, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set(dim, values);
        self
    }

    /// Returns true if no dimension is restricted
    pub fn is_empty(&self) -> bool {
        Dimension::FILTERS
            .iter()
            .filter_map(|d| self.values(*d))
            .all(BTreeSet::is_empty)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Drop selected values not present in `known`. Returns how many were dropped.
    pub fn retain_known(&mut self, dim: Dimension, known: &[String]) -> usize {
        let Some(set) = self.values_mut(dim) else {
            return 0;
        };
        let before = set.len();
        set.retain(|v| known.iter().any(|k| k == v));
        before - set.len()
    }
}

/// Selector options sourced from the loaded dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub periods: Vec<String>,
    pub regions: Vec<String>,
    pub insurance_types: Vec<String>,
    pub business_types: Vec<String>,
}

impl FilterOptions {
    pub fn values(&self, dim: Dimension) -> &[String] {
        match dim {
            Dimension::Period => &self.periods,
            Dimension::Region => &self.regions,
            Dimension::InsuranceType => &self.insurance_types,
            Dimension::BusinessType => &self.business_types,
            Dimension::Company => &[],
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Query Result Types
// ─────────────────────────────────────────────────────────────────────────────

/// Headline figures for the current filter selection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KpiSummary {
    pub total_premium: f64,
    pub total_policies: f64,
    pub business_type_count: i64,
    pub region_count: i64,
}

/// One period of the premium/policy trend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub period: String,
    pub premium: f64,
    pub policies: f64,
}

/// One group of a ranking or per-dimension breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingRow {
    pub name: String,
    pub premium: f64,
    pub policies: f64,
    /// Percent of the filtered total premium (0-100)
    pub share: f64,
}

impl RankingRow {
    /// Average premium per policy, 0 when there are no policies
    pub fn avg_premium(&self) -> f64 {
        if self.policies > 0.0 {
            self.premium / self.policies
        } else {
            0.0
        }
    }
}

/// Scalar value of an untyped query result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Text(String),
    Number(f64),
    Null,
}

impl Cell {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Number(n) => Some(*n),
            Cell::Text(s) => s.parse().ok(),
            Cell::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cell::Text(s) => f.write_str(s),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Null => f.write_str("NULL"),
        }
    }
}

/// One record of an untyped query result, columns in projection order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<(String, Cell)>,
}

impl Row {
    pub fn get(&self, column: &str) -> Option<&Cell> {
        self.values
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, cell)| cell)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session State
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of the data session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Initializing,
    /// Engine provisioned, no dataset yet
    EngineReady,
    Loading,
    Loaded,
    Error,
}

impl SessionPhase {
    pub fn label(&self) -> &'static str {
        match self {
            SessionPhase::Uninitialized => "uninitialized",
            SessionPhase::Initializing => "initializing",
            SessionPhase::EngineReady => "ready",
            SessionPhase::Loading => "loading",
            SessionPhase::Loaded => "loaded",
            SessionPhase::Error => "error",
        }
    }
}

/// Public view of the session consumed by renderers.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub error: Option<String>,
    /// Incremented on every successful load
    pub generation: u64,
    /// Missing required columns of the active dataset, if any
    pub missing_columns: Vec<String>,
}

impl SessionSnapshot {
    pub fn is_loaded(&self) -> bool {
        self.phase == SessionPhase::Loaded
    }

    /// True when the dashboard can be shown: loaded and schema complete
    pub fn dashboard_ready(&self) -> bool {
        self.is_loaded() && self.missing_columns.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Embedded engine tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    #[serde(default = "default_target_partitions")]
    pub target_partitions: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Memory pool limit in MB. Unbounded when absent.
    #[serde(default)]
    pub memory_limit_mb: Option<usize>,
}

fn default_target_partitions() -> usize {
    2
}
fn default_batch_size() -> usize {
    4096
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            target_partitions: default_target_partitions(),
            batch_size: default_batch_size(),
            memory_limit_mb: None,
        }
    }
}

/// Application configuration.
///
/// Note: Persistence methods (load/save) are provided by marketlens-core via
/// the `AppConfigExt` trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote dataset fetched by the "load default data" action
    #[serde(default = "default_dataset_url")]
    pub default_dataset_url: String,
    /// Name of the relation the dataset is registered under
    #[serde(default = "default_relation_name")]
    pub relation_name: String,
    #[serde(default)]
    pub columns: ColumnMapping,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default = "default_ranking_limit")]
    pub ranking_limit: usize,
    #[serde(default = "default_preview_limit")]
    pub preview_limit: usize,
}

fn default_dataset_url() -> String {
    "http://127.0.0.1:8080/四川车险市场分月数据.parquet".to_string()
}
fn default_relation_name() -> String {
    "market_data".to_string()
}
fn default_ranking_limit() -> usize {
    10
}
fn default_preview_limit() -> usize {
    10
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_dataset_url: default_dataset_url(),
            relation_name: default_relation_name(),
            columns: ColumnMapping::default(),
            engine: EngineSettings::default(),
            ranking_limit: default_ranking_limit(),
            preview_limit: default_preview_limit(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_columns_reported_in_contract_order() {
        let mapping = ColumnMapping::default();
        let columns = vec!["标准件数", "年月", "地市", "险种", "extra"];
        assert_eq!(
            mapping.missing_from(&columns),
            vec!["标准保费".to_string(), "业务类型".to_string()]
        );
    }

    #[test]
    fn extra_columns_are_accepted() {
        let mapping = ColumnMapping::default();
        let mut columns: Vec<String> = mapping.required().iter().map(|s| s.to_string()).collect();
        columns.push("渠道".to_string());
        assert!(mapping.missing_from(&columns).is_empty());
    }

    #[test]
    fn selection_ignores_insertion_order_and_duplicates() {
        let a = FilterSelection::default().with(Dimension::Region, ["成都", "绵阳", "成都"]);
        let b = FilterSelection::default().with(Dimension::Region, ["绵阳", "成都"]);
        assert_eq!(a, b);
        assert_eq!(a.regions.len(), 2);
    }

    #[test]
    fn measures_follow_the_mapping() {
        let mapping = ColumnMapping {
            premium: "premium_cny".to_string(),
            ..ColumnMapping::default()
        };
        assert_eq!(mapping.measure(Measure::Premium), "premium_cny");
        assert_eq!(mapping.measure(Measure::Policies), "标准件数");
    }

    #[test]
    fn company_is_not_a_filter() {
        let mut selection = FilterSelection::default();
        assert!(!selection.set(Dimension::Company, ["PICC"]));
        assert!(selection.is_empty());
    }

    #[test]
    fn retain_known_drops_stale_values() {
        let mut selection =
            FilterSelection::default().with(Dimension::Period, ["2024-06", "2024-07"]);
        let dropped = selection.retain_known(Dimension::Period, &["2024-07".to_string()]);
        assert_eq!(dropped, 1);
        assert!(selection.periods.contains("2024-07"));
    }

    #[test]
    fn dimension_parse_accepts_aliases() {
        assert_eq!(Dimension::parse("city"), Some(Dimension::Region));
        assert_eq!(Dimension::parse("insurance-type"), Some(Dimension::InsuranceType));
        assert_eq!(Dimension::parse("Business_Type"), Some(Dimension::BusinessType));
        assert_eq!(Dimension::parse("weather"), None);
    }

    #[test]
    fn config_fills_defaults_for_missing_fields() {
        let config: AppConfig = serde_json::from_str(r#"{"ranking_limit": 5}"#).unwrap();
        assert_eq!(config.ranking_limit, 5);
        assert_eq!(config.relation_name, "market_data");
        assert_eq!(config.columns, ColumnMapping::default());
        assert_eq!(config.engine.target_partitions, 2);
    }

    #[test]
    fn untagged_cell_serializes_as_scalar() {
        let row = Row {
            values: vec![
                ("name".to_string(), Cell::Text("成都".to_string())),
                ("premium".to_string(), Cell::Number(1.5)),
                ("note".to_string(), Cell::Null),
            ],
        };
        let json = serde_json::to_string(&row.values).unwrap();
        assert_eq!(json, r#"[["name","成都"],["premium",1.5],["note",null]]"#);
        assert_eq!(row.get("premium").and_then(Cell::as_f64), Some(1.5));
    }
}
