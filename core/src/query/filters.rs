//! Filter predicates rendered from a [`FilterSelection`].
//!
//! Every identifier goes through [`quote_ident`] and every value through
//! [`quote_literal`], so selection values sourced from arbitrary data content
//! always denote exactly themselves inside the query text.

use marketlens_types::{ColumnMapping, Dimension, FilterSelection};

/// Quote an identifier (地市 -> "地市", a"b -> "a""b")
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal (O'Brien -> 'O''Brien')
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A single boolean condition over one column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Column value is one of the listed literals
    In { column: String, values: Vec<String> },
    NotNull { column: String },
}

impl Predicate {
    pub fn is_in<I, S>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Predicate::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn not_null(column: &str) -> Self {
        Predicate::NotNull {
            column: column.to_string(),
        }
    }

    pub fn to_sql(&self) -> String {
        match self {
            // An empty IN list matches nothing
            Predicate::In { values, .. } if values.is_empty() => "FALSE".to_string(),
            Predicate::In { column, values } => {
                let list = values
                    .iter()
                    .map(|v| quote_literal(v))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("{} IN ({})", quote_ident(column), list)
            }
            Predicate::NotNull { column } => format!("{} IS NOT NULL", quote_ident(column)),
        }
    }
}

/// One `IN` predicate per restricted filter dimension, in [`Dimension::FILTERS`] order.
pub fn selection_predicates(
    selection: &FilterSelection,
    columns: &ColumnMapping,
) -> Vec<Predicate> {
    Dimension::FILTERS
        .iter()
        .filter_map(|dim| {
            let values = selection.values(*dim)?;
            if values.is_empty() {
                return None;
            }
            let column = columns.dimension(*dim)?;
            Some(Predicate::is_in(column, values.iter().cloned()))
        })
        .collect()
}

/// Conjunctive predicate fragment for a selection, empty when nothing is restricted.
pub fn build_predicate(selection: &FilterSelection, columns: &ColumnMapping) -> String {
    join_predicates(&selection_predicates(selection, columns))
}

/// `WHERE <fragment>`, or an empty string when nothing is restricted.
pub fn where_clause(selection: &FilterSelection, columns: &ColumnMapping) -> String {
    let fragment = build_predicate(selection, columns);
    if fragment.is_empty() {
        fragment
    } else {
        format!("WHERE {fragment}")
    }
}

pub(crate) fn join_predicates(predicates: &[Predicate]) -> String {
    predicates
        .iter()
        .map(Predicate::to_sql)
        .collect::<Vec<_>>()
        .join(" AND ")
}
