//! Structured SELECT assembly from fixed projection templates.

use super::filters::{Predicate, join_predicates, quote_ident};

/// Projection templates used by the dashboard queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `*`
    All,
    /// `"column" AS "alias"`
    Column { column: String, alias: &'static str },
    /// `COALESCE(SUM("column"), 0) AS "alias"`
    Sum { column: String, alias: &'static str },
    /// `COUNT(DISTINCT "column") AS "alias"`
    CountDistinct { column: String, alias: &'static str },
    /// Percent of the grouped column sum over all groups (window over the aggregate)
    ShareOfTotal { column: String, alias: &'static str },
}

impl Projection {
    fn to_sql(&self) -> String {
        match self {
            Projection::All => "*".to_string(),
            Projection::Column { column, alias } => {
                format!("{} AS {}", quote_ident(column), quote_ident(alias))
            }
            Projection::Sum { column, alias } => {
                format!("COALESCE(SUM({}), 0) AS {}", quote_ident(column), quote_ident(alias))
            }
            Projection::CountDistinct { column, alias } => {
                format!("COUNT(DISTINCT {}) AS {}", quote_ident(column), quote_ident(alias))
            }
            Projection::ShareOfTotal { column, alias } => {
                let col = quote_ident(column);
                format!(
                    "COALESCE(CAST(SUM({col}) AS DOUBLE) * 100.0 / NULLIF(CAST(SUM(SUM({col})) OVER () AS DOUBLE), 0), 0.0) AS {}",
                    quote_ident(alias)
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// A single-relation SELECT.
#[derive(Debug, Clone)]
pub struct SelectQuery {
    relation: String,
    projections: Vec<Projection>,
    predicates: Vec<Predicate>,
    group_by: Vec<String>,
    /// (output alias, order)
    order_by: Vec<(&'static str, SortOrder)>,
    limit: Option<usize>,
}

impl SelectQuery {
    pub fn from(relation: &str) -> Self {
        Self {
            relation: relation.to_string(),
            projections: Vec::new(),
            predicates: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    pub fn project(mut self, projection: Projection) -> Self {
        self.projections.push(projection);
        self
    }

    pub fn filter(mut self, predicates: impl IntoIterator<Item = Predicate>) -> Self {
        self.predicates.extend(predicates);
        self
    }

    pub fn group_by(mut self, column: &str) -> Self {
        self.group_by.push(column.to_string());
        self
    }

    pub fn order_by(mut self, alias: &'static str, order: SortOrder) -> Self {
        self.order_by.push((alias, order));
        self
    }

    pub fn limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    pub fn to_sql(&self) -> String {
        let projections = if self.projections.is_empty() {
            "*".to_string()
        } else {
            self.projections
                .iter()
                .map(Projection::to_sql)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = format!("SELECT {projections} FROM {}", quote_ident(&self.relation));
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&join_predicates(&self.predicates));
        }
        if !self.group_by.is_empty() {
            let cols = self
                .group_by
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" GROUP BY ");
            sql.push_str(&cols);
        }
        if !self.order_by.is_empty() {
            let keys = self
                .order_by
                .iter()
                .map(|(alias, order)| format!("{} {}", quote_ident(alias), order.keyword()))
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&keys);
        }
        if let Some(n) = self.limit {
            sql.push_str(&format!(" LIMIT {n}"));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_select() {
        let sql = SelectQuery::from("market_data").limit(Some(10)).to_sql();
        assert_eq!(sql, "SELECT * FROM \"market_data\" LIMIT 10");
    }

    #[test]
    fn grouped_select_with_filter_and_order() {
        let sql = SelectQuery::from("market_data")
            .project(Projection::Column {
                column: "地市".to_string(),
                alias: "name",
            })
            .project(Projection::Sum {
                column: "标准保费".to_string(),
                alias: "premium",
            })
            .filter([Predicate::is_in("年月", ["2024-06"])])
            .group_by("地市")
            .order_by("premium", SortOrder::Desc)
            .order_by("name", SortOrder::Asc)
            .to_sql();
        assert_eq!(
            sql,
            "SELECT \"地市\" AS \"name\", COALESCE(SUM(\"标准保费\"), 0) AS \"premium\" \
             FROM \"market_data\" WHERE \"年月\" IN ('2024-06') GROUP BY \"地市\" \
             ORDER BY \"premium\" DESC, \"name\" ASC"
        );
    }

    #[test]
    fn relation_and_columns_are_quoted() {
        let sql = SelectQuery::from("we\"ird")
            .project(Projection::CountDistinct {
                column: "a\"b".to_string(),
                alias: "n",
            })
            .to_sql();
        assert_eq!(sql, "SELECT COUNT(DISTINCT \"a\"\"b\") AS \"n\" FROM \"we\"\"ird\"");
    }

    #[test]
    fn empty_in_list_matches_nothing() {
        let sql = SelectQuery::from("t")
            .filter([Predicate::is_in("c", Vec::<String>::new())])
            .to_sql();
        assert_eq!(sql, "SELECT * FROM \"t\" WHERE FALSE");
    }
}
