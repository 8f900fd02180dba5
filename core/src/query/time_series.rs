//! Premium and policy totals per period.

use super::*;

impl MarketQuery<'_> {
    /// Trend over periods, ordered by the period column's natural order.
    pub async fn trend(&self, filter: &FilterSelection) -> Result<Vec<TrendPoint>, QueryError> {
        let columns = self.columns;
        let sql = self
            .select()
            .project(Projection::Column {
                column: columns.period.clone(),
                alias: "period",
            })
            .project(self.sum(Measure::Premium, "premium"))
            .project(self.sum(Measure::Policies, "policies"))
            .filter(filters::selection_predicates(filter, columns))
            .filter([Predicate::not_null(&columns.period)])
            .group_by(&columns.period)
            .order_by("period", SortOrder::Asc)
            .to_sql();

        let batches = self.sql(&sql).await?;

        let mut results = Vec::new();
        for batch in &batches {
            let periods = col_strings(batch, 0)?;
            let premiums = col_f64(batch, 1)?;
            let policies = col_f64(batch, 2)?;
            for i in 0..batch.num_rows() {
                results.push(TrendPoint {
                    period: periods[i].clone(),
                    premium: premiums[i],
                    policies: policies[i],
                });
            }
        }
        Ok(results)
    }
}
