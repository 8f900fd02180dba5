//! Per-dimension rankings and breakdowns.

use super::*;

impl MarketQuery<'_> {
    /// Groups of `dimension` ordered by premium descending, optionally capped
    /// at `limit`. Shares are relative to the whole filtered premium, so over
    /// an uncapped breakdown they sum to 100.
    pub async fn breakdown(
        &self,
        dimension: Dimension,
        filter: &FilterSelection,
        limit: Option<usize>,
    ) -> Result<Vec<RankingRow>, QueryError> {
        let columns = self.columns;
        let group_col = self.dimension_column(dimension)?;

        let sql = self
            .select()
            .project(Projection::Column {
                column: group_col.to_string(),
                alias: "name",
            })
            .project(self.sum(Measure::Premium, "premium"))
            .project(self.sum(Measure::Policies, "policies"))
            .project(Projection::ShareOfTotal {
                column: columns.measure(Measure::Premium).to_string(),
                alias: "share",
            })
            .filter(filters::selection_predicates(filter, columns))
            .filter([Predicate::not_null(group_col)])
            .group_by(group_col)
            .order_by("premium", SortOrder::Desc)
            .order_by("name", SortOrder::Asc)
            .limit(limit)
            .to_sql();

        let batches = self.sql(&sql).await?;

        let mut results = Vec::new();
        for batch in &batches {
            let names = col_strings(batch, 0)?;
            let premiums = col_f64(batch, 1)?;
            let policies = col_f64(batch, 2)?;
            let shares = col_f64(batch, 3)?;
            for i in 0..batch.num_rows() {
                results.push(RankingRow {
                    name: names[i].clone(),
                    premium: premiums[i],
                    policies: policies[i],
                    share: shares[i],
                });
            }
        }
        Ok(results)
    }

    /// Top `limit` groups of `dimension` by premium.
    pub async fn ranking(
        &self,
        dimension: Dimension,
        filter: &FilterSelection,
        limit: usize,
    ) -> Result<Vec<RankingRow>, QueryError> {
        self.breakdown(dimension, filter, Some(limit)).await
    }
}
