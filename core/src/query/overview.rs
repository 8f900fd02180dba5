//! KPI summary and raw preview queries.

use super::*;

impl MarketQuery<'_> {
    /// Headline totals for the selection: premium and policy sums plus the
    /// number of business types and regions covered.
    pub async fn kpis(&self, filter: &FilterSelection) -> Result<KpiSummary, QueryError> {
        let columns = self.columns;
        let sql = self
            .select()
            .project(self.sum(Measure::Premium, "total_premium"))
            .project(self.sum(Measure::Policies, "total_policies"))
            .project(Projection::CountDistinct {
                column: columns.business_type.clone(),
                alias: "business_type_count",
            })
            .project(Projection::CountDistinct {
                column: columns.region.clone(),
                alias: "region_count",
            })
            .filter(filters::selection_predicates(filter, columns))
            .to_sql();

        let batches = self.sql(&sql).await?;
        Ok(KpiSummary {
            total_premium: scalar_f64(&batches, 0)?,
            total_policies: scalar_f64(&batches, 1)?,
            business_type_count: scalar_i64(&batches, 2)?,
            region_count: scalar_i64(&batches, 3)?,
        })
    }

    /// First `limit` rows of the relation, all columns.
    pub async fn preview(&self, limit: usize) -> Result<Vec<Row>, QueryError> {
        let sql = self.select().limit(Some(limit)).to_sql();
        let batches = self.sql(&sql).await?;
        batches_to_rows(&batches)
    }
}
