//! Dashboard panels: each panel caches results per request key and only
//! applies the newest request's result.

use std::future::Future;

use tokio::sync::Mutex;

use marketlens_types::{Dimension, FilterSelection, KpiSummary, RankingRow, TrendPoint};

use super::requests::{QueryCache, QueryShape, RequestKey, ViewSlot};
use super::{Session, SessionError};

/// One view's latest result plus its result cache.
pub struct Panel<T> {
    slot: Mutex<ViewSlot<T>>,
    cache: Mutex<QueryCache<T>>,
}

impl<T> Default for Panel<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(ViewSlot::default()),
            cache: Mutex::new(QueryCache::default()),
        }
    }
}

impl<T: Clone> Panel<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `key` from the cache or by awaiting `run`, then apply it.
    ///
    /// Returns `Ok(None)` when a newer request was issued on this panel while
    /// this one was in flight; the result is then cached but not shown.
    pub async fn fetch<F>(&self, key: RequestKey, run: F) -> Result<Option<T>, SessionError>
    where
        F: Future<Output = Result<T, SessionError>>,
    {
        let ticket = self.slot.lock().await.begin(key.clone());

        let cached = self.cache.lock().await.get(&key);
        let value = match cached {
            Some(value) => {
                tracing::trace!(shape = ?key.shape, "panel cache hit");
                value
            }
            None => {
                let value = run.await?;
                self.cache.lock().await.insert(key, value.clone());
                value
            }
        };

        let applied = self.slot.lock().await.complete(ticket, value.clone());
        Ok(applied.then_some(value))
    }

    /// Value of the newest applied request
    pub async fn current(&self) -> Option<T> {
        self.slot.lock().await.value().cloned()
    }

    pub async fn current_key(&self) -> Option<RequestKey> {
        self.slot.lock().await.key().cloned()
    }

    pub async fn reset(&self) {
        self.slot.lock().await.clear();
        self.cache.lock().await.clear();
    }
}

/// Results of one overview refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Overview {
    pub kpis: KpiSummary,
    pub trend: Vec<TrendPoint>,
    pub region_ranking: Vec<RankingRow>,
    /// `None` when the dataset has no company column
    pub company_ranking: Option<Vec<RankingRow>>,
}

/// Panels of the market dashboard.
pub struct Dashboard {
    pub kpis: Panel<KpiSummary>,
    pub trend: Panel<Vec<TrendPoint>>,
    pub region_ranking: Panel<Vec<RankingRow>>,
    pub company_ranking: Panel<Vec<RankingRow>>,
    pub analysis: Panel<Vec<RankingRow>>,
    ranking_limit: usize,
}

impl Dashboard {
    pub fn new(ranking_limit: usize) -> Self {
        Self {
            kpis: Panel::new(),
            trend: Panel::new(),
            region_ranking: Panel::new(),
            company_ranking: Panel::new(),
            analysis: Panel::new(),
            ranking_limit,
        }
    }

    pub fn ranking_limit(&self) -> usize {
        self.ranking_limit
    }

    /// Refresh KPI, trend and ranking panels for `filter`, concurrently.
    ///
    /// Returns `Ok(None)` if any panel was superseded by a newer refresh.
    pub async fn refresh_overview(
        &self,
        session: &Session,
        filter: &FilterSelection,
    ) -> Result<Option<Overview>, SessionError> {
        let generation = session.generation().await;
        let limit = self.ranking_limit;
        let key = |shape| RequestKey::new(shape, filter, generation);
        let ranking_shape = |dimension| QueryShape::Ranking { dimension, limit };

        let with_company = session.supports(Dimension::Company).await;
        let company = async {
            if !with_company {
                return Ok(Some(None));
            }
            self.company_ranking
                .fetch(
                    key(ranking_shape(Dimension::Company)),
                    session.ranking(Dimension::Company, filter, limit),
                )
                .await
                .map(|rows| rows.map(Some))
        };

        let (kpis, trend, region_ranking, company_ranking) = tokio::try_join!(
            self.kpis.fetch(key(QueryShape::Kpis), session.kpis(filter)),
            self.trend.fetch(key(QueryShape::Trend), session.trend(filter)),
            self.region_ranking.fetch(
                key(ranking_shape(Dimension::Region)),
                session.ranking(Dimension::Region, filter, limit),
            ),
            company,
        )?;

        match (kpis, trend, region_ranking, company_ranking) {
            (Some(kpis), Some(trend), Some(region_ranking), Some(company_ranking)) => {
                Ok(Some(Overview {
                    kpis,
                    trend,
                    region_ranking,
                    company_ranking,
                }))
            }
            _ => Ok(None),
        }
    }

    /// Refresh the per-dimension analysis panel.
    pub async fn refresh_analysis(
        &self,
        session: &Session,
        dimension: Dimension,
        filter: &FilterSelection,
    ) -> Result<Option<Vec<RankingRow>>, SessionError> {
        let generation = session.generation().await;
        let key = RequestKey::new(QueryShape::Breakdown { dimension }, filter, generation);
        self.analysis
            .fetch(key, session.breakdown(dimension, filter))
            .await
    }

    /// Forget every panel's value and cache.
    pub async fn reset(&self) {
        tokio::join!(
            self.kpis.reset(),
            self.trend.reset(),
            self.region_ranking.reset(),
            self.company_ranking.reset(),
            self.analysis.reset(),
        );
    }
}
