//! Paging through faceted counts.
//!
//! Solr cannot stream every distinct value of a facet in one response without
//! holding it all in memory, so the sync walks the facet in fixed-size windows
//! using `facet.offset`/`facet.limit`, one request per page.

use std::collections::HashMap;

use async_stream::try_stream;
use futures::Stream;
use tracing::debug;

use dspace_statistics_common::{total_pages, Metric, Result, Scope, StatisticsError};
use solr_client::SelectParams;

use crate::shards::{ShardList, DEFAULT_CORE};
use crate::traits::StatisticsIndex;

/// A faceted count query over the statistics core.
#[derive(Debug, Clone)]
pub struct FacetQuery {
    pub q: String,
    pub fq: String,
    pub facet_field: String,
    pub shards: ShardList,
}

impl FacetQuery {
    /// All non-bot usage events of `metric`, faceted on the scope's field.
    pub fn for_metric(scope: Scope, metric: Metric, shards: ShardList) -> Self {
        Self {
            q: metric.query().to_string(),
            fq: metric.filter().to_string(),
            facet_field: scope.facet_field(metric).to_string(),
            shards,
        }
    }

    fn base_params(&self) -> SelectParams {
        SelectParams::new()
            .set("q", &self.q)
            .set("fq", &self.fq)
            .set("fl", &self.facet_field)
            .set("facet", "true")
            .set("facet.field", &self.facet_field)
            .set("facet.mincount", 1)
            .set("rows", 0)
            .set("json.nl", "map")
            .set_opt("shards", self.shards.param())
    }

    /// Cheap query whose only purpose is the distinct-value count.
    pub fn priming_params(&self) -> SelectParams {
        self.base_params()
            .set("facet.limit", 1)
            .set("facet.offset", 0)
            .set("stats", "true")
            .set("stats.field", &self.facet_field)
            .set("stats.calcdistinct", "true")
    }

    /// One window of the facet. Index order keeps windows disjoint even when
    /// counts change between requests.
    pub fn page_params(&self, offset: u64, page_size: u64) -> SelectParams {
        self.base_params()
            .set("facet.limit", page_size)
            .set("facet.offset", offset)
            .set("facet.sort", "index")
    }
}

/// One window of `value -> count` pairs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetPage {
    pub page: u64,
    pub offset: u64,
    pub page_size: u64,
    pub counts: HashMap<String, u64>,
}

impl FacetPage {
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn rows(&self) -> Vec<(String, u64)> {
        self.counts.iter().map(|(id, n)| (id.clone(), *n)).collect()
    }
}

/// Number of distinct facet values with at least one matching event.
///
/// A field without any documents has no stats entry; that is the normal
/// "nothing indexed yet" state and counts as zero.
pub async fn count_distinct(index: &dyn StatisticsIndex, query: &FacetQuery) -> Result<u64> {
    let resp = index.select(DEFAULT_CORE, &query.priming_params()).await?;
    Ok(resp.count_distinct(&query.facet_field).unwrap_or(0))
}

/// Lazily fetch every page of the facet, one request at a time.
///
/// Pages `0..=num_pages` are requested: one window more than the distinct
/// count calls for, so values indexed between the priming query and the last
/// page are still picked up. The extra page is usually empty.
///
/// Each call starts over from offset 0.
pub fn paginate<'a>(
    index: &'a dyn StatisticsIndex,
    query: &'a FacetQuery,
    page_size: u64,
) -> impl Stream<Item = Result<FacetPage>> + 'a {
    try_stream! {
        if page_size == 0 {
            Err::<(), StatisticsError>(StatisticsError::InvalidInput(
                "facet page size must be at least 1".to_string(),
            ))?;
        }

        let total = count_distinct(index, query).await?;
        if total == 0 {
            debug!(field = query.facet_field.as_str(), "No distinct facet values");
        } else {
            let num_pages = total_pages(total, page_size);
            debug!(field = query.facet_field.as_str(), total, num_pages, "Paging facet");

            for page in 0..=num_pages {
                let offset = page * page_size;
                let resp = index
                    .select(DEFAULT_CORE, &query.page_params(offset, page_size))
                    .await?;
                let counts = resp
                    .facet_field(&query.facet_field)
                    .cloned()
                    .unwrap_or_default();

                yield FacetPage {
                    page,
                    offset,
                    page_size,
                    counts,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use futures::{pin_mut, StreamExt, TryStreamExt};

    use super::*;
    use crate::testing::MockIndex;

    fn ids(n: usize) -> Vec<(String, u64)> {
        (0..n).map(|i| (format!("id-{i:05}"), (i % 7 + 1) as u64)).collect()
    }

    async fn collect(index: &MockIndex, page_size: u64) -> Vec<FacetPage> {
        let query = FacetQuery::for_metric(Scope::Item, Metric::Views, ShardList::default());
        paginate(index, &query, page_size).try_collect().await.unwrap()
    }

    #[tokio::test]
    async fn page_count_is_ceiling_plus_one_and_union_is_complete() {
        for (total, page_size) in [(1usize, 1u64), (7, 3), (100, 100), (101, 100), (250, 100), (5, 10)] {
            let index = MockIndex::new().with_counts(Metric::Views, "id", &ids(total));
            let pages = collect(&index, page_size).await;

            let expected_pages = (total as u64).div_ceil(page_size) + 1;
            assert_eq!(pages.len() as u64, expected_pages, "total={total} page_size={page_size}");
            // priming query plus one request per page
            assert_eq!(index.select_count() as u64, expected_pages + 1);

            let union: HashSet<String> = pages
                .iter()
                .flat_map(|p| p.counts.keys().cloned())
                .collect();
            assert_eq!(union.len(), total);
        }
    }

    #[tokio::test]
    async fn pages_are_disjoint_windows() {
        let index = MockIndex::new().with_counts(Metric::Views, "id", &ids(25));
        let pages = collect(&index, 10).await;

        assert_eq!(pages.len(), 4);
        assert_eq!(pages[0].counts.len(), 10);
        assert_eq!(pages[1].counts.len(), 10);
        assert_eq!(pages[2].counts.len(), 5);
        assert!(pages[3].is_empty());
        assert_eq!(pages[2].offset, 20);

        let total: usize = pages.iter().map(|p| p.counts.len()).sum();
        assert_eq!(total, 25);
    }

    #[tokio::test]
    async fn zero_distinct_values_yield_no_pages() {
        let index = MockIndex::new();
        let pages = collect(&index, 100).await;

        assert!(pages.is_empty());
        assert_eq!(index.select_count(), 1);
    }

    #[tokio::test]
    async fn extra_page_absorbs_count_drift() {
        // Stats report 20 values but 27 exist by the time pages are read.
        let index = MockIndex::new()
            .with_counts(Metric::Views, "id", &ids(27))
            .with_reported_distinct(Metric::Views, "id", 20);
        let pages = collect(&index, 10).await;

        let seen: usize = pages.iter().map(|p| p.counts.len()).sum();
        assert_eq!(pages.len(), 3);
        assert_eq!(seen, 27);
    }

    #[tokio::test]
    async fn priming_query_requests_distinct_stats() {
        let index = MockIndex::new().with_counts(Metric::Downloads, "owningItem", &ids(3));
        let query = FacetQuery::for_metric(Scope::Item, Metric::Downloads, ShardList::default());
        let _: Vec<FacetPage> = paginate(&index, &query, 100).try_collect().await.unwrap();

        let requests = index.requests();
        let priming = &requests[0];
        assert_eq!(priming.get("stats.calcdistinct"), Some("true"));
        assert_eq!(priming.get("stats.field"), Some("owningItem"));
        assert_eq!(priming.get("facet.limit"), Some("1"));
        assert_eq!(priming.get("q"), Some("type:0"));
        assert!(!priming.contains("shards"));

        let page = &requests[1];
        assert_eq!(page.get("facet.limit"), Some("100"));
        assert_eq!(page.get("facet.offset"), Some("0"));
        assert_eq!(page.get("json.nl"), Some("map"));
        assert_eq!(page.get("facet.mincount"), Some("1"));
    }

    #[tokio::test]
    async fn zero_page_size_is_rejected() {
        let index = MockIndex::new().with_counts(Metric::Views, "id", &ids(3));
        let query = FacetQuery::for_metric(Scope::Item, Metric::Views, ShardList::default());
        let stream = paginate(&index, &query, 0);
        pin_mut!(stream);

        let first = stream.next().await.unwrap();
        assert!(matches!(first, Err(StatisticsError::InvalidInput(_))));
        assert_eq!(index.select_count(), 0);
    }

    #[tokio::test]
    async fn upstream_failure_surfaces_as_error() {
        let index = MockIndex::new().failing_selects();
        let query = FacetQuery::for_metric(Scope::Item, Metric::Views, ShardList::default());
        let result: Result<Vec<FacetPage>> = paginate(&index, &query, 10).try_collect().await;

        assert!(matches!(result, Err(StatisticsError::Upstream(_))));
    }
}
