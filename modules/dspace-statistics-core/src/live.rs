//! Ad-hoc statistics for a page of client-supplied ids over a date range.
//!
//! Unlike the indexer this goes straight to Solr: one faceted query per
//! metric, restricted to the requested ids, then reconciled so every id on
//! the page gets an entry.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::DateTime;
use tracing::debug;

use dspace_statistics_common::{
    total_pages, CountryStatistics, ElementStatistics, Metric, MonthStatistics, Result, Scope,
    StatisticsError, StatisticsPage,
};
use solr_client::{SelectParams, SelectResponse};

use crate::reconcile::reconcile;
use crate::shards::{resolve_shards, ShardList, DEFAULT_CORE};
use crate::traits::StatisticsIndex;

pub const DEFAULT_LIMIT: u64 = 100;

const COUNTRY_FIELD: &str = "countryCode";
const TIME_FIELD: &str = "time";
const DEFAULT_MONTHS_START: &str = "NOW/MONTH-11MONTHS";
const DEFAULT_MONTHS_END: &str = "NOW/MONTH+1MONTH";
/// Span of the monthly breakdown when only one end of the range is given.
const MONTHS_SPAN: &str = "12MONTHS";

/// Characters with a meaning in the Lucene query parser.
const QUERY_SPECIAL_CHARS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
    '/',
];

/// A validated live statistics request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveRequest {
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub ids: Vec<String>,
    pub limit: u64,
    pub page: u64,
    pub countries: bool,
    pub monthly: bool,
}

impl LiveRequest {
    pub fn new(ids: Vec<String>) -> Self {
        Self {
            date_from: None,
            date_to: None,
            ids,
            limit: DEFAULT_LIMIT,
            page: 0,
            countries: false,
            monthly: false,
        }
    }

    /// Requested ids without repeats, in first-seen order.
    pub fn unique_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.ids
            .iter()
            .map(String::as_str)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Unique ids on the requested page. Past the end this is empty.
    pub fn page_ids(&self) -> Vec<&str> {
        let mut ids = self.unique_ids();
        let start = self.page.saturating_mul(self.limit);
        let Ok(start) = usize::try_from(start) else {
            return Vec::new();
        };
        if start >= ids.len() {
            return Vec::new();
        }
        let end = start
            .saturating_add(usize::try_from(self.limit).unwrap_or(usize::MAX))
            .min(ids.len());
        ids.truncate(end);
        ids.drain(..start);
        ids
    }

    /// `facet.range.start`/`facet.range.end` for the monthly breakdown. A
    /// missing end is derived from the given one so the range never inverts.
    pub fn month_bounds(&self) -> (String, String) {
        match (self.date_from.as_deref(), self.date_to.as_deref()) {
            (Some(from), Some(to)) => (from.to_string(), to.to_string()),
            (Some(from), None) => (from.to_string(), format!("{from}+{MONTHS_SPAN}")),
            (None, Some(to)) => (format!("{to}-{MONTHS_SPAN}"), to.to_string()),
            (None, None) => (
                DEFAULT_MONTHS_START.to_string(),
                DEFAULT_MONTHS_END.to_string(),
            ),
        }
    }
}

/// Solr range syntax for the `time` filter. Open ends become `*`.
pub fn build_date_range(date_from: Option<&str>, date_to: Option<&str>) -> String {
    format!("[{} TO {}]", date_from.unwrap_or("*"), date_to.unwrap_or("*"))
}

/// Escape `id` so it is matched as one literal term.
fn escape_term(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for c in id.chars() {
        if QUERY_SPECIAL_CHARS.contains(&c) || c.is_whitespace() {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `field:(a OR b ...)` with every id escaped.
fn id_query(field: &str, ids: &[&str]) -> String {
    let terms: Vec<String> = ids.iter().map(|id| escape_term(id)).collect();
    format!("{field}:({})", terms.join(" OR "))
}

/// `2020-03-01T00:00:00Z` -> `2020-03`. Anything unparseable is kept as is.
fn month_label(bucket: &str) -> String {
    DateTime::parse_from_rfc3339(bucket)
        .map(|d| d.format("%Y-%m").to_string())
        .unwrap_or_else(|_| bucket.to_string())
}

/// Per-metric result of one live query.
#[derive(Debug, Default)]
struct MetricCounts {
    totals: HashMap<String, u64>,
    countries: HashMap<String, BTreeMap<String, u64>>,
    months: BTreeMap<String, u64>,
}

pub struct LiveAggregator {
    index: Arc<dyn StatisticsIndex>,
}

impl LiveAggregator {
    pub fn new(index: Arc<dyn StatisticsIndex>) -> Self {
        Self { index }
    }

    pub async fn live_statistics(&self, scope: Scope, request: &LiveRequest) -> Result<StatisticsPage> {
        if request.ids.iter().any(|id| id.trim().is_empty()) {
            return Err(StatisticsError::InvalidInput(format!(
                "The \"{}\" parameter must not contain empty ids",
                scope.body_key()
            )));
        }
        let ids = request.page_ids();
        let total_pages = total_pages(request.unique_ids().len() as u64, request.limit);

        let mut page = StatisticsPage {
            current_page: request.page,
            total_pages,
            limit: request.limit,
            statistics: Vec::new(),
            months: request.monthly.then(Vec::new),
        };
        if ids.is_empty() {
            debug!(scope = %scope, page = request.page, "Live request page is past the end");
            return Ok(page);
        }

        let shards = resolve_shards(self.index.as_ref()).await.shard_list();
        let range = build_date_range(request.date_from.as_deref(), request.date_to.as_deref());

        let views = self
            .query_metric(scope, Metric::Views, &ids, &range, &shards, request)
            .await?;
        let downloads = self
            .query_metric(scope, Metric::Downloads, &ids, &range, &shards, request)
            .await?;

        page.statistics = ids
            .iter()
            .map(|id| {
                let id = *id;
                let mut entry = ElementStatistics::new(
                    id,
                    views.totals.get(id).copied().unwrap_or(0),
                    downloads.totals.get(id).copied().unwrap_or(0),
                );
                if request.countries {
                    entry.countries = Some(merge_countries(
                        views.countries.get(id),
                        downloads.countries.get(id),
                    ));
                }
                entry
            })
            .collect();

        if request.monthly {
            page.months = Some(merge_months(&views.months, &downloads.months));
        }

        Ok(page)
    }

    async fn query_metric(
        &self,
        scope: Scope,
        metric: Metric,
        ids: &[&str],
        range: &str,
        shards: &ShardList,
        request: &LiveRequest,
    ) -> Result<MetricCounts> {
        let field = scope.facet_field(metric);
        let pivot_key = format!("{field},{COUNTRY_FIELD}");

        let mut params = SelectParams::new()
            .set("q", id_query(field, ids))
            .set(
                "fq",
                format!("{} AND {} AND {TIME_FIELD}:{range}", metric.query(), metric.filter()),
            )
            .set("fl", field)
            .set("facet", "true")
            .set("facet.field", field)
            .set("facet.mincount", 1)
            .set("facet.limit", -1)
            .set("rows", 0)
            .set("json.nl", "map")
            .set_opt("shards", shards.param());

        if request.countries {
            params = params.set("facet.pivot", &pivot_key);
        }
        if request.monthly {
            let (start, end) = request.month_bounds();
            params = params
                .set("facet.range", TIME_FIELD)
                .set("facet.range.gap", "+1MONTH")
                .set("facet.range.start", start)
                .set("facet.range.end", end);
        }

        let resp = self.index.select(DEFAULT_CORE, &params).await?;
        let empty = HashMap::new();
        let facet = resp.facet_field(field).unwrap_or(&empty);

        Ok(MetricCounts {
            totals: reconcile(ids, facet),
            countries: if request.countries {
                country_counts(&resp, &pivot_key, ids)
            } else {
                HashMap::new()
            },
            months: if request.monthly {
                month_counts(&resp)
            } else {
                BTreeMap::new()
            },
        })
    }
}

/// `id -> country -> count` from the pivot, only for requested ids.
fn country_counts(
    resp: &SelectResponse,
    pivot_key: &str,
    ids: &[&str],
) -> HashMap<String, BTreeMap<String, u64>> {
    let requested: BTreeSet<&str> = ids.iter().copied().collect();
    let mut out = HashMap::new();
    for entry in resp.facet_pivot(pivot_key).unwrap_or_default() {
        let id = entry.value_string();
        if !requested.contains(id.as_str()) {
            continue;
        }
        let countries: BTreeMap<String, u64> = entry
            .pivot
            .iter()
            .map(|c| (c.value_string(), c.count))
            .collect();
        out.insert(id, countries);
    }
    out
}

fn month_counts(resp: &SelectResponse) -> BTreeMap<String, u64> {
    let Some(range) = resp.facet_range(TIME_FIELD) else {
        return BTreeMap::new();
    };
    let mut months = BTreeMap::new();
    for (bucket, n) in &range.counts {
        *months.entry(month_label(bucket)).or_insert(0) += n;
    }
    months
}

fn merge_countries(
    views: Option<&BTreeMap<String, u64>>,
    downloads: Option<&BTreeMap<String, u64>>,
) -> Vec<CountryStatistics> {
    let mut merged: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for (code, n) in views.into_iter().flatten() {
        merged.entry(code.as_str()).or_default().0 = *n;
    }
    for (code, n) in downloads.into_iter().flatten() {
        merged.entry(code.as_str()).or_default().1 = *n;
    }
    merged
        .into_iter()
        .map(|(code, (views, downloads))| CountryStatistics {
            code: code.to_string(),
            views,
            downloads,
        })
        .collect()
}

fn merge_months(
    views: &BTreeMap<String, u64>,
    downloads: &BTreeMap<String, u64>,
) -> Vec<MonthStatistics> {
    let mut merged: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for (month, n) in views {
        merged.entry(month.as_str()).or_default().0 = *n;
    }
    for (month, n) in downloads {
        merged.entry(month.as_str()).or_default().1 = *n;
    }
    merged
        .into_iter()
        .map(|(month, (views, downloads))| MonthStatistics {
            month: month.to_string(),
            views,
            downloads,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockIndex;

    fn counts(pairs: &[(&str, u64)]) -> Vec<(String, u64)> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn request(ids: &[&str]) -> LiveRequest {
        LiveRequest::new(ids.iter().map(|s| s.to_string()).collect())
    }

    #[test]
    fn date_range_strings() {
        assert_eq!(
            build_date_range(Some("2020-01-01T00:00:00Z"), Some("2020-12-31T00:00:00Z")),
            "[2020-01-01T00:00:00Z TO 2020-12-31T00:00:00Z]"
        );
        assert_eq!(
            build_date_range(None, Some("2020-12-31T00:00:00Z")),
            "[* TO 2020-12-31T00:00:00Z]"
        );
        assert_eq!(
            build_date_range(Some("2020-01-01T00:00:00Z"), None),
            "[2020-01-01T00:00:00Z TO *]"
        );
        assert_eq!(build_date_range(None, None), "[* TO *]");
    }

    #[test]
    fn id_query_escapes_hyphens() {
        let ids = ["fd8a46d5-1480-4e69-b187-cd3db96d8e4d", "B"];
        assert_eq!(
            id_query("owningItem", &ids),
            r"owningItem:(fd8a46d5\-1480\-4e69\-b187\-cd3db96d8e4d OR B)"
        );
    }

    #[test]
    fn id_query_cannot_be_rewritten_by_an_id() {
        assert_eq!(id_query("id", &["*"]), r"id:(\*)");
        assert_eq!(id_query("id", &[")"]), r"id:(\))");
        assert_eq!(
            id_query("owningItem", &["x) OR type:*"]),
            r"owningItem:(x\)\ OR\ type\:\*)"
        );
        assert_eq!(id_query("id", &[r"a\b"]), r"id:(a\\b)");
    }

    #[test]
    fn month_bounds_never_invert() {
        let mut req = request(&["A"]);
        assert_eq!(
            req.month_bounds(),
            ("NOW/MONTH-11MONTHS".to_string(), "NOW/MONTH+1MONTH".to_string())
        );

        req.date_to = Some("2019-01-01T00:00:00Z".to_string());
        assert_eq!(
            req.month_bounds(),
            (
                "2019-01-01T00:00:00Z-12MONTHS".to_string(),
                "2019-01-01T00:00:00Z".to_string()
            )
        );

        req.date_to = None;
        req.date_from = Some("2030-06-01T00:00:00Z".to_string());
        assert_eq!(
            req.month_bounds(),
            (
                "2030-06-01T00:00:00Z".to_string(),
                "2030-06-01T00:00:00Z+12MONTHS".to_string()
            )
        );

        req.date_to = Some("2031-01-01T00:00:00Z".to_string());
        assert_eq!(
            req.month_bounds(),
            (
                "2030-06-01T00:00:00Z".to_string(),
                "2031-01-01T00:00:00Z".to_string()
            )
        );
    }

    #[test]
    fn repeated_ids_count_once_in_first_seen_order() {
        let mut req = request(&["B", "A", "B", "C", "A"]);
        assert_eq!(req.unique_ids(), ["B", "A", "C"]);
        req.limit = 2;
        req.page = 1;
        assert_eq!(req.page_ids(), ["C"]);
    }

    #[test]
    fn page_slicing() {
        let mut req = request(&["A", "B", "C"]);
        req.limit = 2;
        assert_eq!(req.page_ids(), ["A", "B"]);
        req.page = 1;
        assert_eq!(req.page_ids(), ["C"]);
        req.page = 2;
        assert!(req.page_ids().is_empty());
        req.page = u64::MAX;
        assert!(req.page_ids().is_empty());
    }

    #[tokio::test]
    async fn first_page_of_two_with_missing_counts_zero_filled() {
        let index = Arc::new(MockIndex::new());
        let aggregator = LiveAggregator::new(index.clone());
        let mut req = request(&["A", "B"]);
        req.limit = 1;

        let page = aggregator.live_statistics(Scope::Item, &req).await.unwrap();

        assert_eq!(page.total_pages, 2);
        assert_eq!(page.current_page, 0);
        assert_eq!(page.limit, 1);
        assert_eq!(page.statistics, vec![ElementStatistics::new("A", 0, 0)]);
        // one query per metric
        assert_eq!(index.select_count(), 2);
    }

    #[tokio::test]
    async fn unrequested_owners_are_dropped_and_order_follows_request() {
        let index = Arc::new(
            MockIndex::new()
                .with_counts(Metric::Views, "owningComm", &counts(&[("C1", 4), ("C9", 40), ("C2", 1)]))
                .with_counts(Metric::Downloads, "owningComm", &counts(&[("C2", 3), ("C9", 12)])),
        );
        let aggregator = LiveAggregator::new(index);

        let page = aggregator
            .live_statistics(Scope::Community, &request(&["C2", "C1", "C3"]))
            .await
            .unwrap();

        assert_eq!(
            page.statistics,
            vec![
                ElementStatistics::new("C2", 1, 3),
                ElementStatistics::new("C1", 4, 0),
                ElementStatistics::new("C3", 0, 0),
            ]
        );
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn query_carries_filters_range_and_shards() {
        let index = Arc::new(MockIndex::new().with_cores(&["statistics", "statistics-2019"]));
        let aggregator = LiveAggregator::new(index.clone());
        let mut req = request(&["a-b"]);
        req.date_from = Some("2019-01-01T00:00:00Z".to_string());

        aggregator.live_statistics(Scope::Item, &req).await.unwrap();

        let requests = index.requests();
        let views = &requests[0];
        assert_eq!(views.get("q"), Some(r"id:(a\-b)"));
        assert_eq!(
            views.get("fq"),
            Some("type:2 AND -isBot:true AND statistics_type:view AND time:[2019-01-01T00:00:00Z TO *]")
        );
        assert_eq!(views.get("facet.limit"), Some("-1"));
        assert_eq!(
            views.get("shards"),
            Some("http://mock/solr/statistics,http://mock/solr/statistics-2019")
        );
        assert!(!views.contains("facet.pivot"));

        let downloads = &requests[1];
        assert_eq!(downloads.get("q"), Some(r"owningItem:(a\-b)"));
        assert!(downloads.get("fq").unwrap().contains("bundleName:ORIGINAL"));
    }

    #[tokio::test]
    async fn page_past_the_end_skips_solr() {
        let index = Arc::new(MockIndex::new());
        let aggregator = LiveAggregator::new(index.clone());
        let mut req = request(&["A", "B"]);
        req.page = 5;

        let page = aggregator.live_statistics(Scope::Item, &req).await.unwrap();

        assert!(page.statistics.is_empty());
        assert_eq!(page.total_pages, 1);
        assert_eq!(index.select_count(), 0);
    }

    #[tokio::test]
    async fn country_breakdown_is_sorted_and_restricted() {
        let index = Arc::new(
            MockIndex::new()
                .with_counts(Metric::Views, "id", &counts(&[("A", 5)]))
                .with_pivot(Metric::Views, "id", &[("A", "US", 2), ("A", "KE", 3), ("Z", "DE", 9)])
                .with_pivot(Metric::Downloads, "owningItem", &[("A", "US", 1)]),
        );
        let aggregator = LiveAggregator::new(index.clone());
        let mut req = request(&["A", "B"]);
        req.countries = true;

        let page = aggregator.live_statistics(Scope::Item, &req).await.unwrap();

        let a = &page.statistics[0];
        assert_eq!(
            a.countries.as_deref().unwrap(),
            [
                CountryStatistics { code: "KE".into(), views: 3, downloads: 0 },
                CountryStatistics { code: "US".into(), views: 2, downloads: 1 },
            ]
        );
        assert_eq!(page.statistics[1].countries.as_deref(), Some(&[][..]));
        assert_eq!(index.requests()[0].get("facet.pivot"), Some("id,countryCode"));
    }

    #[tokio::test]
    async fn monthly_totals_merge_both_metrics() {
        let index = Arc::new(
            MockIndex::new()
                .with_months(Metric::Views, &[("2020-01-01T00:00:00Z", 7), ("2020-02-01T00:00:00Z", 0)])
                .with_months(Metric::Downloads, &[("2020-02-01T00:00:00Z", 2)]),
        );
        let aggregator = LiveAggregator::new(index.clone());
        let mut req = request(&["A"]);
        req.monthly = true;

        let page = aggregator.live_statistics(Scope::Item, &req).await.unwrap();

        assert_eq!(
            page.months.unwrap(),
            vec![
                MonthStatistics { month: "2020-01".into(), views: 7, downloads: 0 },
                MonthStatistics { month: "2020-02".into(), views: 0, downloads: 2 },
            ]
        );
        let views = &index.requests()[0];
        assert_eq!(views.get("facet.range"), Some("time"));
        assert_eq!(views.get("facet.range.start"), Some("NOW/MONTH-11MONTHS"));
        assert_eq!(views.get("facet.range.end"), Some("NOW/MONTH+1MONTH"));
    }

    #[tokio::test]
    async fn duplicate_ids_yield_one_entry() {
        let index = Arc::new(
            MockIndex::new().with_counts(Metric::Views, "id", &counts(&[("A", 2)])),
        );
        let aggregator = LiveAggregator::new(index);

        let page = aggregator
            .live_statistics(Scope::Item, &request(&["A", "A", "B"]))
            .await
            .unwrap();

        assert_eq!(
            page.statistics,
            vec![ElementStatistics::new("A", 2, 0), ElementStatistics::new("B", 0, 0)]
        );
        assert_eq!(page.total_pages, 1);
    }

    #[tokio::test]
    async fn empty_id_is_rejected_before_querying() {
        let index = Arc::new(MockIndex::new());
        let aggregator = LiveAggregator::new(index.clone());

        let result = aggregator.live_statistics(Scope::Item, &request(&["A", " "])).await;

        assert!(matches!(
            result,
            Err(dspace_statistics_common::StatisticsError::InvalidInput(_))
        ));
        assert_eq!(index.select_count(), 0);
    }

    #[tokio::test]
    async fn monthly_range_with_only_a_past_end_is_derived_from_it() {
        let index = Arc::new(MockIndex::new());
        let aggregator = LiveAggregator::new(index.clone());
        let mut req = request(&["A"]);
        req.monthly = true;
        req.date_to = Some("2019-01-01T00:00:00Z".to_string());

        aggregator.live_statistics(Scope::Item, &req).await.unwrap();

        let views = &index.requests()[0];
        assert_eq!(
            views.get("facet.range.start"),
            Some("2019-01-01T00:00:00Z-12MONTHS")
        );
        assert_eq!(views.get("facet.range.end"), Some("2019-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn upstream_failure_is_an_error() {
        let aggregator = LiveAggregator::new(Arc::new(MockIndex::new().failing_selects()));
        let result = aggregator.live_statistics(Scope::Item, &request(&["A"])).await;

        assert!(matches!(result, Err(dspace_statistics_common::StatisticsError::Upstream(_))));
    }
}
