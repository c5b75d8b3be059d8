// Test doubles for the two trait boundaries:
// - MockIndex (StatisticsIndex): canned facet counts, records every request
// - MemoryStore (StatisticsStore): in-memory tables keyed by UUID
//
// MockIndex answers the way Solr does for the parameters this crate sends:
// facet windows in index order with mincount 1, `countDistinct` from the
// stats component, pivot trees and monthly range buckets.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use dspace_statistics_common::{ElementStatistics, Metric, Result, Scope, StatisticsError};
use solr_client::{FacetCounts, FacetRange, PivotEntry, SelectParams, SelectResponse, StatsResult};

use crate::shards::DEFAULT_CORE;
use crate::store::prepare_rows;
use crate::traits::{StatisticsIndex, StatisticsStore, UpsertOutcome};

/// Solr's own default when `facet.limit` is not sent.
const SOLR_DEFAULT_FACET_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// MockIndex
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MockIndexLog {
    core_status_calls: usize,
    requests: Vec<SelectParams>,
}

/// Builder pattern: `.with_cores()`, `.with_counts()`, `.with_pivot()`,
/// `.with_months()`, plus `.failing_*()` switches.
pub struct MockIndex {
    cores: Vec<String>,
    core_status_fails: bool,
    selects_fail: bool,
    counts: HashMap<(Metric, String), BTreeMap<String, u64>>,
    reported_distinct: HashMap<(Metric, String), u64>,
    pivots: HashMap<(Metric, String), BTreeMap<String, BTreeMap<String, u64>>>,
    months: HashMap<Metric, BTreeMap<String, u64>>,
    log: Mutex<MockIndexLog>,
}

impl Default for MockIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIndex {
    pub fn new() -> Self {
        Self {
            cores: vec![DEFAULT_CORE.to_string()],
            core_status_fails: false,
            selects_fail: false,
            counts: HashMap::new(),
            reported_distinct: HashMap::new(),
            pivots: HashMap::new(),
            months: HashMap::new(),
            log: Mutex::new(MockIndexLog::default()),
        }
    }

    pub fn with_cores(mut self, cores: &[&str]) -> Self {
        self.cores = cores.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn failing_core_status(mut self) -> Self {
        self.core_status_fails = true;
        self
    }

    pub fn failing_selects(mut self) -> Self {
        self.selects_fail = true;
        self
    }

    /// Facet counts for `field` under `metric`. Values with a zero count are
    /// stored but never returned, like `facet.mincount=1`.
    pub fn with_counts(mut self, metric: Metric, field: &str, counts: &[(String, u64)]) -> Self {
        let entry = self.counts.entry((metric, field.to_string())).or_default();
        for (value, n) in counts {
            entry.insert(value.clone(), *n);
        }
        self
    }

    /// Override the distinct count reported by the stats component.
    pub fn with_reported_distinct(mut self, metric: Metric, field: &str, n: u64) -> Self {
        self.reported_distinct.insert((metric, field.to_string()), n);
        self
    }

    /// `(id, country, count)` rows for a `field,countryCode` pivot.
    pub fn with_pivot(mut self, metric: Metric, field: &str, rows: &[(&str, &str, u64)]) -> Self {
        let tree = self.pivots.entry((metric, field.to_string())).or_default();
        for (id, country, n) in rows {
            tree.entry(id.to_string())
                .or_default()
                .insert(country.to_string(), *n);
        }
        self
    }

    /// Monthly buckets for a `time` range facet, keyed by bucket start.
    pub fn with_months(mut self, metric: Metric, buckets: &[(&str, u64)]) -> Self {
        let entry = self.months.entry(metric).or_default();
        for (start, n) in buckets {
            entry.insert(start.to_string(), *n);
        }
        self
    }

    pub fn select_count(&self) -> usize {
        self.log.lock().unwrap().requests.len()
    }

    pub fn core_status_calls(&self) -> usize {
        self.log.lock().unwrap().core_status_calls
    }

    pub fn requests(&self) -> Vec<SelectParams> {
        self.log.lock().unwrap().requests.clone()
    }

    fn metric_of(params: &SelectParams) -> Metric {
        let downloads = params
            .pairs()
            .iter()
            .any(|(k, v)| (k == "q" || k == "fq") && v.contains(Metric::Downloads.query()));
        if downloads {
            Metric::Downloads
        } else {
            Metric::Views
        }
    }

    fn facet_window(&self, metric: Metric, field: &str, params: &SelectParams) -> HashMap<String, u64> {
        let Some(all) = self.counts.get(&(metric, field.to_string())) else {
            return HashMap::new();
        };
        let offset: usize = params
            .get("facet.offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let limit: i64 = params
            .get("facet.limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(SOLR_DEFAULT_FACET_LIMIT as i64);
        let take = if limit < 0 { usize::MAX } else { limit as usize };

        all.iter()
            .filter(|(_, n)| **n >= 1)
            .skip(offset)
            .take(take)
            .map(|(k, n)| (k.clone(), *n))
            .collect()
    }

    fn distinct(&self, metric: Metric, field: &str) -> Value {
        let key = (metric, field.to_string());
        if let Some(n) = self.reported_distinct.get(&key) {
            return json!({ "countDistinct": n });
        }
        match self.counts.get(&key) {
            Some(all) if all.values().any(|n| *n >= 1) => {
                json!({ "countDistinct": all.values().filter(|n| **n >= 1).count() })
            }
            // Solr reports a field without documents as null.
            _ => Value::Null,
        }
    }

    fn pivot(&self, metric: Metric, field: &str) -> Vec<PivotEntry> {
        let Some(tree) = self.pivots.get(&(metric, field.to_string())) else {
            return Vec::new();
        };
        tree.iter()
            .map(|(id, countries)| PivotEntry {
                field: field.to_string(),
                value: Value::String(id.clone()),
                count: countries.values().sum(),
                pivot: countries
                    .iter()
                    .map(|(code, n)| PivotEntry {
                        field: "countryCode".to_string(),
                        value: Value::String(code.clone()),
                        count: *n,
                        pivot: Vec::new(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[async_trait]
impl StatisticsIndex for MockIndex {
    async fn core_names(&self) -> Result<Vec<String>> {
        self.log.lock().unwrap().core_status_calls += 1;
        if self.core_status_fails {
            return Err(StatisticsError::Upstream(
                "mock core status unavailable".to_string(),
            ));
        }
        Ok(self.cores.clone())
    }

    async fn select(&self, _core: &str, params: &SelectParams) -> Result<SelectResponse> {
        self.log.lock().unwrap().requests.push(params.clone());
        if self.selects_fail {
            return Err(StatisticsError::Upstream("mock select failure".to_string()));
        }

        let metric = Self::metric_of(params);
        let mut facets = FacetCounts::default();

        if let Some(field) = params.get("facet.field") {
            facets
                .facet_fields
                .insert(field.to_string(), self.facet_window(metric, field, params));
        }

        if let Some(key) = params.get("facet.pivot") {
            let field = key.split(',').next().unwrap_or_default();
            facets
                .facet_pivot
                .insert(key.to_string(), self.pivot(metric, field));
        }

        if let Some(field) = params.get("facet.range") {
            facets.facet_ranges.insert(
                field.to_string(),
                FacetRange {
                    counts: self.months.get(&metric).cloned().unwrap_or_default(),
                    gap: params.get("facet.range.gap").map(str::to_string),
                },
            );
        }

        let stats = match (params.get("stats"), params.get("stats.field")) {
            (Some("true"), Some(field)) => {
                let mut stats = StatsResult::default();
                stats
                    .stats_fields
                    .insert(field.to_string(), self.distinct(metric, field));
                Some(stats)
            }
            _ => None,
        };

        Ok(SelectResponse {
            facet_counts: Some(facets),
            stats,
        })
    }

    fn core_url(&self, core: &str) -> String {
        format!("http://mock/solr/{core}")
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory tables. Like Postgres, writes to a table that was never created
/// fail and reads from one come back empty.
pub struct MemoryStore {
    tables: Mutex<HashMap<Scope, BTreeMap<Uuid, (u64, u64)>>>,
    upserts_fail: bool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            upserts_fail: false,
        }
    }

    pub fn failing_upserts(mut self) -> Self {
        self.upserts_fail = true;
        self
    }

    pub fn has_table(&self, scope: Scope) -> bool {
        self.tables.lock().unwrap().contains_key(&scope)
    }

    /// `(views, downloads)` for one id.
    pub fn row(&self, scope: Scope, id: &str) -> Option<(u64, u64)> {
        let id = Uuid::parse_str(id).ok()?;
        self.tables.lock().unwrap().get(&scope)?.get(&id).copied()
    }

    pub fn snapshot(&self, scope: Scope) -> BTreeMap<Uuid, (u64, u64)> {
        self.tables
            .lock()
            .unwrap()
            .get(&scope)
            .cloned()
            .unwrap_or_default()
    }
}

fn to_statistics(id: &Uuid, (views, downloads): (u64, u64)) -> ElementStatistics {
    ElementStatistics::new(id.to_string(), views, downloads)
}

#[async_trait]
impl StatisticsStore for MemoryStore {
    async fn ensure_table(&self, scope: Scope) -> Result<()> {
        self.tables.lock().unwrap().entry(scope).or_default();
        Ok(())
    }

    async fn upsert_batch(
        &self,
        scope: Scope,
        metric: Metric,
        rows: &[(String, u64)],
    ) -> Result<UpsertOutcome> {
        if self.upserts_fail {
            return Err(StatisticsError::Database("mock upsert failure".to_string()));
        }
        let (prepared, skipped) = prepare_rows(scope, rows);

        let mut tables = self.tables.lock().unwrap();
        let table = tables.get_mut(&scope).ok_or_else(|| {
            StatisticsError::Database(format!("relation \"{}\" does not exist", scope.table()))
        })?;
        for (id, n) in &prepared {
            let row = table.entry(*id).or_insert((0, 0));
            match metric {
                Metric::Views => row.0 = *n,
                Metric::Downloads => row.1 = *n,
            }
        }

        Ok(UpsertOutcome {
            written: prepared.len(),
            skipped,
        })
    }

    async fn get(&self, scope: Scope, id: Uuid) -> Result<Option<ElementStatistics>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(&scope)
            .and_then(|t| t.get(&id))
            .map(|row| to_statistics(&id, *row)))
    }

    async fn count(&self, scope: Scope) -> Result<u64> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.get(&scope).map_or(0, |t| t.len() as u64))
    }

    async fn list(&self, scope: Scope, limit: u64, offset: u64) -> Result<Vec<ElementStatistics>> {
        let tables = self.tables.lock().unwrap();
        let Some(table) = tables.get(&scope) else {
            return Ok(Vec::new());
        };
        Ok(table
            .iter()
            .skip(offset as usize)
            .take(limit as usize)
            .map(|(id, row)| to_statistics(id, *row))
            .collect())
    }
}
