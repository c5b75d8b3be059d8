//! Materializes Solr view/download counts into the per-scope tables.

use std::fmt;
use std::sync::Arc;

use futures::{pin_mut, TryStreamExt};
use tracing::{error, info};

use dspace_statistics_common::{Metric, Result, Scope};

use crate::facets::{paginate, FacetQuery};
use crate::shards::{resolve_shards, ShardDiscovery, ShardList};
use crate::traits::{StatisticsIndex, StatisticsStore};

/// Facet values requested per page.
pub const DEFAULT_PAGE_SIZE: u64 = 100;

/// Counters for one scope/metric pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricSyncStats {
    pub scope: Scope,
    pub metric: Metric,
    pub pages: u64,
    pub rows_written: u64,
    pub rows_skipped: u64,
}

/// Stats from an indexer run.
#[derive(Debug, Default)]
pub struct SyncStats {
    pub shards: usize,
    pub discovery_degraded: bool,
    pub metrics: Vec<MetricSyncStats>,
}

impl SyncStats {
    pub fn for_metric(&self, scope: Scope, metric: Metric) -> Option<&MetricSyncStats> {
        self.metrics
            .iter()
            .find(|m| m.scope == scope && m.metric == metric)
    }

    pub fn rows_written(&self) -> u64 {
        self.metrics.iter().map(|m| m.rows_written).sum()
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Indexer Run Complete ===")?;
        if self.discovery_degraded {
            writeln!(f, "Shards:   discovery failed, default core only")?;
        } else {
            writeln!(f, "Shards:   {}", self.shards)?;
        }
        for m in &self.metrics {
            writeln!(
                f,
                "{:<12} {:<10} pages: {:<6} written: {:<8} skipped: {}",
                m.scope.to_string(),
                m.metric.to_string(),
                m.pages,
                m.rows_written,
                m.rows_skipped
            )?;
        }
        write!(f, "Total rows written: {}", self.rows_written())
    }
}

/// Drives a full sync: shard discovery once, then views and downloads for
/// each requested scope, one facet page and one transaction at a time.
pub struct Indexer {
    index: Arc<dyn StatisticsIndex>,
    store: Arc<dyn StatisticsStore>,
    page_size: u64,
}

impl Indexer {
    pub fn new(index: Arc<dyn StatisticsIndex>, store: Arc<dyn StatisticsStore>) -> Self {
        Self {
            index,
            store,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u64) -> Self {
        self.page_size = page_size;
        self
    }

    /// Sync `scopes` in order. Any failed page aborts the whole run; pages
    /// already committed stay committed.
    pub async fn run(&self, scopes: &[Scope]) -> Result<SyncStats> {
        let discovery = resolve_shards(self.index.as_ref()).await;
        let shards = discovery.shard_list();

        let mut stats = SyncStats {
            shards: shards.urls().len(),
            discovery_degraded: matches!(discovery, ShardDiscovery::Degraded(_)),
            metrics: Vec::new(),
        };

        for &scope in scopes {
            self.sync_scope(scope, &shards, &mut stats).await?;
        }

        Ok(stats)
    }

    /// Views then downloads for one scope, creating its table first.
    pub async fn sync_scope(
        &self,
        scope: Scope,
        shards: &ShardList,
        stats: &mut SyncStats,
    ) -> Result<()> {
        self.store.ensure_table(scope).await?;

        for metric in Metric::ALL {
            let metric_stats = self.sync_metric(scope, metric, shards).await?;
            stats.metrics.push(metric_stats);
        }
        Ok(())
    }

    async fn sync_metric(
        &self,
        scope: Scope,
        metric: Metric,
        shards: &ShardList,
    ) -> Result<MetricSyncStats> {
        let query = FacetQuery::for_metric(scope, metric, shards.clone());
        let mut metric_stats = MetricSyncStats {
            scope,
            metric,
            pages: 0,
            rows_written: 0,
            rows_skipped: 0,
        };

        let pages = paginate(self.index.as_ref(), &query, self.page_size);
        pin_mut!(pages);

        while let Some(page) = pages.try_next().await.inspect_err(|e| {
            error!(scope = %scope, metric = %metric, error = %e, "Failed to read facet page");
        })? {
            metric_stats.pages += 1;
            info!(
                scope = %scope,
                metric = %metric,
                page = page.page,
                values = page.counts.len(),
                "Indexing page"
            );
            if page.is_empty() {
                continue;
            }

            let outcome = self
                .store
                .upsert_batch(scope, metric, &page.rows())
                .await
                .inspect_err(|e| {
                    error!(scope = %scope, metric = %metric, page = page.page, error = %e, "Batch upsert failed");
                })?;
            metric_stats.rows_written += outcome.written as u64;
            metric_stats.rows_skipped += outcome.skipped as u64;
        }

        if metric_stats.pages == 0 {
            info!(scope = %scope, metric = %metric, "Nothing recorded yet, skipping");
        }

        Ok(metric_stats)
    }
}
