// Trait seams for the two external systems.
//
// StatisticsIndex: the Solr statistics core(s), read-only.
// StatisticsStore: the Postgres tables the indexer materializes into.
//
// Both have in-memory doubles in `testing` so the pipeline can be exercised
// without Solr, Postgres or Docker.

use async_trait::async_trait;
use uuid::Uuid;

use dspace_statistics_common::{ElementStatistics, Metric, Result, Scope};
use solr_client::{SelectParams, SelectResponse, SolrClient};

// ---------------------------------------------------------------------------
// StatisticsIndex
// ---------------------------------------------------------------------------

#[async_trait]
pub trait StatisticsIndex: Send + Sync {
    /// Names of all cores currently loaded.
    async fn core_names(&self) -> Result<Vec<String>>;

    /// Run a select query against one core.
    async fn select(&self, core: &str, params: &SelectParams) -> Result<SelectResponse>;

    /// Address of a core as it must appear in the `shards` parameter.
    fn core_url(&self, core: &str) -> String;
}

#[async_trait]
impl StatisticsIndex for SolrClient {
    async fn core_names(&self) -> Result<Vec<String>> {
        Ok(SolrClient::core_names(self).await?)
    }

    async fn select(&self, core: &str, params: &SelectParams) -> Result<SelectResponse> {
        Ok(SolrClient::select(self, core, params).await?)
    }

    fn core_url(&self, core: &str) -> String {
        SolrClient::core_url(self, core)
    }
}

// ---------------------------------------------------------------------------
// StatisticsStore
// ---------------------------------------------------------------------------

/// Result of one batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub written: usize,
    /// Facet values that were not valid object ids.
    pub skipped: usize,
}

#[async_trait]
pub trait StatisticsStore: Send + Sync {
    /// Create the scope's table if it does not exist yet.
    async fn ensure_table(&self, scope: Scope) -> Result<()>;

    /// Insert-or-update one metric column for a page of `(id, count)` rows,
    /// atomically. The other metric column of existing rows is untouched.
    async fn upsert_batch(
        &self,
        scope: Scope,
        metric: Metric,
        rows: &[(String, u64)],
    ) -> Result<UpsertOutcome>;

    async fn get(&self, scope: Scope, id: Uuid) -> Result<Option<ElementStatistics>>;

    /// Number of rows in the scope's table.
    async fn count(&self, scope: Scope) -> Result<u64>;

    /// Rows ordered by id.
    async fn list(&self, scope: Scope, limit: u64, offset: u64) -> Result<Vec<ElementStatistics>>;
}
