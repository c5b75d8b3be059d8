//! Discovery of yearly statistics cores.
//!
//! DSpace's `stats-util -s` splits old statistics into cores named
//! `statistics-YYYY`. Queries must then be federated over the default core
//! plus every yearly core via the `shards` parameter.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::traits::StatisticsIndex;

/// The canonical, unsharded statistics core.
pub const DEFAULT_CORE: &str = "statistics";

static YEARLY_CORE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^statistics-[0-9]{4}$").expect("valid regex"));

/// Core URLs to federate a query over. Empty means "query the default core only".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShardList {
    urls: Vec<String>,
}

impl ShardList {
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Value for the `shards` parameter, or `None` when the parameter must be
    /// omitted altogether.
    pub fn param(&self) -> Option<String> {
        if self.urls.is_empty() {
            None
        } else {
            Some(self.urls.join(","))
        }
    }
}

/// Outcome of a shard discovery round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardDiscovery {
    /// Yearly cores exist; the list starts with the default core.
    Sharded(ShardList),
    /// The status call worked but no yearly cores are loaded.
    Unsharded,
    /// The status call failed; queries fall back to the default core.
    Degraded(String),
}

impl ShardDiscovery {
    pub fn shard_list(&self) -> ShardList {
        match self {
            ShardDiscovery::Sharded(list) => list.clone(),
            ShardDiscovery::Unsharded | ShardDiscovery::Degraded(_) => ShardList::default(),
        }
    }
}

/// Build the shard list from a set of core names. Yearly cores are sorted so
/// the resulting parameter is stable.
pub fn shards_from_cores(index: &dyn StatisticsIndex, cores: &[String]) -> ShardList {
    let mut yearly: Vec<&String> = cores.iter().filter(|c| YEARLY_CORE.is_match(c)).collect();
    if yearly.is_empty() {
        return ShardList::default();
    }
    yearly.sort();

    let mut urls = Vec::with_capacity(yearly.len() + 1);
    urls.push(index.core_url(DEFAULT_CORE));
    urls.extend(yearly.into_iter().map(|core| index.core_url(core)));
    ShardList { urls }
}

/// Ask Solr which cores are loaded and derive the shard list.
///
/// Never fails: an unreachable admin endpoint degrades to the default core.
pub async fn resolve_shards(index: &dyn StatisticsIndex) -> ShardDiscovery {
    let cores = match index.core_names().await {
        Ok(cores) => cores,
        Err(e) => {
            warn!(error = %e, "Core status unavailable, querying the default statistics core only");
            return ShardDiscovery::Degraded(e.to_string());
        }
    };

    let list = shards_from_cores(index, &cores);
    if list.is_empty() {
        debug!(cores = cores.len(), "No yearly statistics cores found");
        ShardDiscovery::Unsharded
    } else {
        debug!(shards = list.urls().len(), "Federating over yearly statistics cores");
        ShardDiscovery::Sharded(list)
    }
}
