//! Statistics aggregation and synchronization for DSpace usage data.
//!
//! Reads faceted view/download counts out of the Solr statistics core(s) and
//! either materializes them into Postgres ([`sync`]) or answers ad-hoc date
//! range queries directly ([`live`]).

pub mod facets;
pub mod live;
pub mod reconcile;
pub mod shards;
pub mod store;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;

pub use facets::{FacetPage, FacetQuery};
pub use live::{build_date_range, LiveAggregator, LiveRequest};
pub use reconcile::reconcile;
pub use shards::{resolve_shards, ShardDiscovery, ShardList};
pub use store::PgStatisticsStore;
pub use sync::{Indexer, SyncStats};
pub use traits::{StatisticsIndex, StatisticsStore, UpsertOutcome};
