use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StatisticsError;

// --- Scope ---

/// Which kind of DSpace object a statistics request concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Item,
    Community,
    Collection,
}

impl Scope {
    pub const ALL: [Scope; 3] = [Scope::Item, Scope::Community, Scope::Collection];

    /// Persisted table holding this scope's statistics.
    pub fn table(self) -> &'static str {
        match self {
            Scope::Item => "items",
            Scope::Community => "communities",
            Scope::Collection => "collections",
        }
    }

    /// Solr field faceted to count `metric` for this scope.
    ///
    /// Container scopes facet the owning-container field for both metrics;
    /// that field is multi-valued, so facets can contain containers that were
    /// never asked for.
    pub fn facet_field(self, metric: Metric) -> &'static str {
        match (self, metric) {
            (Scope::Item, Metric::Views) => "id",
            (Scope::Item, Metric::Downloads) => "owningItem",
            (Scope::Community, _) => "owningComm",
            (Scope::Collection, _) => "owningColl",
        }
    }

    pub fn singular(self) -> &'static str {
        match self {
            Scope::Item => "item",
            Scope::Community => "community",
            Scope::Collection => "collection",
        }
    }

    pub fn plural(self) -> &'static str {
        self.table()
    }

    /// Key of the id list in a POSTed request body.
    pub fn body_key(self) -> &'static str {
        self.plural()
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.plural())
    }
}

impl FromStr for Scope {
    type Err = StatisticsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "item" | "items" => Ok(Scope::Item),
            "community" | "communities" => Ok(Scope::Community),
            "collection" | "collections" => Ok(Scope::Collection),
            other => Err(StatisticsError::InvalidInput(format!(
                "unknown scope {other:?}, expected items, communities or collections"
            ))),
        }
    }
}

// --- Metric ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Views,
    Downloads,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Views, Metric::Downloads];

    /// Column written by the upserter.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Views => "views",
            Metric::Downloads => "downloads",
        }
    }

    /// Main query selecting the usage event type: 2 = object view, 0 = bitstream.
    pub fn query(self) -> &'static str {
        match self {
            Metric::Views => "type:2",
            Metric::Downloads => "type:0",
        }
    }

    /// Filter excluding bots; downloads only count the ORIGINAL bundle.
    pub fn filter(self) -> &'static str {
        match self {
            Metric::Views => "-isBot:true AND statistics_type:view",
            Metric::Downloads => "-isBot:true AND statistics_type:view AND bundleName:ORIGINAL",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

// --- Response types ---

/// Statistics for one object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementStatistics {
    pub id: String,
    pub views: u64,
    pub downloads: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countries: Option<Vec<CountryStatistics>>,
}

impl ElementStatistics {
    pub fn new(id: impl Into<String>, views: u64, downloads: u64) -> Self {
        Self {
            id: id.into(),
            views,
            downloads,
            countries: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryStatistics {
    pub code: String,
    pub views: u64,
    pub downloads: u64,
}

/// Totals for all requested objects in one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthStatistics {
    pub month: String,
    pub views: u64,
    pub downloads: u64,
}

/// Paginated envelope shared by the table-backed and live endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsPage {
    pub current_page: u64,
    pub total_pages: u64,
    pub limit: u64,
    pub statistics: Vec<ElementStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<MonthStatistics>>,
}

/// Ceiling division for page counts. A zero limit has no pages.
pub fn total_pages(total: u64, limit: u64) -> u64 {
    if limit == 0 {
        return 0;
    }
    total.div_ceil(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_lookup_table() {
        assert_eq!(Scope::Item.table(), "items");
        assert_eq!(Scope::Item.facet_field(Metric::Views), "id");
        assert_eq!(Scope::Item.facet_field(Metric::Downloads), "owningItem");
        assert_eq!(Scope::Community.facet_field(Metric::Views), "owningComm");
        assert_eq!(Scope::Community.facet_field(Metric::Downloads), "owningComm");
        assert_eq!(Scope::Collection.facet_field(Metric::Downloads), "owningColl");
        assert_eq!(Scope::Collection.singular(), "collection");
        assert_eq!(Scope::Community.body_key(), "communities");
    }

    #[test]
    fn scope_parses_singular_and_plural() {
        assert_eq!("item".parse::<Scope>().unwrap(), Scope::Item);
        assert_eq!("Communities".parse::<Scope>().unwrap(), Scope::Community);
        assert!("bitstreams".parse::<Scope>().is_err());
    }

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(0, 100), 0);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(100, 100), 1);
        assert_eq!(total_pages(101, 100), 2);
        assert_eq!(total_pages(2, 1), 2);
        assert_eq!(total_pages(5, 0), 0);
    }

    #[test]
    fn page_serializes_camel_case_without_empty_breakdowns() {
        let page = StatisticsPage {
            current_page: 0,
            total_pages: 1,
            limit: 100,
            statistics: vec![ElementStatistics::new("a", 1, 2)],
            months: None,
        };
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["currentPage"], 0);
        assert_eq!(json["totalPages"], 1);
        assert!(json.get("months").is_none());
        assert!(json["statistics"][0].get("countries").is_none());
    }
}
