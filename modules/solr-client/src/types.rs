use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

// --- Query parameters ---

/// Ordered list of `select` parameters. Solr accepts repeated keys
/// (e.g. several `fq`), so this is a list rather than a map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectParams {
    pairs: Vec<(String, String)>,
}

impl SelectParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.pairs.push((key.to_string(), value.to_string()));
        self
    }

    /// Append a parameter only when `value` is present.
    pub fn set_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    /// First value for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }
}

// --- Core admin ---

/// Response of `admin/cores?action=STATUS`. Only the core names are used.
#[derive(Debug, Clone, Deserialize)]
pub struct CoreStatusResponse {
    #[serde(default)]
    pub status: BTreeMap<String, serde_json::Value>,
}

// --- Select ---

/// The parts of a `select` response this crate understands. Documents are
/// never requested (`rows=0`), only facets and stats.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SelectResponse {
    #[serde(default)]
    pub facet_counts: Option<FacetCounts>,
    #[serde(default)]
    pub stats: Option<StatsResult>,
}

/// Facet section, assuming the request used `json.nl=map`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetCounts {
    #[serde(default)]
    pub facet_fields: HashMap<String, HashMap<String, u64>>,
    #[serde(default)]
    pub facet_pivot: HashMap<String, Vec<PivotEntry>>,
    #[serde(default)]
    pub facet_ranges: HashMap<String, FacetRange>,
}

/// One node of a pivot facet tree.
#[derive(Debug, Clone, Deserialize)]
pub struct PivotEntry {
    pub field: String,
    pub value: serde_json::Value,
    pub count: u64,
    #[serde(default)]
    pub pivot: Vec<PivotEntry>,
}

impl PivotEntry {
    /// Pivot values may be strings or numbers depending on the field type.
    pub fn value_string(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A range facet. With `json.nl=map` the buckets are a `start -> count` map.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacetRange {
    #[serde(default)]
    pub counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub gap: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatsResult {
    /// Kept loosely typed: a field with no matching documents comes back as
    /// `null`, and min/max vary in type with the field.
    #[serde(default)]
    pub stats_fields: HashMap<String, serde_json::Value>,
}

impl SelectResponse {
    /// `value -> count` for one facet field, if present.
    pub fn facet_field(&self, field: &str) -> Option<&HashMap<String, u64>> {
        self.facet_counts.as_ref()?.facet_fields.get(field)
    }

    /// Pivot tree for a comma-joined pivot key such as `id,countryCode`.
    pub fn facet_pivot(&self, key: &str) -> Option<&[PivotEntry]> {
        self.facet_counts
            .as_ref()?
            .facet_pivot
            .get(key)
            .map(Vec::as_slice)
    }

    pub fn facet_range(&self, field: &str) -> Option<&FacetRange> {
        self.facet_counts.as_ref()?.facet_ranges.get(field)
    }

    /// `countDistinct` from the stats component. `None` when the field had no
    /// documents, stats were not requested, or the value is not a count.
    pub fn count_distinct(&self, field: &str) -> Option<u64> {
        self.stats
            .as_ref()?
            .stats_fields
            .get(field)?
            .get("countDistinct")?
            .as_u64()
    }
}
