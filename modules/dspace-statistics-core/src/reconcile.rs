use std::collections::HashMap;

/// Map every requested id to its facet count, defaulting to zero.
///
/// Solr only returns facet values with at least one match, so ids without
/// events have to be filled in here. The owning-container fields are
/// multi-valued: a query for community A also matches documents that belong
/// to communities B and C, and the facet then counts B and C too. Those
/// values were never requested and are dropped.
pub fn reconcile<S: AsRef<str>>(
    requested: &[S],
    facet: &HashMap<String, u64>,
) -> HashMap<String, u64> {
    requested
        .iter()
        .map(|id| {
            let id = id.as_ref();
            (id.to_string(), facet.get(id).copied().unwrap_or(0))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn facet(pairs: &[(&str, u64)]) -> HashMap<String, u64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn missing_ids_default_to_zero() {
        let requested = ["a", "b", "c"];
        let result = reconcile(&requested, &facet(&[("a", 4), ("c", 1)]));

        assert_eq!(result.len(), requested.len());
        assert_eq!(result["a"], 4);
        assert_eq!(result["b"], 0);
        assert_eq!(result["c"], 1);
    }

    #[test]
    fn unrequested_facet_values_are_dropped() {
        let requested = vec!["comm-1".to_string()];
        let result = reconcile(&requested, &facet(&[("comm-1", 9), ("comm-2", 3), ("comm-3", 1)]));

        assert_eq!(result.len(), 1);
        assert_eq!(result["comm-1"], 9);
        assert!(!result.contains_key("comm-2"));
    }

    #[test]
    fn keys_match_requested_set_exactly() {
        let requested = ["x", "y", "z", "w"];
        let result = reconcile(&requested, &facet(&[("y", 2), ("extra", 5)]));

        let mut keys: Vec<&str> = result.keys().map(String::as_str).collect();
        keys.sort();
        assert_eq!(keys, vec!["w", "x", "y", "z"]);
    }

    #[test]
    fn empty_facet_gives_all_zeros() {
        let result = reconcile(&["a", "b"], &HashMap::new());
        assert!(result.values().all(|n| *n == 0));
        assert_eq!(result.len(), 2);
    }
}
