use std::collections::HashMap;

use super::catalog::CatalogListing;

pub const MAX_SUGGESTIONS: usize = 10;

/// Name to id lookup built from the catalog listing.
///
/// Populated once per process; entries outside the current binder are kept and
/// filtered at query time, so regenerating with more slots needs no refetch.
#[derive(Debug, Default)]
pub struct NameIndex {
    by_name: HashMap<String, u32>,
    ordered: Vec<(String, u32)>,
    total_available: u32,
}

impl NameIndex {
    /// Returns `false` if the index was already populated.
    pub fn populate(&mut self, listing: CatalogListing) -> bool {
        if !self.is_empty() {
            return false;
        }

        self.total_available = listing.count;
        for entry in listing.entries {
            let name = entry.name.to_lowercase();
            if self.by_name.insert(name.clone(), entry.id).is_none() {
                self.ordered.push((name, entry.id));
            }
        }
        true
    }

    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.by_name.get(&name.trim().to_lowercase()).copied()
    }

    /// Names starting with `prefix` whose id fits in a binder of `bound` slots,
    /// in catalog order.
    pub fn suggest(&self, prefix: &str, bound: u32, limit: usize) -> Vec<&str> {
        let prefix = prefix.trim().to_lowercase();
        if prefix.is_empty() {
            return Vec::new();
        }

        self.ordered
            .iter()
            .filter(|(name, id)| *id <= bound && name.starts_with(&prefix))
            .map(|(name, _)| name.as_str())
            .take(limit)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn total_available(&self) -> u32 {
        self.total_available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::catalog::CatalogEntry;

    fn listing(names: &[(&str, u32)]) -> CatalogListing {
        CatalogListing {
            count: names.len() as u32,
            entries: names
                .iter()
                .map(|(name, id)| CatalogEntry {
                    name: name.to_string(),
                    id: *id,
                })
                .collect(),
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut index = NameIndex::default();
        index.populate(listing(&[("pikachu", 25), ("raichu", 26)]));

        assert_eq!(index.lookup("Pikachu"), Some(25));
        assert_eq!(index.lookup("  RAICHU "), Some(26));
        assert_eq!(index.lookup("mew"), None);
    }

    #[test]
    fn test_populate_only_once() {
        let mut index = NameIndex::default();
        assert!(index.populate(listing(&[("bulbasaur", 1)])));
        assert!(!index.populate(listing(&[("ivysaur", 2)])));

        assert_eq!(index.len(), 1);
        assert_eq!(index.lookup("ivysaur"), None);
    }

    #[test]
    fn test_suggest_filters_by_bound_and_keeps_order() {
        let mut index = NameIndex::default();
        index.populate(listing(&[
            ("charmander", 4),
            ("charmeleon", 5),
            ("charizard", 6),
            ("chansey", 113),
        ]));

        assert_eq!(
            index.suggest("Char", 5, MAX_SUGGESTIONS),
            vec!["charmander", "charmeleon"]
        );
        assert_eq!(index.suggest("ch", 200, 3).len(), 3);
        assert!(index.suggest("", 200, MAX_SUGGESTIONS).is_empty());
    }
}
