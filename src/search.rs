use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use log::debug;

use crate::matcher::{FuzzyMatcher, fuzzy_matches};
use crate::model::{Entry, SortMode, Tab};
use crate::store::CatalogStore;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    tab: Tab,
    filter: String,
    version: u64,
}

/// Insertion-ordered memo of filtered results.
struct ResultCache {
    capacity: usize,
    order: VecDeque<CacheKey>,
    entries: HashMap<CacheKey, Arc<Vec<Entry>>>,
}

impl ResultCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<Vec<Entry>>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: CacheKey, items: Arc<Vec<Entry>>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), items).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else { break };
            self.entries.remove(&oldest);
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

pub struct SearchEngine {
    threshold: f64,
    cache: ResultCache,
    matcher: FuzzyMatcher,
}

impl SearchEngine {
    pub fn new(threshold: f64, cache_capacity: usize) -> Self {
        Self {
            threshold,
            cache: ResultCache::new(cache_capacity),
            matcher: FuzzyMatcher::new(),
        }
    }

    pub fn cached_results(&self) -> usize {
        self.cache.len()
    }

    /// Filters a tab by `filter_text` and orders it by `sort`.
    pub fn query(&mut self, store: &CatalogStore, tab: Tab, filter_text: &str, sort: SortMode) -> Vec<Entry> {
        let key = CacheKey {
            tab,
            filter: filter_text.to_lowercase(),
            version: store.version(tab),
        };

        let filtered = match self.cache.get(&key) {
            Some(hit) => hit,
            None => {
                let items: Vec<Entry> = store
                    .entries(tab)
                    .into_iter()
                    .filter(|e| fuzzy_matches(&key.filter, &e.name, self.threshold))
                    .collect();
                debug!("search: tab={:?} filter='{}' matched={}", tab, key.filter, items.len());
                let items = Arc::new(items);
                self.cache.insert(key, Arc::clone(&items));
                items
            }
        };

        let mut results = filtered.as_ref().clone();
        sort_entries(&mut results, tab, sort, store.recent());
        results
    }

    /// Completion candidates across every collection, best match first.
    pub fn suggest(&mut self, store: &CatalogStore, prefix: &str, limit: usize) -> Vec<String> {
        let catalog = store.catalog();
        let mut seen = HashSet::new();
        let names: Vec<&str> = catalog
            .values()
            .flat_map(|apps| apps.keys().map(String::as_str))
            .chain(store.links().iter().map(|e| e.name.as_str()))
            .chain(store.recent().iter().map(|e| e.name.as_str()))
            .chain(store.pinned().iter().map(|e| e.name.as_str()))
            .filter(|name| seen.insert(*name))
            .collect();

        self.matcher
            .rank(prefix, names)
            .into_iter()
            .take(limit)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

fn last_used<'a>(entry: &'a Entry, recent: &'a [Entry]) -> &'a str {
    recent
        .iter()
        .find(|r| r.kind == entry.kind && r.name == entry.name)
        .and_then(|r| r.timestamp.as_deref())
        .or(entry.timestamp.as_deref())
        .unwrap_or("")
}

pub fn sort_entries(entries: &mut [Entry], tab: Tab, sort: SortMode, recent: &[Entry]) {
    match sort {
        SortMode::Category => entries.sort_by(|a, b| (&a.category, &a.name).cmp(&(&b.category, &b.name))),
        SortMode::LastUsed if tab.tracks_usage() => {
            entries.sort_by(|a, b| last_used(b, recent).cmp(last_used(a, recent)))
        }
        _ => entries.sort_by(|a, b| (&a.name, a.kind).cmp(&(&b.name, b.kind))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::partial_ratio;
    use crate::model::{Catalog, DEFAULT_CATEGORY, EntryKind};
    use crate::sources::history::JsonStore;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn store_with_apps(names: &[(&str, &str)]) -> (TempDir, CatalogStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = CatalogStore::open(JsonStore::new(dir.path()), 50);
        let mut catalog = Catalog::new();
        for (category, name) in names {
            catalog
                .entry(category.to_string())
                .or_default()
                .insert(name.to_string(), PathBuf::from(format!("/menu/{name}.lnk")));
        }
        store.apply_scan(1, catalog);
        (dir, store)
    }

    #[test]
    fn empty_filter_returns_everything_in_sort_order() {
        let (_dir, store) = store_with_apps(&[("Office", "Word"), ("Accessories", "Paint"), ("Accessories", "Calculator")]);
        let mut engine = SearchEngine::new(90.0, 100);

        let by_name: Vec<_> = engine.query(&store, Tab::Apps, "", SortMode::Name).into_iter().map(|e| e.name).collect();
        assert_eq!(by_name, ["Calculator", "Paint", "Word"]);

        let by_category: Vec<_> = engine
            .query(&store, Tab::Apps, "", SortMode::Category)
            .into_iter()
            .map(|e| e.category)
            .collect();
        assert_eq!(by_category, ["Accessories", "Accessories", "Office"]);
    }

    #[test]
    fn filtered_results_are_a_subset_above_threshold() {
        let (_dir, store) = store_with_apps(&[
            ("General", "Notepad"),
            ("General", "Notepad++"),
            ("General", "Paint"),
            ("Games", "Solitaire"),
        ]);
        let mut engine = SearchEngine::new(90.0, 100);
        let all = engine.query(&store, Tab::Apps, "", SortMode::Name);
        let hits = engine.query(&store, Tab::Apps, "NotePad", SortMode::Name);

        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!(all.contains(hit));
            assert!(partial_ratio("notepad", &hit.name.to_lowercase()) > 90.0);
        }
    }

    #[test]
    fn zero_matches_is_empty_not_error() {
        let (_dir, store) = store_with_apps(&[("General", "Paint")]);
        let mut engine = SearchEngine::new(90.0, 100);
        assert!(engine.query(&store, Tab::Apps, "zzzz", SortMode::Name).is_empty());
    }

    #[test]
    fn category_edit_is_visible_through_the_cache() {
        let (_dir, mut store) = store_with_apps(&[]);
        let mut engine = SearchEngine::new(90.0, 100);

        let before = engine.query(&store, Tab::Links, "exam", SortMode::Category);
        assert_eq!(before[0].category, DEFAULT_CATEGORY);

        store.set_link_category("Example", "Reference").unwrap();
        let after = engine.query(&store, Tab::Links, "exam", SortMode::Category);
        assert_eq!(after[0].category, "Reference");
        let unfiltered = engine.query(&store, Tab::Links, "", SortMode::Name);
        assert_eq!(unfiltered[0].category, "Reference");
    }

    #[test]
    fn cache_evicts_oldest_beyond_capacity() {
        let (_dir, store) = store_with_apps(&[("General", "Paint")]);
        let mut engine = SearchEngine::new(90.0, 3);
        for filter in ["a", "b", "c", "d", "e"] {
            engine.query(&store, Tab::Apps, filter, SortMode::Name);
        }
        assert_eq!(engine.cached_results(), 3);
        // repeated keys do not grow the cache
        engine.query(&store, Tab::Apps, "E", SortMode::Name);
        assert_eq!(engine.cached_results(), 3);
    }

    #[test]
    fn last_used_orders_recent_descending_with_missing_last() {
        let (_dir, mut store) = store_with_apps(&[]);
        let app = |name: &str| Entry::new(name, "/x", DEFAULT_CATEGORY, EntryKind::App);
        store.record_recent(&app("Older"), "2024-01-01T10:00:00".into()).unwrap();
        store.record_recent(&app("Newer"), "2024-03-01T10:00:00".into()).unwrap();
        store.pin(&app("NeverRun")).unwrap();
        store.pin(&app("Older")).unwrap();
        store.pin(&app("Newer")).unwrap();

        let mut engine = SearchEngine::new(90.0, 100);
        let pinned: Vec<_> = engine
            .query(&store, Tab::Pinned, "", SortMode::LastUsed)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(pinned, ["Newer", "Older", "NeverRun"]);
    }

    #[test]
    fn last_used_on_apps_falls_back_to_name() {
        let (_dir, store) = store_with_apps(&[("B", "Zip"), ("A", "Arc")]);
        let mut engine = SearchEngine::new(90.0, 100);
        let names: Vec<_> = engine
            .query(&store, Tab::Apps, "", SortMode::LastUsed)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["Arc", "Zip"]);
    }

    #[test]
    fn suggestions_are_deduplicated_across_collections() {
        let (_dir, mut store) = store_with_apps(&[("General", "Firefox")]);
        let firefox = Entry::new("Firefox", "/menu/Firefox.lnk", "General", EntryKind::App);
        store.record_recent(&firefox, "t1".into()).unwrap();
        store.pin(&firefox).unwrap();

        let mut engine = SearchEngine::new(90.0, 100);
        assert_eq!(engine.suggest(&store, "fire", 10), ["Firefox"]);
    }
}
