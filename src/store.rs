use std::fs;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use log::{debug, error, info};
use regex::Regex;

use crate::error::{LinkError, PersistError};
use crate::model::{Catalog, DEFAULT_CATEGORY, Entry, EntryId, EntryKind, Tab, catalog_entries, catalog_len};
use crate::sources::history::JsonStore;

pub const DROPPED_CATEGORY: &str = "Dropped";

static INTERNET_SHORTCUT_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^URL=(.+)$").expect("URL pattern is valid"));

/// Current local time as an ISO-8601 string with microseconds.
pub fn now_timestamp() -> String {
    chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub apps: usize,
    pub links: usize,
    pub recent: usize,
    pub pinned: usize,
}

/// Owns the scanned catalog and the persisted collections.
///
/// Every mutation bumps the data version of each tab it touches, which is
/// what the search memo keys on.
pub struct CatalogStore {
    catalog: Arc<Catalog>,
    applied_generation: u64,
    links: Vec<Entry>,
    recent: Vec<Entry>,
    pinned: Vec<Entry>,
    versions: [u64; 4],
    recent_limit: usize,
    persistence: JsonStore,
}

impl CatalogStore {
    pub fn open(persistence: JsonStore, recent_limit: usize) -> Self {
        let links = persistence.load_links();
        let recent = persistence.load_recent(recent_limit);
        let pinned = persistence.load_pinned();
        info!(
            "Loaded {} links, {} recent, {} pinned from {:?}",
            links.len(),
            recent.len(),
            pinned.len(),
            persistence.dir()
        );

        Self {
            catalog: Arc::new(Catalog::new()),
            applied_generation: 0,
            links,
            recent,
            pinned,
            versions: [0; 4],
            recent_limit,
            persistence,
        }
    }

    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog)
    }

    pub fn links(&self) -> &[Entry] {
        &self.links
    }

    pub fn recent(&self) -> &[Entry] {
        &self.recent
    }

    pub fn pinned(&self) -> &[Entry] {
        &self.pinned
    }

    pub fn version(&self, tab: Tab) -> u64 {
        self.versions[tab.index()]
    }

    fn touch(&mut self, tab: Tab) {
        self.versions[tab.index()] += 1;
    }

    /// Entries of a tab in collection order (catalog order for Apps).
    pub fn entries(&self, tab: Tab) -> Vec<Entry> {
        match tab {
            Tab::Apps => catalog_entries(&self.catalog),
            Tab::Links => self.links.clone(),
            Tab::Recent => self.recent.clone(),
            Tab::Pinned => self.pinned.clone(),
        }
    }

    pub fn find(&self, tab: Tab, id: &EntryId) -> Option<Entry> {
        match tab {
            Tab::Apps => {
                if id.kind != EntryKind::App {
                    return None;
                }
                self.catalog.iter().find_map(|(category, apps)| {
                    apps.get(&id.name).map(|path| {
                        Entry::new(id.name.clone(), path.to_string_lossy().into_owned(), category.clone(), EntryKind::App)
                    })
                })
            }
            Tab::Links => self.links.iter().find(|e| e.is(id)).cloned(),
            Tab::Recent => self.recent.iter().find(|e| e.is(id)).cloned(),
            Tab::Pinned => self.pinned.iter().find(|e| e.is(id)).cloned(),
        }
    }

    /// Swaps in a finished scan unless a newer one has already been applied.
    pub fn apply_scan(&mut self, generation: u64, catalog: Catalog) -> bool {
        if generation <= self.applied_generation {
            debug!(
                "Discarding scan {} (generation {} already applied)",
                generation, self.applied_generation
            );
            return false;
        }
        info!("Applying scan {}: {} apps", generation, catalog_len(&catalog));
        self.applied_generation = generation;
        self.catalog = Arc::new(catalog);
        self.touch(Tab::Apps);
        true
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            apps: catalog_len(&self.catalog),
            links: self.links.len(),
            recent: self.recent.len(),
            pinned: self.pinned.len(),
        }
    }

    fn is_favorite_elsewhere(&self, id: &EntryId) -> bool {
        self.pinned
            .iter()
            .chain(self.links.iter())
            .any(|e| e.is(id) && e.is_favorite)
    }

    /// Moves `entry` to the front of Recent with the given timestamp.
    pub fn record_recent(&mut self, entry: &Entry, timestamp: String) -> Result<(), PersistError> {
        let id = entry.id();
        let is_favorite = self.is_favorite_elsewhere(&id);

        self.recent.retain(|e| !e.is(&id));
        self.recent.insert(
            0,
            Entry {
                name: entry.name.clone(),
                target: entry.target.clone(),
                category: entry.category.clone(),
                kind: entry.kind,
                is_favorite,
                timestamp: Some(timestamp),
            },
        );
        self.recent.truncate(self.recent_limit);
        self.touch(Tab::Recent);
        self.save_recent()
    }

    pub fn clear_recent(&mut self) -> Result<(), PersistError> {
        self.recent.clear();
        self.touch(Tab::Recent);
        self.save_recent()
    }

    /// Returns false when an entry with the same identity is already pinned.
    pub fn pin(&mut self, entry: &Entry) -> Result<bool, PersistError> {
        let id = entry.id();
        if self.pinned.iter().any(|e| e.is(&id)) {
            return Ok(false);
        }
        self.pinned.push(Entry {
            timestamp: None,
            ..entry.clone()
        });
        self.touch(Tab::Pinned);
        self.save_pinned()?;
        Ok(true)
    }

    pub fn unpin(&mut self, id: &EntryId) -> Result<bool, PersistError> {
        let before = self.pinned.len();
        self.pinned.retain(|e| !e.is(id));
        if self.pinned.len() == before {
            return Ok(false);
        }
        self.touch(Tab::Pinned);
        self.save_pinned()?;
        Ok(true)
    }

    /// Flips the favorite flag; Apps entries carry no flag, so `None` there.
    pub fn toggle_favorite(&mut self, tab: Tab, id: &EntryId) -> Result<Option<bool>, PersistError> {
        let collection = match tab {
            Tab::Apps => return Ok(None),
            Tab::Links => &mut self.links,
            Tab::Recent => &mut self.recent,
            Tab::Pinned => &mut self.pinned,
        };
        let Some(entry) = collection.iter_mut().find(|e| e.is(id)) else {
            return Ok(None);
        };
        entry.is_favorite = !entry.is_favorite;
        let state = entry.is_favorite;

        self.touch(tab);
        match tab {
            Tab::Links => self.save_links()?,
            Tab::Recent => self.save_recent()?,
            _ => self.save_pinned()?,
        }
        Ok(Some(state))
    }

    pub fn add_link(&mut self, name: &str, url: &str, category: &str) -> Result<Entry, LinkError> {
        let (name, url) = (name.trim(), url.trim());
        if name.is_empty() || url.is_empty() {
            return Err(LinkError::Blank);
        }
        if self.links.iter().any(|l| l.name == name) {
            return Err(LinkError::Duplicate(name.to_string()));
        }

        let category = match category.trim() {
            "" => DEFAULT_CATEGORY,
            c => c,
        };
        let link = Entry::new(name, url, category, EntryKind::Link);
        self.links.push(link.clone());
        self.touch(Tab::Links);
        self.save_links()?;
        Ok(link)
    }

    /// Removes a link together with its recent and pinned appearances.
    pub fn remove_link(&mut self, name: &str) -> Result<bool, PersistError> {
        let id = EntryId::new(EntryKind::Link, name);
        let before = self.links.len();
        self.links.retain(|l| !l.is(&id));
        if self.links.len() == before {
            return Ok(false);
        }
        self.recent.retain(|e| !e.is(&id));
        self.pinned.retain(|e| !e.is(&id));
        for tab in [Tab::Links, Tab::Recent, Tab::Pinned] {
            self.touch(tab);
        }
        self.save_all()?;
        Ok(true)
    }

    pub fn set_link_category(&mut self, name: &str, category: &str) -> Result<(), LinkError> {
        let id = EntryId::new(EntryKind::Link, name);
        if !self.links.iter().any(|l| l.is(&id)) {
            return Err(LinkError::NotFound(name.to_string()));
        }
        let category = match category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            c => c.to_string(),
        };

        for entry in self
            .links
            .iter_mut()
            .chain(self.recent.iter_mut())
            .chain(self.pinned.iter_mut())
            .filter(|e| e.is(&id))
        {
            entry.category = category.clone();
        }
        for tab in [Tab::Links, Tab::Recent, Tab::Pinned] {
            self.touch(tab);
        }
        self.save_all()?;
        Ok(())
    }

    /// Adds a file dropped onto the launcher: internet shortcuts become links,
    /// application shortcuts go to Recent.
    pub fn import_dropped(&mut self, path: &Path, timestamp: String) -> Result<Entry, LinkError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .ok_or_else(|| LinkError::UnsupportedDrop(path.to_path_buf()))?;

        match ext.as_deref() {
            Some("url") => {
                let content = fs::read_to_string(path)?;
                let url = INTERNET_SHORTCUT_URL
                    .captures(&content)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
                    .ok_or_else(|| LinkError::MissingUrl(path.to_path_buf()))?;
                self.add_link(&name, &url, DROPPED_CATEGORY)
            }
            Some("lnk") | Some("desktop") => {
                let entry = Entry::new(name, path.to_string_lossy().into_owned(), DROPPED_CATEGORY, EntryKind::App);
                self.record_recent(&entry, timestamp)?;
                Ok(entry)
            }
            _ => Err(LinkError::UnsupportedDrop(path.to_path_buf())),
        }
    }

    fn save_links(&self) -> Result<(), PersistError> {
        self.persistence.save_links(&self.links).inspect_err(|e| error!("Failed to save links: {}", e))
    }

    fn save_recent(&self) -> Result<(), PersistError> {
        self.persistence.save_recent(&self.recent).inspect_err(|e| error!("Failed to save recent items: {}", e))
    }

    fn save_pinned(&self) -> Result<(), PersistError> {
        self.persistence.save_pinned(&self.pinned).inspect_err(|e| error!("Failed to save pinned items: {}", e))
    }

    /// Attempts every document; reports the first failure.
    fn save_all(&self) -> Result<(), PersistError> {
        let links = self.save_links();
        let recent = self.save_recent();
        let pinned = self.save_pinned();
        links.and(recent).and(pinned)
    }
}
