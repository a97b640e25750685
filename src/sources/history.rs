//! JSON documents for links, recent and pinned items.
//!
//! Loading never fails: a missing or unreadable document yields the built-in
//! default, and individual records missing required keys are skipped.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::PersistError;
use crate::model::{DEFAULT_CATEGORY, Entry, EntryKind};

pub const LINKS_FILE: &str = "links.json";
pub const RECENT_FILE: &str = "recent.json";
pub const PINNED_FILE: &str = "pinned.json";

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LinkRecord {
    pub name: String,
    pub url: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub is_favorite: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HistoryRecord {
    pub name: String,
    pub path: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl From<LinkRecord> for Entry {
    fn from(record: LinkRecord) -> Self {
        let mut entry = Entry::new(record.name, record.url, record.category, EntryKind::Link);
        entry.is_favorite = record.is_favorite;
        entry
    }
}

impl From<&Entry> for LinkRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            name: entry.name.clone(),
            url: entry.target.clone(),
            category: entry.category.clone(),
            is_favorite: entry.is_favorite,
        }
    }
}

impl From<HistoryRecord> for Entry {
    fn from(record: HistoryRecord) -> Self {
        Entry {
            name: record.name,
            target: record.path,
            category: record.category,
            kind: record.kind,
            is_favorite: record.is_favorite,
            timestamp: record.timestamp,
        }
    }
}

impl From<&Entry> for HistoryRecord {
    fn from(entry: &Entry) -> Self {
        Self {
            name: entry.name.clone(),
            path: entry.target.clone(),
            category: entry.category.clone(),
            kind: entry.kind,
            timestamp: entry.timestamp.clone(),
            is_favorite: entry.is_favorite,
        }
    }
}

pub fn example_links() -> Vec<Entry> {
    vec![Entry::new("Example", "https://example.com", DEFAULT_CATEGORY, EntryKind::Link)]
}

/// Reads and writes the JSON documents inside a data directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load_links(&self) -> Vec<Entry> {
        match self.load_records::<LinkRecord>(LINKS_FILE) {
            Some(records) => records.into_iter().map(Entry::from).collect(),
            None => example_links(),
        }
    }

    pub fn load_recent(&self, limit: usize) -> Vec<Entry> {
        self.load_records::<HistoryRecord>(RECENT_FILE)
            .unwrap_or_default()
            .into_iter()
            .take(limit)
            .map(Entry::from)
            .collect()
    }

    pub fn load_pinned(&self) -> Vec<Entry> {
        self.load_records::<HistoryRecord>(PINNED_FILE)
            .unwrap_or_default()
            .into_iter()
            .map(Entry::from)
            .collect()
    }

    pub fn save_links(&self, links: &[Entry]) -> Result<(), PersistError> {
        let records: Vec<LinkRecord> = links.iter().map(LinkRecord::from).collect();
        self.write_document(LINKS_FILE, &records)
    }

    pub fn save_recent(&self, recent: &[Entry]) -> Result<(), PersistError> {
        let records: Vec<HistoryRecord> = recent.iter().map(HistoryRecord::from).collect();
        self.write_document(RECENT_FILE, &records)
    }

    pub fn save_pinned(&self, pinned: &[Entry]) -> Result<(), PersistError> {
        let records: Vec<HistoryRecord> = pinned.iter().map(HistoryRecord::from).collect();
        self.write_document(PINNED_FILE, &records)
    }

    /// `None` when the document is missing or is not a JSON array.
    fn load_records<T: DeserializeOwned>(&self, document: &str) -> Option<Vec<T>> {
        let path = self.dir.join(document);
        let content = fs::read_to_string(&path).ok()?;
        let values: Vec<serde_json::Value> = match serde_json::from_str(&content) {
            Ok(values) => values,
            Err(e) => {
                warn!("{} is corrupt, using defaults: {}", path.display(), e);
                return None;
            }
        };

        let total = values.len();
        let records: Vec<T> = values
            .into_iter()
            .filter_map(|value| serde_json::from_value(value).ok())
            .collect();
        if records.len() != total {
            debug!("{}: skipped {} malformed records", document, total - records.len());
        }
        Some(records)
    }

    fn write_document<T: Serialize>(&self, document: &'static str, records: &T) -> Result<(), PersistError> {
        let path = self.dir.join(document);
        let content = serde_json::to_string_pretty(records)
            .map_err(|source| PersistError::Encode { document, source })?;
        fs::create_dir_all(&self.dir)
            .and_then(|_| fs::write(&path, content))
            .map_err(|source| PersistError::Write { path, source })
    }
}
