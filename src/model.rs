use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CATEGORY: &str = "General";

/// What an entry launches as. Persisted as the `type` field of recent/pinned records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    App,
    Link,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryKind::App => "app",
            EntryKind::Link => "link",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "app" => Ok(EntryKind::App),
            "link" => Ok(EntryKind::Link),
            other => Err(format!("unknown entry kind {other:?}")),
        }
    }
}

/// The collection an entry is viewed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tab {
    Apps,
    Links,
    Recent,
    Pinned,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Apps, Tab::Links, Tab::Recent, Tab::Pinned];

    pub fn index(self) -> usize {
        match self {
            Tab::Apps => 0,
            Tab::Links => 1,
            Tab::Recent => 2,
            Tab::Pinned => 3,
        }
    }

    /// Whether entries of this tab carry a meaningful last-used time.
    pub fn tracks_usage(self) -> bool {
        matches!(self, Tab::Recent | Tab::Pinned)
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "apps" | "app" => Ok(Tab::Apps),
            "links" | "link" => Ok(Tab::Links),
            "recent" => Ok(Tab::Recent),
            "pinned" => Ok(Tab::Pinned),
            other => Err(format!("unknown tab {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    #[default]
    Name,
    Category,
    LastUsed,
}

impl FromStr for SortMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(SortMode::Name),
            "category" => Ok(SortMode::Category),
            "lastused" | "last-used" => Ok(SortMode::LastUsed),
            other => Err(format!("unknown sort mode {other:?}")),
        }
    }
}

/// Identity of an entry across collections: an app "X" and a link "X" differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    pub kind: EntryKind,
    pub name: String,
}

impl EntryId {
    pub fn new(kind: EntryKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,          // Display name
    pub target: String,        // Shortcut path, executable or URL
    pub category: String,
    pub kind: EntryKind,
    pub is_favorite: bool,
    pub timestamp: Option<String>, // ISO-8601, recent/pinned only
}

impl Entry {
    pub fn new(name: impl Into<String>, target: impl Into<String>, category: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            category: category.into(),
            kind,
            is_favorite: false,
            timestamp: None,
        }
    }

    pub fn id(&self) -> EntryId {
        EntryId::new(self.kind, self.name.clone())
    }

    pub fn is(&self, id: &EntryId) -> bool {
        self.kind == id.kind && self.name == id.name
    }
}

/// category -> app name -> shortcut path
pub type Catalog = BTreeMap<String, BTreeMap<String, PathBuf>>;

pub fn catalog_len(catalog: &Catalog) -> usize {
    catalog.values().map(BTreeMap::len).sum()
}

/// Entries of the Apps tab, in category then name order.
pub fn catalog_entries(catalog: &Catalog) -> Vec<Entry> {
    catalog
        .iter()
        .flat_map(|(category, apps)| {
            apps.iter().map(move |(name, path)| {
                Entry::new(name.clone(), path.to_string_lossy().into_owned(), category.clone(), EntryKind::App)
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_name_different_kind_is_a_different_entry() {
        let app = Entry::new("X", "/x.lnk", DEFAULT_CATEGORY, EntryKind::App);
        let link = Entry::new("X", "https://x", DEFAULT_CATEGORY, EntryKind::Link);
        assert_ne!(app.id(), link.id());
        assert!(app.is(&EntryId::new(EntryKind::App, "X")));
        assert!(!link.is(&EntryId::new(EntryKind::App, "X")));
    }

    #[test]
    fn catalog_entries_follow_category_then_name_order() {
        let mut catalog = Catalog::new();
        catalog.entry("Zed".into()).or_default().insert("b".into(), PathBuf::from("/b"));
        catalog.entry("Accessories".into()).or_default().insert("z".into(), PathBuf::from("/z"));
        catalog.entry("Accessories".into()).or_default().insert("a".into(), PathBuf::from("/a"));

        let names: Vec<_> = catalog_entries(&catalog).into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["a", "z", "b"]);
        assert_eq!(catalog_len(&catalog), 3);
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("Recent".parse::<Tab>(), Ok(Tab::Recent));
        assert_eq!("lastused".parse::<SortMode>(), Ok(SortMode::LastUsed));
        assert_eq!("LINK".parse::<EntryKind>(), Ok(EntryKind::Link));
        assert!("folder".parse::<Tab>().is_err());
    }
}
