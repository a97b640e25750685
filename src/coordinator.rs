use std::fmt;

use log::{info, warn};

use crate::error::{LaunchError, LinkError, PersistError};
use crate::executor::Launcher;
use crate::model::{Entry, EntryId, EntryKind, Tab};
use crate::store::{CatalogStore, now_timestamp};

#[derive(Debug)]
pub struct LaunchOutcome {
    pub tab: Tab,
    pub id: EntryId,
    pub result: Result<(), String>,
    /// Set when the item launched but its history could not be saved.
    pub warning: Option<String>,
}

impl LaunchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a launch batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LaunchReport {
    pub launched: usize,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl LaunchReport {
    pub fn from_outcomes(outcomes: &[LaunchOutcome]) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match &outcome.result {
                Ok(()) => report.launched += 1,
                Err(message) => report.errors.push(message.clone()),
            }
            report.warnings.extend(outcome.warning.iter().cloned());
        }
        report
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

impl fmt::Display for LaunchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() && self.warnings.is_empty() {
            return write!(f, "Launched {} item(s)", self.launched);
        }
        let lines: Vec<&str> = self.errors.iter().chain(&self.warnings).map(String::as_str).collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// Tracks what the user has selected across tabs and acts on it.
#[derive(Debug, Default)]
pub struct Coordinator {
    selection: Vec<(Tab, EntryId)>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false when the key was already selected.
    pub fn select(&mut self, tab: Tab, id: EntryId) -> bool {
        if self.is_selected(tab, &id) {
            return false;
        }
        self.selection.push((tab, id));
        true
    }

    pub fn deselect(&mut self, tab: Tab, id: &EntryId) -> bool {
        let before = self.selection.len();
        self.selection.retain(|(t, i)| !(*t == tab && i == id));
        self.selection.len() != before
    }

    pub fn is_selected(&self, tab: Tab, id: &EntryId) -> bool {
        self.selection.iter().any(|(t, i)| *t == tab && i == id)
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selected(&self, tab: Tab) -> Vec<&EntryId> {
        self.selection
            .iter()
            .filter(|(t, _)| *t == tab)
            .map(|(_, id)| id)
            .collect()
    }

    pub fn selection_len(&self) -> usize {
        self.selection.len()
    }

    fn take_selection(&mut self) -> Vec<(Tab, EntryId)> {
        std::mem::take(&mut self.selection)
    }

    fn selected_entries(&self, store: &CatalogStore) -> Vec<Entry> {
        self.selection
            .iter()
            .filter_map(|(tab, id)| store.find(*tab, id))
            .collect()
    }

    /// Launches every selected entry in selection order and records the
    /// successes in Recent. A failing item never stops the batch.
    pub fn launch(&mut self, store: &mut CatalogStore, launcher: &dyn Launcher) -> Vec<LaunchOutcome> {
        let timestamp = now_timestamp();
        let mut outcomes = Vec::new();

        for (tab, id) in self.take_selection() {
            let result = match store.find(tab, &id) {
                None => Err(LaunchError::Missing(id.to_string())),
                Some(entry) => launcher.launch(&entry).map(|()| entry),
            };

            let (result, warning) = match result {
                Ok(entry) => {
                    let warning = store
                        .record_recent(&entry, timestamp.clone())
                        .err()
                        .map(|e| format!("Launched {} but recent items were not saved: {}", id.name, e));
                    (Ok(()), warning)
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", id.name, e);
                    (Err(format!("Failed to open {}: {}", id.name, e)), None)
                }
            };
            outcomes.push(LaunchOutcome { tab, id, result, warning });
        }

        let report = LaunchReport::from_outcomes(&outcomes);
        info!("{} launched, {} failed", report.launched, report.errors.len());
        outcomes
    }

    /// Shows each selected entry in the file manager. History is untouched.
    pub fn reveal_selected(&mut self, store: &CatalogStore, launcher: &dyn Launcher) -> Vec<LaunchOutcome> {
        self.take_selection()
            .into_iter()
            .map(|(tab, id)| {
                let result = store
                    .find(tab, &id)
                    .ok_or_else(|| LaunchError::Missing(id.to_string()))
                    .and_then(|entry| launcher.reveal(&entry))
                    .map_err(|e| {
                        warn!("Failed to open location of {}: {}", id.name, e);
                        format!("Failed to open location of {}: {}", id.name, e)
                    });
                LaunchOutcome { tab, id, result, warning: None }
            })
            .collect()
    }

    /// Pins every selected entry; returns how many were newly pinned.
    pub fn pin_selected(&mut self, store: &mut CatalogStore) -> Result<usize, PersistError> {
        let mut pinned = 0;
        for entry in self.selected_entries(store) {
            if store.pin(&entry)? {
                pinned += 1;
            }
        }
        self.clear_selection();
        Ok(pinned)
    }

    pub fn unpin_selected(&mut self, store: &mut CatalogStore) -> Result<usize, PersistError> {
        let mut removed = 0;
        for (_, id) in self.take_selection() {
            if store.unpin(&id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    pub fn toggle_favorite_selected(&mut self, store: &mut CatalogStore) -> Result<usize, PersistError> {
        let mut toggled = 0;
        for (tab, id) in self.take_selection() {
            if store.toggle_favorite(tab, &id)?.is_some() {
                toggled += 1;
            }
        }
        Ok(toggled)
    }

    pub fn delete_selected_links(&mut self, store: &mut CatalogStore) -> Result<usize, PersistError> {
        let mut removed = 0;
        for (_, id) in self.take_selection() {
            if id.kind == EntryKind::Link && store.remove_link(&id.name)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Recategorizes a single selected link.
    pub fn set_category_selected_link(&mut self, store: &mut CatalogStore, category: &str) -> Result<(), LinkError> {
        let links = self.selected(Tab::Links);
        let [id] = links.as_slice() else {
            return Err(LinkError::SelectionCount(links.len()));
        };
        let name = id.name.clone();
        store.set_link_category(&name, category)?;
        self.clear_selection();
        Ok(())
    }
}
