use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::ScanError;
use crate::model::{Catalog, DEFAULT_CATEGORY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanProgress {
    pub generation: u64,
    pub processed: usize,
    pub total: usize,
    pub percent: u8,
}

#[derive(Debug)]
pub enum ScanEvent {
    Progress(ScanProgress),
    Finished { generation: u64, catalog: Catalog },
    Failed { generation: u64, message: String },
}

/// Where the scan worker delivers its events. Returns false once nobody is listening.
pub trait ScanSink: Send + 'static {
    fn emit(&self, event: ScanEvent) -> bool;
}

impl ScanSink for mpsc::Sender<ScanEvent> {
    fn emit(&self, event: ScanEvent) -> bool {
        self.send(event).is_ok()
    }
}

impl ScanSink for calloop::channel::Sender<ScanEvent> {
    fn emit(&self, event: ScanEvent) -> bool {
        self.send(event).is_ok()
    }
}

pub fn percent(processed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (processed.min(total) * 100 / total) as u8
}

pub struct ShortcutScanner {
    extensions: Vec<String>,
    next_generation: AtomicU64,
}

pub struct ScanHandle {
    generation: u64,
    worker: JoinHandle<()>,
}

impl ScanHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn join(self) {
        if self.worker.join().is_err() {
            warn!("scan worker {} panicked", self.generation);
        }
    }
}

impl ShortcutScanner {
    pub fn new(extensions: &[String]) -> Self {
        Self {
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_ascii_lowercase()).collect(),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Starts a scan on a worker thread and returns immediately.
    ///
    /// Every call gets a fresh generation number and an empty accumulator, so
    /// a re-scan can be started while an older one is still running.
    pub fn scan<S: ScanSink>(&self, roots: Vec<PathBuf>, sink: S) -> Result<ScanHandle, ScanError> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
        let extensions = self.extensions.clone();

        let worker = thread::Builder::new()
            .name(format!("shortcut-scan-{generation}"))
            .spawn(move || {
                let result = build_catalog(&roots, &extensions, |progress| {
                    sink.emit(ScanEvent::Progress(ScanProgress { generation, ..progress }))
                });
                let event = match result {
                    Ok(catalog) => {
                        info!("scan {}: {} categories", generation, catalog.len());
                        ScanEvent::Finished { generation, catalog }
                    }
                    Err(e) => {
                        warn!("scan {} failed: {}", generation, e);
                        ScanEvent::Failed {
                            generation,
                            message: format!("Failed to load apps: {e}"),
                        }
                    }
                };
                if !sink.emit(event) {
                    debug!("scan {}: receiver gone before completion", generation);
                }
            })?;

        Ok(ScanHandle { generation, worker })
    }
}

fn matches_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

fn collect_shortcuts(roots: &[PathBuf], extensions: &[String]) -> Result<Vec<(usize, PathBuf)>, ScanError> {
    let mut found = Vec::new();
    for (root_index, root) in roots.iter().enumerate() {
        if !root.exists() {
            debug!("Scan root {:?} does not exist, skipping", root);
            continue;
        }
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = entry.map_err(|source| ScanError::Walk { root: root.clone(), source })?;
            if entry.file_type().is_dir() {
                continue;
            }
            if matches_extension(entry.path(), extensions) {
                found.push((root_index, entry.into_path()));
            }
        }
    }
    Ok(found)
}

/// Category of a shortcut: its parent directory relative to the root, `/`-separated.
pub fn category_for(root: &Path, shortcut: &Path) -> String {
    let relative = shortcut
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .map(|rel| {
            rel.components()
                .filter_map(|c| match c {
                    Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    if relative.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        relative
    }
}

/// Walks `roots` and builds a catalog, reporting progress after every shortcut.
///
/// `on_progress` returning false stops the walk early; the partial catalog is
/// still returned but callers that stopped listening will not use it.
pub fn build_catalog<F>(roots: &[PathBuf], extensions: &[String], mut on_progress: F) -> Result<Catalog, ScanError>
where
    F: FnMut(ScanProgress) -> bool,
{
    let shortcuts = collect_shortcuts(roots, extensions)?;
    let total = shortcuts.len();
    let mut catalog = Catalog::new();

    if total == 0 {
        on_progress(ScanProgress { generation: 0, processed: 0, total, percent: 100 });
        return Ok(catalog);
    }

    for (processed, (root_index, path)) in shortcuts.into_iter().enumerate() {
        let Some(name) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
            continue;
        };
        let category = category_for(&roots[root_index], &path);
        catalog.entry(category).or_default().insert(name, path);

        let processed = processed + 1;
        let keep_going = on_progress(ScanProgress {
            generation: 0,
            processed,
            total,
            percent: percent(processed, total),
        });
        if !keep_going {
            break;
        }
    }

    Ok(catalog)
}
