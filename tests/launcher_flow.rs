use std::cell::RefCell;
use std::fs;
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use image::{Rgba, RgbaImage};
use quantum_launcher::coordinator::{Coordinator, LaunchReport};
use quantum_launcher::error::{ExtractionError, LaunchError};
use quantum_launcher::executor::Launcher;
use quantum_launcher::icons::{IconCache, IconExtractor};
use quantum_launcher::model::{Entry, EntryId, EntryKind, SortMode, Tab};
use quantum_launcher::search::SearchEngine;
use quantum_launcher::sources::history::JsonStore;
use quantum_launcher::sources::shortcuts::{ScanEvent, ShortcutScanner};
use quantum_launcher::store::CatalogStore;

#[derive(Default)]
struct RecordingLauncher {
    targets: RefCell<Vec<String>>,
}

impl Launcher for RecordingLauncher {
    fn launch(&self, entry: &Entry) -> Result<(), LaunchError> {
        self.targets.borrow_mut().push(entry.target.clone());
        Ok(())
    }

    fn reveal(&self, entry: &Entry) -> Result<(), LaunchError> {
        self.targets.borrow_mut().push(format!("reveal {}", entry.target));
        Ok(())
    }
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"").unwrap();
}

fn scan(root: &Path) -> ScanEvent {
    let scanner = ShortcutScanner::new(&["lnk".to_string(), "desktop".to_string()]);
    let (tx, rx) = mpsc::channel();
    let handle = scanner.scan(vec![root.to_path_buf()], tx).unwrap();
    handle.join();
    rx.iter()
        .find(|event| !matches!(event, ScanEvent::Progress(_)))
        .expect("scan produced a final event")
}

#[test]
fn scan_search_launch_and_remember() {
    let menu = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    touch(&menu.path().join("Notepad.lnk"));
    touch(&menu.path().join("Accessories/Paint.lnk"));
    touch(&menu.path().join("Games/Cards/Solitaire.desktop"));
    touch(&menu.path().join("readme.txt"));

    let mut store = CatalogStore::open(JsonStore::new(data.path()), 50);
    let ScanEvent::Finished { generation, catalog } = scan(menu.path()) else {
        panic!("scan did not finish");
    };
    assert!(store.apply_scan(generation, catalog));
    assert_eq!(store.stats().apps, 3);

    let mut engine = SearchEngine::new(90.0, 100);
    let hits = engine.query(&store, Tab::Apps, "paint", SortMode::Name);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].category, "Accessories");
    let games = engine.query(&store, Tab::Apps, "soli", SortMode::Category);
    assert_eq!(games[0].category, "Games/Cards");

    let mut coordinator = Coordinator::new();
    coordinator.select(Tab::Apps, hits[0].id());
    coordinator.select(Tab::Links, EntryId::new(EntryKind::Link, "Example"));
    let launcher = RecordingLauncher::default();
    let outcomes = coordinator.launch(&mut store, &launcher);
    let report = LaunchReport::from_outcomes(&outcomes);
    assert!(!report.has_errors());
    assert_eq!(report.launched, 2);
    assert_eq!(launcher.targets.borrow()[1], "https://example.com");

    let recent = engine.query(&store, Tab::Recent, "", SortMode::Name);
    assert_eq!(recent.len(), 2);

    // a fresh store sees the persisted history
    let reopened = CatalogStore::open(JsonStore::new(data.path()), 50);
    let names: Vec<_> = reopened.recent().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, ["Example", "Paint"]);
    assert_eq!(reopened.recent()[1].kind, EntryKind::App);
}

#[test]
fn recent_history_is_capped_and_moves_to_front() {
    let data = tempfile::tempdir().unwrap();
    let mut store = CatalogStore::open(JsonStore::new(data.path()), 50);
    for i in 0..60 {
        let entry = Entry::new(format!("App {i}"), format!("/menu/{i}.lnk"), "General", EntryKind::App);
        store.record_recent(&entry, format!("2024-01-01T00:00:{i:02}")).unwrap();
    }
    assert_eq!(store.recent().len(), 50);

    let again = store.recent()[20].clone();
    store.record_recent(&again, "2024-02-01T00:00:00".into()).unwrap();
    assert_eq!(store.recent().len(), 50);
    assert_eq!(store.recent()[0].name, again.name);
    assert_eq!(store.recent().iter().filter(|e| e.name == again.name).count(), 1);
}

#[test]
fn stale_generations_are_ignored() {
    let menu = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    touch(&menu.path().join("Notepad.lnk"));

    let mut store = CatalogStore::open(JsonStore::new(data.path()), 50);
    let ScanEvent::Finished { generation, catalog } = scan(menu.path()) else {
        panic!("scan did not finish");
    };
    store.apply_scan(generation, catalog);

    // an older generation arriving late is ignored
    assert!(!store.apply_scan(generation - 1, Default::default()));
    assert!(!store.apply_scan(generation, Default::default()));
    assert_eq!(store.stats().apps, 1);
}

#[cfg(unix)]
#[test]
fn failed_scan_keeps_the_previous_catalog() {
    let menu = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    touch(&menu.path().join("Notepad.lnk"));
    touch(&menu.path().join("Accessories/Paint.lnk"));

    let mut store = CatalogStore::open(JsonStore::new(data.path()), 50);
    let ScanEvent::Finished { generation, catalog } = scan(menu.path()) else {
        panic!("scan did not finish");
    };
    assert!(store.apply_scan(generation, catalog));
    let before = store.catalog();

    // a directory link back to the root makes the walk fail
    std::os::unix::fs::symlink(menu.path(), menu.path().join("Accessories/loop")).unwrap();
    touch(&menu.path().join("Games/Chess.lnk"));
    match scan(menu.path()) {
        ScanEvent::Failed { message, .. } => assert!(message.starts_with("Failed to load apps: ")),
        other => panic!("expected a failure, got {other:?}"),
    }

    assert_eq!(store.catalog(), before);
    assert_eq!(store.stats().apps, 2);
}

struct SolidExtractor;

impl IconExtractor for SolidExtractor {
    fn extract(&self, _source: &Path) -> Result<RgbaImage, ExtractionError> {
        Ok(RgbaImage::from_fn(48, 48, |x, y| Rgba([(x * 5) as u8, (y * 5) as u8, 90, 255])))
    }
}

#[test]
fn icon_cache_stays_under_its_limit() {
    let dir = tempfile::tempdir().unwrap();
    let single = IconCache::new(dir.path(), u64::MAX, Box::new(SolidExtractor));
    single.resolve(Path::new("/menu/sample.lnk"));
    let one_icon = single.disk_usage().unwrap();
    fs::remove_dir_all(dir.path()).unwrap();

    let limit = one_icon * 3;
    let cache = IconCache::new(dir.path(), limit, Box::new(SolidExtractor));
    for i in 0..6 {
        let icon = cache.resolve(Path::new(&format!("/menu/app{i}.lnk")));
        assert!(!cache.is_fallback(&icon));
        // distinct modification times
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(cache.disk_usage().unwrap() <= limit);

    let newest = dir.path().join(format!("{}.png", quantum_launcher::icons::cache_key(Path::new("/menu/app5.lnk"))));
    let oldest = dir.path().join(format!("{}.png", quantum_launcher::icons::cache_key(Path::new("/menu/app0.lnk"))));
    assert!(newest.exists());
    assert!(!oldest.exists());
}
