use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};
use calloop::EventLoop;
use calloop::channel::Event;
use clap::{Parser, Subcommand};
use log::{info, warn};

use quantum_launcher::config::{Config, load_config};
use quantum_launcher::coordinator::{Coordinator, LaunchReport};
use quantum_launcher::executor::SystemLauncher;
use quantum_launcher::icons::{IconCache, cache_key};
use quantum_launcher::model::{EntryId, EntryKind, SortMode, Tab, catalog_len};
use quantum_launcher::search::SearchEngine;
use quantum_launcher::sources::history::JsonStore;
use quantum_launcher::sources::shortcuts::{ScanEvent, ShortcutScanner};
use quantum_launcher::store::{CatalogStore, now_timestamp};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Index shortcuts and print the catalog
    Scan {
        /// Scan these roots instead of the configured ones
        #[arg(long = "root")]
        roots: Vec<PathBuf>,
    },
    /// Filter a tab
    Search {
        #[arg(default_value = "")]
        query: String,
        #[arg(short, long, default_value = "apps")]
        tab: Tab,
        #[arg(short, long, default_value = "name")]
        sort: SortMode,
        /// Print completion candidates instead of filtered entries
        #[arg(long)]
        suggest: bool,
    },
    /// Launch entries by name
    Launch {
        #[arg(short, long, default_value = "apps")]
        tab: Tab,
        #[arg(short, long)]
        kind: Option<EntryKind>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Show entries in the file manager
    Reveal {
        #[arg(short, long, default_value = "apps")]
        tab: Tab,
        #[arg(short, long)]
        kind: Option<EntryKind>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Pin entries by name
    Pin {
        #[arg(short, long, default_value = "apps")]
        tab: Tab,
        #[arg(short, long)]
        kind: Option<EntryKind>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    Unpin {
        #[arg(short, long)]
        kind: Option<EntryKind>,
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Toggle the favorite flag
    Favorite {
        #[arg(short, long, default_value = "links")]
        tab: Tab,
        #[arg(short, long)]
        kind: Option<EntryKind>,
        name: String,
    },
    #[command(subcommand)]
    Link(LinkCommand),
    #[command(subcommand)]
    Recent(RecentCommand),
    /// Import dropped `.url`, `.lnk` or `.desktop` files
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Resolve the icon for a shortcut through the cache
    Icon {
        source: PathBuf,
        /// Also write the decoded icon here
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Print collection sizes
    Stats,
}

#[derive(Subcommand, Debug)]
enum LinkCommand {
    Add {
        name: String,
        url: String,
        #[arg(short, long, default_value = "")]
        category: String,
    },
    Remove {
        name: String,
    },
    Category {
        name: String,
        category: String,
    },
}

#[derive(Subcommand, Debug)]
enum RecentCommand {
    Clear,
}

struct ScanState {
    store: CatalogStore,
    generation: u64,
    done: bool,
    failure: Option<String>,
    report_progress: bool,
}

/// Runs one scan, pumping its events through a calloop loop until it settles.
fn scan_into(store: CatalogStore, config: &Config, roots: Vec<PathBuf>, report_progress: bool) -> Result<CatalogStore> {
    let mut event_loop: EventLoop<ScanState> = EventLoop::try_new()?;
    let (tx_scan, rx_scan) = calloop::channel::channel::<ScanEvent>();

    event_loop
        .handle()
        .insert_source(rx_scan, |event, _, state: &mut ScanState| match event {
            Event::Msg(ScanEvent::Progress(progress)) => {
                if state.report_progress {
                    eprint!("\rScanning... {:>3}% ({}/{})", progress.percent, progress.processed, progress.total);
                }
            }
            Event::Msg(ScanEvent::Finished { generation, catalog }) => {
                if state.report_progress {
                    eprintln!();
                }
                if generation == state.generation {
                    state.store.apply_scan(generation, catalog);
                }
                state.done = true;
            }
            Event::Msg(ScanEvent::Failed { message, .. }) => {
                state.failure = Some(message);
                state.done = true;
            }
            Event::Closed => state.done = true,
        })
        .map_err(|e| anyhow!("failed to register scan channel: {}", e.error))?;

    let scanner = ShortcutScanner::new(&config.scan.extensions);
    let handle = scanner.scan(roots, tx_scan)?;
    let mut state = ScanState {
        store,
        generation: handle.generation(),
        done: false,
        failure: None,
        report_progress,
    };

    while !state.done {
        event_loop.dispatch(None, &mut state)?;
    }
    handle.join();

    if let Some(message) = state.failure {
        warn!("{}", message);
        eprintln!("{message}");
    }
    Ok(state.store)
}

/// Finds the identity of `name` within a tab, optionally constrained to a kind.
fn resolve_id(store: &CatalogStore, tab: Tab, name: &str, kind: Option<EntryKind>) -> Result<EntryId> {
    store
        .entries(tab)
        .into_iter()
        .find(|e| e.name == name && kind.is_none_or(|k| e.kind == k))
        .map(|e| e.id())
        .ok_or_else(|| anyhow!("no entry named {name:?} in {tab:?}"))
}

fn needs_catalog(tab: Tab) -> bool {
    tab == Tab::Apps
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    let store = CatalogStore::open(JsonStore::new(&config.data.dir), config.general.recent_limit);
    info!("data dir {:?}", config.data.dir);

    match args.command {
        Command::Scan { roots } => {
            let roots = if roots.is_empty() { config.scan.roots.clone() } else { roots };
            let store = scan_into(store, &config, roots, true)?;
            let catalog = store.catalog();
            for (category, apps) in catalog.iter() {
                println!("{category}");
                for (name, path) in apps {
                    println!("  {name}\t{}", path.display());
                }
            }
            println!("{} apps in {} categories", catalog_len(&catalog), catalog.len());
        }
        Command::Search { query, tab, sort, suggest } => {
            let store = if suggest || needs_catalog(tab) {
                scan_into(store, &config, config.scan.roots.clone(), false)?
            } else {
                store
            };
            let mut engine = SearchEngine::new(config.search.threshold, config.search.cache_capacity);
            if suggest {
                for name in engine.suggest(&store, &query, 10) {
                    println!("{name}");
                }
            } else {
                for entry in engine.query(&store, tab, &query, sort) {
                    let star = if entry.is_favorite { "*" } else { " " };
                    println!("{star} {}\t{}\t{}", entry.name, entry.category, entry.target);
                }
            }
        }
        Command::Launch { tab, kind, names } => {
            let mut store = if needs_catalog(tab) {
                scan_into(store, &config, config.scan.roots.clone(), false)?
            } else {
                store
            };
            let mut coordinator = Coordinator::new();
            for name in &names {
                coordinator.select(tab, resolve_id(&store, tab, name, kind)?);
            }
            let launcher = SystemLauncher::new(config.general.terminal.clone());
            let outcomes = coordinator.launch(&mut store, &launcher);
            let report = LaunchReport::from_outcomes(&outcomes);
            println!("{report}");
            if report.has_errors() {
                bail!("{} of {} launches failed", report.errors.len(), outcomes.len());
            }
        }
        Command::Reveal { tab, kind, names } => {
            let store = if needs_catalog(tab) {
                scan_into(store, &config, config.scan.roots.clone(), false)?
            } else {
                store
            };
            let mut coordinator = Coordinator::new();
            for name in &names {
                coordinator.select(tab, resolve_id(&store, tab, name, kind)?);
            }
            let launcher = SystemLauncher::new(config.general.terminal.clone());
            let outcomes = coordinator.reveal_selected(&store, &launcher);
            let report = LaunchReport::from_outcomes(&outcomes);
            if report.has_errors() {
                bail!("{report}");
            }
        }
        Command::Pin { tab, kind, names } => {
            let mut store = if needs_catalog(tab) {
                scan_into(store, &config, config.scan.roots.clone(), false)?
            } else {
                store
            };
            let mut coordinator = Coordinator::new();
            for name in &names {
                coordinator.select(tab, resolve_id(&store, tab, name, kind)?);
            }
            let pinned = coordinator.pin_selected(&mut store)?;
            println!("Pinned {pinned} of {} item(s)", names.len());
        }
        Command::Unpin { kind, names } => {
            let mut store = store;
            let mut coordinator = Coordinator::new();
            for name in &names {
                coordinator.select(Tab::Pinned, resolve_id(&store, Tab::Pinned, name, kind)?);
            }
            let removed = coordinator.unpin_selected(&mut store)?;
            println!("Unpinned {removed} item(s)");
        }
        Command::Favorite { tab, kind, name } => {
            if tab == Tab::Apps {
                bail!("apps carry no favorite flag; pin the app and mark the pinned entry");
            }
            let mut store = store;
            let id = resolve_id(&store, tab, &name, kind)?;
            match store.toggle_favorite(tab, &id)? {
                Some(true) => println!("{id} is now a favorite"),
                Some(false) => println!("{id} is no longer a favorite"),
                None => bail!("no entry {id} in {tab:?}"),
            }
        }
        Command::Link(link) => {
            let mut store = store;
            match link {
                LinkCommand::Add { name, url, category } => {
                    let entry = store.add_link(&name, &url, &category)?;
                    println!("Added link {} ({})", entry.name, entry.category);
                }
                LinkCommand::Remove { name } => {
                    if !store.remove_link(&name)? {
                        bail!("no link named {name:?}");
                    }
                    println!("Removed link {name}");
                }
                LinkCommand::Category { name, category } => {
                    store.set_link_category(&name, &category)?;
                    println!("Updated category for {name}");
                }
            }
        }
        Command::Recent(RecentCommand::Clear) => {
            let mut store = store;
            store.clear_recent()?;
            println!("Recent items cleared");
        }
        Command::Import { paths } => {
            let mut store = store;
            let mut failed = 0;
            for path in &paths {
                match store.import_dropped(path, now_timestamp()) {
                    Ok(entry) => println!("Imported {} as {}", entry.name, entry.kind),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {e}", path.display());
                    }
                }
            }
            if failed > 0 {
                bail!("{failed} of {} imports failed", paths.len());
            }
        }
        Command::Icon { source, out } => {
            let cache = IconCache::from_config(&config.icons);
            let icon = cache.resolve(&source);
            let origin = if cache.is_fallback(&icon) { "fallback" } else { "cached" };
            println!(
                "{} {}x{} {} ({})",
                cache_key(&source),
                icon.width(),
                icon.height(),
                origin,
                cache.dir().display()
            );
            if let Some(out) = out {
                icon.save(&out).with_context(|| format!("failed to write {}", out.display()))?;
            }
        }
        Command::Stats => {
            let store = scan_into(store, &config, config.scan.roots.clone(), false)?;
            let stats = store.stats();
            println!("apps: {}", stats.apps);
            println!("links: {}", stats.links);
            println!("recent: {}", stats.recent);
            println!("pinned: {}", stats.pinned);
        }
    }

    Ok(())
}
