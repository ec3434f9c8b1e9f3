// Launcher Registry CLI binary

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use launcher_registry::backup;
use launcher_registry::config::LauncherConfig;
use launcher_registry::db::schema::AppRecord;
use launcher_registry::events::{EventOutcome, EventWorker, LauncherEvent};
use launcher_registry::ordering::{Axis, ReorderOutcome};
use launcher_registry::projection::Query;
use launcher_registry::reconcile::{ProfileFilter, StaticEnumerator};
use launcher_registry::store::AppStore;
use launcher_registry::Launcher;

#[derive(Parser)]
#[command(name = "launcherctl")]
#[command(about = "Inspect and edit the launcher app catalog", long_about = None)]
#[command(version)]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the config
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and write a default config if none exists
    Init,

    /// Sync the catalog with the installed apps
    Reconcile {
        /// JSON snapshot of installed apps instead of scanning desktop entries
        #[arg(long)]
        snapshot: Option<PathBuf>,
        /// Only reconcile this profile handle
        #[arg(long)]
        profile: Option<i64>,
    },

    /// Print a view
    List {
        /// all, drawer, favorites, hidden or locked
        #[arg(long, default_value = "drawer")]
        view: Query,
        /// Filter the drawer by label or package
        #[arg(long)]
        search: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Move an item within an ordering (positions as shown by the editor)
    Move {
        axis: Axis,
        from: usize,
        to: usize,
    },

    /// Swap two items of an ordering
    Swap {
        axis: Axis,
        first: usize,
        second: usize,
    },

    /// Give an app the next manual rank
    Promote { axis: Axis, id: i64 },

    /// Return an app to automatic placement
    Demote { axis: Axis, id: i64 },

    /// Mark or unmark a favorite
    Favorite {
        id: i64,
        #[arg(long)]
        off: bool,
    },

    /// Hide or unhide an app
    Hide {
        id: i64,
        #[arg(long)]
        off: bool,
    },

    /// Lock or unlock an app
    Lock {
        id: i64,
        #[arg(long)]
        off: bool,
    },

    /// Change an app's display name
    Rename { id: i64, name: String },

    /// Remove an app from the catalog
    Delete { id: i64 },

    /// Remove every app and restart ids
    Reset {
        #[arg(long)]
        yes: bool,
    },

    /// Write the catalog to a JSON backup
    Export { path: PathBuf },

    /// Restore the catalog from a JSON backup
    Import { path: PathBuf },

    /// Check whether an app may launch without authentication
    Launch { id: i64 },

    /// Keep reconciling in the background and report drawer changes
    Watch {
        /// Stop after this many seconds (runs until killed otherwise)
        #[arg(long)]
        seconds: Option<u64>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = LauncherConfig::load_or_default(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.db_path = Some(db);
    }

    match cli.command {
        Commands::Init => cmd_init(&config, cli.config),
        Commands::Reconcile { snapshot, profile } => cmd_reconcile(&config, snapshot, profile),
        Commands::List { view, search, json } => cmd_list(&config, view, search, json),
        Commands::Move { axis, from, to } => cmd_event(&config, LauncherEvent::Move { axis, from, to }),
        Commands::Swap { axis, first, second } => cmd_event(&config, LauncherEvent::Swap { axis, first, second }),
        Commands::Promote { axis, id } => cmd_event(&config, LauncherEvent::Promote { axis, id }),
        Commands::Demote { axis, id } => cmd_event(&config, LauncherEvent::Demote { axis, id }),
        Commands::Favorite { id, off } => cmd_event(&config, LauncherEvent::SetFavorite { id, value: !off }),
        Commands::Hide { id, off } => cmd_event(&config, LauncherEvent::SetHidden { id, value: !off }),
        Commands::Lock { id, off } => cmd_event(&config, LauncherEvent::SetLocked { id, value: !off }),
        Commands::Rename { id, name } => cmd_event(&config, LauncherEvent::Rename { id, name }),
        Commands::Delete { id } => cmd_event(&config, LauncherEvent::Delete { id }),
        Commands::Reset { yes } => cmd_reset(&config, yes),
        Commands::Export { path } => cmd_export(&config, path),
        Commands::Import { path } => cmd_import(&config, path),
        Commands::Launch { id } => cmd_launch(&config, id),
        Commands::Watch { seconds } => cmd_watch(&config, seconds),
    }
}

fn open_launcher(config: &LauncherConfig) -> Result<Launcher> {
    let db_path = config.resolved_db_path()?;
    Launcher::open(config).with_context(|| format!("Failed to open catalog at {}", db_path.display()))
}

fn cmd_init(config: &LauncherConfig, config_path: Option<PathBuf>) -> Result<()> {
    let db_path = config.resolved_db_path()?;
    let store = AppStore::open(&db_path)?;
    println!("Database ready at {} ({} apps)", db_path.display(), store.count()?);

    let config_path = match config_path.or_else(LauncherConfig::default_config_path) {
        Some(p) => p,
        None => return Ok(()),
    };
    if !config_path.exists() {
        config.save(&config_path)?;
        println!("Wrote default config to {}", config_path.display());
    }
    Ok(())
}

fn cmd_reconcile(config: &LauncherConfig, snapshot: Option<PathBuf>, profile: Option<i64>) -> Result<()> {
    let launcher = match snapshot {
        Some(path) => {
            let store = Arc::new(AppStore::open(&config.resolved_db_path()?)?);
            let enumerator = StaticEnumerator::from_json_file(&path)
                .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
            Launcher::new(store, Arc::new(enumerator)).with_filter(config.profile_filter())
        }
        None => open_launcher(config)?,
    };
    let launcher = match profile {
        Some(handle) => launcher.with_filter(ProfileFilter::Only(handle)),
        None => launcher,
    };

    let report = launcher.reconciler().reconcile()?;
    if let Some(reason) = &report.skipped {
        println!("Skipped: {}", reason);
        return Ok(());
    }
    println!(
        "Inserted {}, deleted {}, unchanged {}",
        report.inserted, report.deleted, report.unchanged
    );
    Ok(())
}

fn print_table(apps: &[AppRecord]) {
    println!(
        "{:<6} {:<32} {:<40} {:>5} {:>6} {:>6} {:>5}",
        "ID", "NAME", "PACKAGE", "USER", "DRAWER", "FAV", "LOCK"
    );
    for app in apps {
        let mut flags = String::new();
        if app.favorite { flags.push('F'); }
        if app.hidden { flags.push('H'); }
        if app.lock { flags.push('L'); }
        println!(
            "{:<6} {:<32} {:<40} {:>5} {:>6} {:>6} {:>5} {}",
            app.id,
            truncate(&app.app_name, 32),
            truncate(&app.package_name, 40),
            app.user_handle,
            app.global_app_order,
            app.app_order,
            app.lock_order,
            flags
        );
    }
    println!("\n{} apps", apps.len());
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let cut: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn cmd_list(config: &LauncherConfig, view: Query, search: Option<String>, json: bool) -> Result<()> {
    let launcher = open_launcher(config)?;
    let apps: Vec<AppRecord> = match &search {
        Some(text) => launcher.search_drawer(text),
        None => launcher.store().query(view)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&apps)?);
    } else {
        print_table(&apps);
    }
    Ok(())
}

fn cmd_event(config: &LauncherConfig, event: LauncherEvent) -> Result<()> {
    let launcher = open_launcher(config)?;
    match launcher.handle_event(event)? {
        EventOutcome::Reorder(ReorderOutcome::Applied) => println!("Applied"),
        EventOutcome::Reorder(ReorderOutcome::Unchanged) => println!("Unchanged"),
        EventOutcome::Reorder(ReorderOutcome::Rejected(reason)) => {
            anyhow::bail!("Rejected: {}", reason)
        }
        EventOutcome::Changed(true) => println!("Updated"),
        EventOutcome::Changed(false) => println!("Unchanged"),
        EventOutcome::Reconciled(report) => println!(
            "Inserted {}, deleted {}, unchanged {}",
            report.inserted, report.deleted, report.unchanged
        ),
    }
    Ok(())
}

fn cmd_reset(config: &LauncherConfig, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("Refusing to wipe the catalog without --yes");
    }
    let launcher = open_launcher(config)?;
    let removed = launcher.reset()?;
    println!("Removed {} apps", removed);
    Ok(())
}

fn cmd_export(config: &LauncherConfig, path: PathBuf) -> Result<()> {
    let launcher = open_launcher(config)?;
    let backup = launcher.export_backup()?;
    backup::write_backup(&backup, &path)?;
    println!("Exported {} apps to {}", backup.apps.len(), path.display());
    Ok(())
}

fn cmd_import(config: &LauncherConfig, path: PathBuf) -> Result<()> {
    let launcher = open_launcher(config)?;
    let backup = backup::read_backup(&path)
        .with_context(|| format!("Failed to read backup {}", path.display()))?;
    let summary = launcher.restore_backup(&backup)?;
    println!("Restored {} apps ({} ranks repaired)", summary.restored, summary.repaired);
    Ok(())
}

fn cmd_launch(config: &LauncherConfig, id: i64) -> Result<()> {
    let launcher = open_launcher(config)?;
    if launcher.requires_auth(id)? {
        println!("App {} is locked: authentication required", id);
    } else {
        println!("App {} may launch", id);
    }
    Ok(())
}

fn cmd_watch(config: &LauncherConfig, seconds: Option<u64>) -> Result<()> {
    let launcher = Arc::new(open_launcher(config)?);
    let interval = config.reconcile_interval();
    let mut drawer = launcher.store().subscribe(Query::Drawer);

    let worker = EventWorker::spawn(Arc::clone(&launcher), interval)?;
    worker.send(LauncherEvent::Reconcile)?;
    match interval {
        Some(interval) => println!(
            "Watching {} drawer apps, reconciling after {}s idle",
            drawer.latest().len(),
            interval.as_secs()
        ),
        None => println!(
            "Watching {} drawer apps, idle reconciliation disabled",
            drawer.latest().len()
        ),
    }

    let deadline = seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while deadline.map_or(true, |d| Instant::now() < d) {
        if let Some(snapshot) = drawer.wait(Duration::from_secs(1)) {
            println!("Drawer changed: {} apps", snapshot.len());
        }
    }

    worker.shutdown();
    Ok(())
}
