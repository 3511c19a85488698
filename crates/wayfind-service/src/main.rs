//! Wayfind Service - place discovery engine with HTTP API.
//!
//! Run with: `cargo run -p wayfind-service`

use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use axum::Router;
use clap::{Parser, Subcommand};
use time::format_description::well_known::Rfc3339;
use tokio::io::BufReader;
use tokio_util::task::TaskTracker;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use wayfind_core::OverpassClient;
use wayfind_service::config::default_config_path;
use wayfind_service::{AppState, Config, LoggingMonitor, api, feed, ws};
use wayfind_store::{DiscoveryQuery, Store};

/// Wayfind Service - discover the places you actually visit.
#[derive(Parser, Debug)]
#[command(name = "wayfind-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run {
        /// Read NDJSON location and trigger events from stdin.
        #[arg(long)]
        stdin: bool,

        /// Evaluate geofences in-process instead of waiting for fired triggers.
        #[arg(long)]
        simulate_geofences: bool,
    },

    /// Print discoveries, newest first.
    List {
        /// Maximum number of discoveries to print.
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Export all discoveries as CSV.
    Export {
        /// Output file (defaults to stdout).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Validate the configuration file.
    Check,

    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("wayfind_service=info,wayfind_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Args {
        command,
        config,
        bind,
        database,
    } = args;

    match command.unwrap_or(Command::Run {
        stdin: false,
        simulate_geofences: false,
    }) {
        Command::Run {
            stdin,
            simulate_geofences,
        } => run_server(config, bind, database, stdin, simulate_geofences).await,
        Command::List { limit } => list(config, database, limit),
        Command::Export { output } => export(config, database, output),
        Command::Config { action } => handle_config_action(config, action),
    }
}

/// Load the configuration and apply command line overrides.
fn load_config(
    path: Option<PathBuf>,
    bind: Option<String>,
    database: Option<PathBuf>,
) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = database {
        config.storage.path = db_path;
    }

    config.validate()?;
    Ok(config)
}

async fn run_server(
    config_path: Option<PathBuf>,
    bind: Option<String>,
    database: Option<PathBuf>,
    stdin: bool,
    simulate_geofences: bool,
) -> anyhow::Result<()> {
    let config = load_config(config_path, bind, database)?;

    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let client = Arc::new(
        OverpassClient::with_timeout(
            &config.overpass.endpoint,
            Duration::from_secs(config.overpass.timeout_secs),
        )?
        .with_place_kinds(config.overpass.place_kinds.clone()),
    );

    let state = if simulate_geofences {
        let (state, fired_rx) = AppState::simulated(store, config.clone(), client)?;
        tokio::spawn(Arc::clone(&state).run_fired_consumer(fired_rx));
        info!("Simulating geofences in-process");
        state
    } else {
        AppState::new(store, config.clone(), client, Arc::new(LoggingMonitor))?
    };

    // The monitor may have lost its regions while the registrations survived.
    let rearmed = state.engine.registry().rearm_all().await?;
    info!("Re-armed {} triggers", rearmed);

    let tracker = TaskTracker::new();
    if stdin {
        let state = Arc::clone(&state);
        let feed_tracker = tracker.clone();
        tokio::spawn(async move {
            let reader = BufReader::new(tokio::io::stdin());
            match feed::run(reader, state, &feed_tracker).await {
                Ok(summary) => info!(
                    "Stdin feed closed: {} events, {} skipped",
                    summary.dispatched, summary.skipped
                ),
                Err(e) => warn!("Stdin feed failed: {}", e),
            }
        });
    }

    let app = Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(Arc::clone(&state));

    let addr: SocketAddr = config.server.bind.parse()?;

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down, waiting for pending events and effects");
    tracker.close();
    tracker.wait().await;
    state.engine.effects().drain().await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn open_store(config_path: Option<PathBuf>, database: Option<PathBuf>) -> anyhow::Result<Store> {
    let config = load_config(config_path, None, database)?;
    Store::open(&config.storage.path)
        .with_context(|| format!("opening {}", config.storage.path.display()))
}

fn list(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let store = open_store(config_path, database)?;

    let mut query = DiscoveryQuery::new();
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    let records = store.query_discoveries(&query)?;

    if records.is_empty() {
        println!("No discoveries yet");
        return Ok(());
    }

    let mut out = std::io::stdout().lock();
    for record in records {
        writeln!(
            out,
            "{}  {} ({}) [{}]",
            record.discovered_at.format(&Rfc3339)?,
            record.name,
            record.category,
            record.place_id
        )?;
    }
    Ok(())
}

fn export(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let store = open_store(config_path, database)?;

    let count = match output {
        Some(path) => {
            let file = std::fs::File::create(&path)
                .with_context(|| format!("creating {}", path.display()))?;
            store.export_csv(file)?
        }
        None => store.export_csv(std::io::stdout().lock())?,
    };

    eprintln!("Exported {} discoveries", count);
    Ok(())
}

fn handle_config_action(config_path: Option<PathBuf>, action: ConfigAction) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(default_config_path);

    match action {
        ConfigAction::Check => {
            if !path.exists() {
                println!("{} does not exist; defaults apply", path.display());
                Config::default().validate()?;
                return Ok(());
            }
            Config::load_validated(&path)?;
            println!("{} is valid", path.display());
        }
        ConfigAction::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            Config::default().save(&path)?;
            println!("Wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
