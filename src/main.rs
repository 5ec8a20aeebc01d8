use anyhow::Result;
use arc_swap::ArcSwap;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::EnvFilter;
use yoso_config::{Config, ConfigWatcher, LogFormat};
use yoso_proxy::{AppState, SlotView};
use yoso_store::{SlotStore, SqliteKvStore};
use yoso_types::{SlotId, now_ms};

#[derive(Parser, Debug)]
#[command(name = "yoso", about = "yoso: credential-rotating generation gateway")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Serve {
        /// Path to the YAML configuration file (hot-reloaded).
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the listening port (default: 8018).
        #[arg(short, long)]
        port: Option<u16>,
        /// Override the listening address (default: 127.0.0.1).
        #[arg(long)]
        host: Option<String>,
        /// SQLite database path (default: ~/.yoso/yoso.db).
        #[arg(long, value_name = "PATH")]
        db: Option<PathBuf>,
    },
    /// Manage the persisted API key slots.
    Slots {
        #[command(subcommand)]
        action: SlotAction,
        /// Path to the YAML configuration file.
        #[arg(short, long, value_name = "FILE", global = true)]
        config: Option<PathBuf>,
        /// SQLite database path (default: ~/.yoso/yoso.db).
        #[arg(long, value_name = "PATH", global = true)]
        db: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum SlotAction {
    /// List slots with masked secrets and health.
    List,
    /// Set the secret (and optionally the label) of one slot.
    Set {
        id: u32,
        secret: String,
        #[arg(long)]
        label: Option<String>,
    },
    /// Clear every slot.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            host,
            db,
        } => cmd_serve(config, port, host, db).await,
        Commands::Slots { action, config, db } => cmd_slots(action, config, db).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Config> {
    match path {
        Some(p) => Config::from_file(p),
        None => Config::from_env(),
    }
    .map_err(|e| anyhow::anyhow!("config error: {e}"))
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log.level.as_str()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.compact().init(),
    }
}

async fn cmd_serve(
    config_path: Option<PathBuf>,
    port: Option<u16>,
    host: Option<String>,
    db: Option<PathBuf>,
) -> Result<()> {
    let (config, watcher) = match &config_path {
        Some(path) => {
            let watcher = Arc::new(
                ConfigWatcher::new(path.clone())
                    .map_err(|e| anyhow::anyhow!("config error: {e}"))?,
            );
            (watcher.arc(), Some(watcher))
        }
        None => (Arc::new(ArcSwap::from_pointee(load_config(None)?)), None),
    };
    let snapshot = config.load_full();
    init_tracing(&snapshot);
    if let Some(watcher) = watcher {
        watcher.watch();
    }

    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| snapshot.host.clone()),
        port.unwrap_or(snapshot.port)
    );
    let kv = Arc::new(open_store(db.or_else(|| snapshot.db_path.clone())).await?);
    let state = Arc::new(AppState::with_http(config, kv));
    let shutdown = state.shutdown.clone();
    let app = yoso_proxy::make_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "yoso listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
            shutdown.cancel();
        })
        .await?;
    Ok(())
}

async fn cmd_slots(action: SlotAction, config_path: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let kv = Arc::new(open_store(db.or_else(|| config.db_path.clone())).await?);
    let store = SlotStore::new(kv, config.rotation.slot_count);
    let now = now_ms();

    let slots = match action {
        SlotAction::List => store.load().await?,
        SlotAction::Set { id, secret, label } => {
            let Some(slot) = store.update(SlotId(id), label, Some(secret)).await? else {
                anyhow::bail!("no slot with id {id}");
            };
            eprintln!("slot {} updated", slot.id);
            vec![slot]
        }
        SlotAction::Clear => {
            let slots = store.clear().await?;
            eprintln!("all slots cleared");
            slots
        }
    };

    let views: Vec<SlotView> = slots.iter().map(|s| SlotView::new(s, now)).collect();
    println!("{}", serde_json::to_string_pretty(&views)?);
    Ok(())
}

async fn open_store(db: Option<PathBuf>) -> Result<SqliteKvStore> {
    let path = db.unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let url = format!("sqlite://{}", path.display());
    SqliteKvStore::new(&url)
        .await
        .map_err(|e| anyhow::anyhow!("database error: {e}"))
}

fn default_db_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".yoso").join("yoso.db")
}
