/*
storygen - single-binary main.rs
Loads configuration, opens the document store once, and serves the story generation trigger.
*/

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use common::{ensure_schema, init_db_pool, Config};
use storygen::content::{StaticContentProvider, SystemClock};
use storygen::server::{launch_rocket, AppState};
use storygen::storage::SqliteDocumentStore;

#[derive(Parser, Debug)]
#[command(name = "storygen", about = "Daily story generator HTTP trigger")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let default_path = PathBuf::from("config.default.toml");
    let override_path = match args.config {
        Some(p) if !p.exists() => {
            error!(path = ?p, "specified config file not found");
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p) => Some(p),
        None => Some(PathBuf::from("config.toml")).filter(|p| p.exists()),
    };

    let config = match Config::load_with_defaults(
        Some(&default_path).filter(|p| p.exists()).map(PathBuf::as_path),
        override_path.as_deref(),
    )
    .await
    {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("failed to load configuration: {:#}", e);
            return Err(e);
        }
    };
    info!(default = ?default_path, override_file = ?override_path, "configuration loaded");

    // One pool for the life of the process; every request shares it through AppState.
    let db_path = match tokio::fs::canonicalize(&config.database.path).await {
        Ok(p) => p.to_string_lossy().to_string(),
        Err(_) => config.database.path.clone(),
    };
    info!(db_path = %db_path, "resolved DB path");

    let db_pool = match init_db_pool(&db_path).await {
        Ok(p) => p,
        Err(e) => {
            error!(db_path = %db_path, "failed to initialize database pool: {:#}", e);
            return Err(e);
        }
    };

    if config.auto_migrate() {
        ensure_schema(&db_pool).await?;
        info!("document schema ready");
    }

    let state = AppState {
        store: Arc::new(SqliteDocumentStore::new(db_pool)),
        content: Arc::new(StaticContentProvider),
        clock: Arc::new(SystemClock),
        collection: config.stories_collection().to_string(),
        secret: config.auth.resolve_secret(),
    };

    if let Err(e) = launch_rocket(&config, state).await {
        error!("Rocket server failed: {:#}", e);
        return Err(e);
    }

    info!("Shutdown complete");
    Ok(())
}
