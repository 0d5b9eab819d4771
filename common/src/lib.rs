/*!
common/src/lib.rs

Shared configuration types and DB helper functions for storygen.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader merging a default and an override TOML file
- Helpers to initialize an SQLite pool and bootstrap the document schema
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Collection the daily batch is written to unless configured otherwise.
pub const DEFAULT_STORIES_COLLECTION: &str = "stories";

/// Database configuration section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the sqlite database file (e.g. "data/storygen.db")
    pub path: String,
}

/// HTTP listener overrides merged into Rocket's figment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: Option<String>,
    pub port: Option<u16>,
}

/// Shared-secret gate for the generation endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub secret: String,
    /// Name of an env var whose value replaces `secret` when set
    pub secret_env: Option<String>,
}

impl AuthConfig {
    /// The secret in effect: the `secret_env` variable if present, else `secret`.
    pub fn resolve_secret(&self) -> String {
        self.secret_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .unwrap_or_else(|| self.secret.clone())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoriesConfig {
    pub collection: Option<String>,
}

/// Admin / maintenance config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub auto_migrate: Option<bool>,
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub stories: StoriesConfig,
    pub admin: Option<AdminConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        for path in [default_path, override_path].into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            let data = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let val: toml::Value = toml::from_str(&data)
                .with_context(|| format!("Failed to parse configuration: {}", path.display()))?;
            merge_toml(&mut config_value, val);
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Target collection for generated stories.
    pub fn stories_collection(&self) -> &str {
        self.stories
            .collection
            .as_deref()
            .unwrap_or(DEFAULT_STORIES_COLLECTION)
    }

    /// Schema bootstrap runs unless `admin.auto_migrate = false`.
    pub fn auto_migrate(&self) -> bool {
        self.admin
            .as_ref()
            .and_then(|a| a.auto_migrate)
            .unwrap_or(true)
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

/// Initialize an SQLite connection pool.
///
/// Creates the parent directory and the DB file if necessary, then returns a WAL-mode
/// `SqlitePool` capped at 5 connections.
///
/// Example:
///   let pool = init_db_pool("data/storygen.db").await?;
pub async fn init_db_pool(path: &str) -> Result<SqlitePool> {
    if let Some(parent) = Path::new(path).parent() {
        tokio::fs::create_dir_all(parent).await.with_context(|| {
            format!("Failed to create DB parent directory: {}", parent.display())
        })?;
    }

    // Opening the file up front surfaces permission problems with a clearer error
    // than the SQLite connect would.
    tokio::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .await
        .with_context(|| format!("Failed to create or open DB file: {}", path))?;

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to sqlite database at path: {}", path))?;

    Ok(pool)
}

/// Create the `documents` table (one row per stored document) if it is missing.
/// Safe to call on every startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            fields_json TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .context("failed to create documents table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection)")
        .execute(pool)
        .await
        .context("failed to create documents collection index")?;

    Ok(())
}
