use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::policy::query::PageLimits;

/// Where policy documents live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::Postgres => "postgres",
            StoreBackend::Memory => "memory",
        }
    }
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => bail!("STORE_BACKEND must be 'postgres' or 'memory', got '{other}'"),
        }
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if a required variable is missing or unparsable.
#[derive(Debug, Clone)]
pub struct Config {
    pub store_backend: StoreBackend,
    /// Required for the postgres backend.
    pub database_url: Option<String>,
    /// JSON array of documents loaded into the memory backend at startup.
    pub seed_file: Option<PathBuf>,
    /// Reviewer webhook; notifications are only logged when unset.
    pub notify_webhook_url: Option<String>,
    pub notify_timeout: Duration,
    pub default_page_size: usize,
    pub max_page_size: usize,
    pub store_timeout: Duration,
    /// Fetch one document past each page so the last page carries no cursor.
    pub exact_has_more: bool,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_vars<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let store_backend = match var("STORE_BACKEND") {
            Some(raw) => raw.parse::<StoreBackend>()?,
            None => StoreBackend::Postgres,
        };
        let database_url = var("DATABASE_URL");
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            bail!("Required environment variable 'DATABASE_URL' is not set");
        }

        let default_page_size: usize = parse_or(&var, "DEFAULT_PAGE_SIZE", 10)?;
        let max_page_size: usize = parse_or(&var, "MAX_PAGE_SIZE", 100)?;
        if default_page_size == 0 || max_page_size == 0 {
            bail!("DEFAULT_PAGE_SIZE and MAX_PAGE_SIZE must be at least 1");
        }
        if default_page_size > max_page_size {
            bail!("DEFAULT_PAGE_SIZE ({default_page_size}) exceeds MAX_PAGE_SIZE ({max_page_size})");
        }

        Ok(Config {
            store_backend,
            database_url,
            seed_file: var("SEED_FILE").map(PathBuf::from),
            notify_webhook_url: var("NOTIFY_WEBHOOK_URL"),
            notify_timeout: Duration::from_secs(parse_or(&var, "NOTIFY_TIMEOUT_SECS", 5)?),
            default_page_size,
            max_page_size,
            store_timeout: Duration::from_secs(parse_or(&var, "STORE_TIMEOUT_SECS", 10)?),
            exact_has_more: parse_or(&var, "EXACT_HAS_MORE", true)?,
            port: parse_or(&var, "PORT", 8080)?,
            rust_log: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_page_size: self.default_page_size,
            max_page_size: self.max_page_size,
            lookahead: self.exact_has_more,
        }
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value '{raw}'")),
        None => Ok(default),
    }
}
