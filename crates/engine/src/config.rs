//! Configuration loaded from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Maximum database connections in pool (default: 10).
    pub database_max_connections: u32,

    /// How long to wait for a pooled connection (default: 5s).
    pub acquire_timeout: Duration,

    /// Statement timeout for reads and list queries (default: 5s).
    pub read_timeout: Duration,

    /// Statement timeout for multi-statement writes (default: 10s).
    pub write_timeout: Duration,

    /// Text-search configuration used by full-text ranking (default: spanish).
    pub search_language: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let database_url =
            env::var("DATABASE_URL").context("DATABASE_URL environment variable is required")?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .context("DATABASE_MAX_CONNECTIONS must be a valid u32")?;

        let acquire_timeout = seconds_var("DATABASE_ACQUIRE_TIMEOUT_SECS", 5)?;
        let read_timeout = seconds_var("READ_TIMEOUT_SECS", 5)?;
        let write_timeout = seconds_var("WRITE_TIMEOUT_SECS", 10)?;

        let search_language =
            env::var("SEARCH_LANGUAGE").unwrap_or_else(|_| "spanish".to_string());
        validate_search_language(&search_language)?;

        Ok(Self {
            database_url,
            database_max_connections,
            acquire_timeout,
            read_timeout,
            write_timeout,
            search_language,
        })
    }

    /// Configuration for code paths that never open a connection (query
    /// rendering, tests).
    pub fn offline() -> Self {
        Self {
            database_url: String::new(),
            database_max_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(10),
            search_language: "spanish".to_string(),
        }
    }
}

fn seconds_var(name: &str, default: u64) -> Result<Duration> {
    let secs: u64 = match env::var(name) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{name} must be a whole number of seconds"))?,
        Err(_) => default,
    };
    if secs == 0 {
        bail!("{name} must be greater than zero");
    }
    Ok(Duration::from_secs(secs))
}

/// The language is spliced into `plainto_tsquery('<lang>', $n)`, so only plain
/// configuration names are accepted.
fn validate_search_language(lang: &str) -> Result<()> {
    if lang.is_empty() || !lang.chars().all(|c| c.is_ascii_alphabetic()) {
        bail!("SEARCH_LANGUAGE must be a plain text-search configuration name, got '{lang}'");
    }
    Ok(())
}
