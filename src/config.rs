//! Startup configuration: CLI flags (§6) layered over environment
//! variables, matching the teacher's `Config::from_env()` /
//! `SessionConfig::from_env()` split between clap-derived flags and
//! ad-hoc env lookups for connection secrets.

use anyhow::{Context, Result};
use clap::Parser;

/// `exchange-price-index` — composite price index engine.
#[derive(Parser, Debug, Clone)]
#[command(name = "exchange-price-index", version, about)]
pub struct Cli {
    /// Enable persistence to the time-series store.
    #[arg(long = "save-db", default_value_t = true, value_parser = clap::value_parser!(bool))]
    pub save_db: bool,

    /// Path to the symbol roster file.
    #[arg(long = "exchange-info", default_value = "exchange_info.json")]
    pub exchange_info: String,

    /// Persistence tick interval, in milliseconds.
    #[arg(long = "save-period", default_value_t = 100)]
    pub save_period_ms: u64,
}

/// Postgres connection parameters for the persistence sink (§6).
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub conn_str: String,
}

impl DbConfig {
    /// `DB_CONN_STR` if set, otherwise the five `POSTGRES_*` parts
    /// (all required). Absence of a required variable is startup-fatal.
    pub fn from_env() -> Result<Self> {
        if let Ok(conn_str) = std::env::var("DB_CONN_STR") {
            return Ok(Self { conn_str });
        }

        let user = std::env::var("POSTGRES_USER").context("POSTGRES_USER not set")?;
        let password = std::env::var("POSTGRES_PASSWORD").context("POSTGRES_PASSWORD not set")?;
        let db = std::env::var("POSTGRES_DB").context("POSTGRES_DB not set")?;
        let host = std::env::var("POSTGRES_HOST").context("POSTGRES_HOST not set")?;
        let port = std::env::var("POSTGRES_PORT").context("POSTGRES_PORT not set")?;

        Ok(Self {
            conn_str: format!("postgres://{user}:{password}@{host}:{port}/{db}"),
        })
    }
}

/// Path to the shared-memory-backed file, `SHM_PATH` or the default (§6).
pub fn shm_path() -> String {
    std::env::var("SHM_PATH").unwrap_or_else(|_| ".price_ix.data".to_string())
}

/// Loads a local `.env` if present, matching the teacher's `load_env()`.
pub fn load_env() {
    dotenv::dotenv().ok();
}
