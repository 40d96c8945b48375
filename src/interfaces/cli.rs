use crate::config::PolicyConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::PathBuf;

/// Replays a marketplace command script and prints the resulting balances.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Input command script (JSON lines)
    pub input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Policy overrides as JSON; missing keys keep their defaults
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Also print the order table after the balances
    #[arg(long)]
    pub orders: bool,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    pub log_level: String,

    /// Start time of the script clock (RFC 3339). Defaults to now.
    #[arg(long)]
    pub start: Option<DateTime<Utc>>,
}

impl Cli {
    pub fn policy(&self) -> Result<PolicyConfig> {
        match &self.config {
            Some(path) => PolicyConfig::load(path),
            None => Ok(PolicyConfig::default()),
        }
    }
}
