//! CLI command implementations

pub mod achievements;
pub mod admin;
pub mod init;
pub mod leaderboard;
pub mod missions;
pub mod profile;
pub mod rewards;

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use lexiquest::{Config, GamificationEngine};

/// Flags shared by every subcommand
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub db: Option<PathBuf>,
}

impl GlobalOptions {
    /// Load the config and apply `--db`
    pub fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        if let Some(db) = &self.db {
            config.database.path = Some(db.clone());
        }
        Ok(config)
    }

    pub fn open_engine(&self) -> Result<GamificationEngine> {
        let config = self.load_config()?;
        GamificationEngine::open(&config).with_context(|| {
            format!(
                "Failed to open database: {}",
                config.database_path().display()
            )
        })
    }
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}
