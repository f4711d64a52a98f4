//! Configuration loading and management

mod io;
mod settings;

pub use io::DEFAULT_CONFIG_TOML;
pub use settings::{
    CatalogSettings, LeaderboardSettings, ServerSettings, StorageBackend, StorageSettings,
};

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::achievements::Catalog;
use crate::store::{GamificationStore, MemoryStore, SqliteStore};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub storage: StorageSettings,

    #[serde(default)]
    pub leaderboard: LeaderboardSettings,

    #[serde(default)]
    pub catalog: CatalogSettings,
}

impl Config {
    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.server.max_body_bytes == 0 {
            bail!("server.max_body_bytes must be greater than 0");
        }
        if self.leaderboard.page_size == 0 {
            bail!("leaderboard.page_size must be greater than 0");
        }
        if self.leaderboard.max_page_size < self.leaderboard.page_size {
            bail!(
                "leaderboard.max_page_size ({}) is smaller than leaderboard.page_size ({})",
                self.leaderboard.max_page_size,
                self.leaderboard.page_size
            );
        }
        Ok(())
    }

    /// Database file for the sqlite backend
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .path
            .clone()
            .unwrap_or_else(|| Self::global_config_dir().join("levelup.db"))
    }

    /// The configured catalog, or the built-in one
    pub fn load_catalog(&self) -> Result<Catalog> {
        match &self.catalog.path {
            Some(path) => {
                let catalog = Catalog::from_file(path)
                    .with_context(|| format!("Failed to load catalog: {}", path.display()))?;
                tracing::info!(
                    "[levelup:config] Loaded {} achievements from {}",
                    catalog.len(),
                    path.display()
                );
                Ok(catalog)
            }
            None => Ok(Catalog::builtin().clone()),
        }
    }

    /// Open the configured storage backend
    pub fn open_store(&self) -> Result<Arc<dyn GamificationStore>> {
        match self.storage.backend {
            StorageBackend::Sqlite => {
                let path = self.database_path();
                let store = SqliteStore::open(&path)
                    .with_context(|| format!("Failed to open database: {}", path.display()))?;
                Ok(Arc::new(store))
            }
            StorageBackend::Memory => {
                tracing::warn!("[levelup:config] Using in-memory storage, nothing will be persisted");
                Ok(Arc::new(MemoryStore::new()))
            }
        }
    }
}
