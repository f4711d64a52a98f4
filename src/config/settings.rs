//! Configuration sections

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// HTTP API settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret required in `X-Levelup-Token`
    ///
    /// If empty, the server accepts unauthenticated requests.
    #[serde(default)]
    pub auth_token: String,

    /// Larger request bodies are answered with 413
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9877
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

impl ServerSettings {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The token, or `None` when auth is disabled
    pub fn token(&self) -> Option<&str> {
        Some(self.auth_token.trim()).filter(|t| !t.is_empty())
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: String::new(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    /// Nothing survives a restart
    Memory,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Database file, defaults to `~/.levelup/levelup.db`
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Leaderboard paging defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardSettings {
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound for a client-requested page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Neighbours shown on each side of a user
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,
}

fn default_page_size() -> usize {
    50
}

fn default_max_page_size() -> usize {
    200
}

fn default_context_radius() -> usize {
    2
}

impl Default for LeaderboardSettings {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            context_radius: default_context_radius(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogSettings {
    /// External TOML catalog replacing the built-in achievements
    #[serde(default)]
    pub path: Option<PathBuf>,
}
