//! Configuration file I/O operations

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use super::Config;

/// Written by `levelup init`; every value is the default
pub const DEFAULT_CONFIG_TOML: &str = r#"# levelup configuration

[server]
# Interface and port of the HTTP API
host = "127.0.0.1"
port = 9877
# Shared secret clients send as X-Levelup-Token. Empty disables auth.
auth_token = ""
# Larger request bodies are rejected with 413
max_body_bytes = 2097152

[storage]
# "sqlite" or "memory"
backend = "sqlite"
# Database file. Defaults to ~/.levelup/levelup.db
# path = "/var/lib/levelup/levelup.db"

[leaderboard]
page_size = 50
max_page_size = 200
# Neighbours shown on each side of a user
context_radius = 2

[catalog]
# External achievement catalog replacing the built-in one
# path = "/etc/levelup/achievements.toml"
"#;

impl Config {
    /// Get the global config directory path (~/.levelup/)
    pub fn global_config_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".levelup")
    }

    /// Get the global config file path (~/.levelup/config.toml)
    pub fn global_config_path() -> PathBuf {
        Self::global_config_dir().join("config.toml")
    }

    /// Load and validate configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;

        Ok(config)
    }

    /// Load `path` if given, else the global config, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        let global_path = Self::global_config_path();
        if global_path.exists() {
            Self::from_file(&global_path)
        } else {
            tracing::debug!(
                "[levelup:config] No config at {}, using defaults",
                global_path.display()
            );
            Ok(Self::default())
        }
    }

    /// Write the commented default config to `path`.
    ///
    /// Refuses to replace an existing file unless `force` is set. The content
    /// goes to a temp file first and is renamed into place.
    pub fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            bail!(
                "Config file already exists: {} (use --force to overwrite)",
                path.display()
            );
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let temp_path = path.with_extension("toml.tmp");
        let mut temp_file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;

        temp_file
            .write_all(DEFAULT_CONFIG_TOML.as_bytes())
            .with_context(|| "Failed to write config content")?;

        temp_file
            .sync_all()
            .with_context(|| "Failed to sync config file")?;

        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to rename config file: {}", path.display()))?;

        Ok(())
    }
}
