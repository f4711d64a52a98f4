//! Init command implementation

use anyhow::Result;
use std::path::PathBuf;

use levelup::config::Config;

/// Write a commented default config, to `~/.levelup/config.toml` unless a
/// path is given
pub fn init_command(config_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(Config::global_config_path);

    Config::write_default(&config_path, force)?;
    println!("Created: {}", config_path.display());

    Ok(())
}
