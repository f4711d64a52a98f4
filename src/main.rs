use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use levelup::config::Config;

mod cli;

#[derive(Parser)]
#[command(name = "levelup")]
#[command(about = "Gamification & progression engine - achievements, mastery, leaderboards")]
#[command(version)]
struct Cli {
    /// Path to the config file (defaults to ~/.levelup/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Interface to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Write a default config file
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },

    /// List the achievement catalog
    Catalog {
        /// Only show this category (explorer, communicator, master, legend)
        #[arg(long)]
        category: Option<String>,
    },

    /// Show a user's dashboard
    Dashboard {
        user_id: String,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a leaderboard
    Leaderboard {
        /// total-points, achievements, streak-days, personality-score or tool-mastery
        #[arg(default_value = "total-points")]
        category: String,

        #[arg(long, default_value_t = 1)]
        page: usize,

        /// Also show this user's neighbourhood
        #[arg(long)]
        around: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    match cli.command {
        Some(Commands::Init { force }) => {
            cli::init::init_command(cli.config, force)?;
        }
        Some(Commands::Catalog { category }) => {
            let config = Config::load(cli.config.as_deref())?;
            cli::catalog::catalog_command(&config, category)?;
        }
        Some(Commands::Dashboard { user_id, json }) => {
            let config = Config::load(cli.config.as_deref())?;
            cli::stats::dashboard_command(&config, &user_id, json)?;
        }
        Some(Commands::Leaderboard {
            category,
            page,
            around,
        }) => {
            let config = Config::load(cli.config.as_deref())?;
            cli::stats::leaderboard_command(&config, &category, page, around)?;
        }
        Some(Commands::Serve { host, port }) => {
            let config = Config::load(cli.config.as_deref())?;
            cli::serve::serve_command(config, cli::serve::ServeOverrides { host, port }).await?;
        }
        None => {
            // Default: serve with the configured settings
            let config = Config::load(cli.config.as_deref())?;
            cli::serve::serve_command(config, cli::serve::ServeOverrides::default()).await?;
        }
    }

    Ok(())
}
