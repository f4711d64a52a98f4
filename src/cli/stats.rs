//! Dashboard and leaderboard commands
//!
//! Both read straight from the configured store, no server needed.

use anyhow::{Context, Result, bail};
use std::sync::Arc;

use levelup::config::Config;
use levelup::leaderboard::LeaderboardCategory;
use levelup::metrics::MetricsSource;
use levelup::service::{GamificationService, LeaderboardQuery};

fn open_service(config: &Config) -> Result<GamificationService> {
    let catalog = config.load_catalog()?;
    let store = config.open_store()?;
    Ok(GamificationService::new(store, Arc::new(catalog)))
}

/// Print one user's dashboard
pub fn dashboard_command(config: &Config, user_id: &str, json: bool) -> Result<()> {
    let service = open_service(config)?;
    if service.store().metrics(user_id)?.is_none() {
        bail!("No profile for {}", user_id);
    }
    let dashboard = service
        .dashboard(user_id)
        .with_context(|| format!("Failed to build dashboard for {}", user_id))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&dashboard)?);
        return Ok(());
    }

    println!("{} - {}", dashboard.user_id, dashboard.motivation);
    println!(
        "  Points: {}  Balance: {}  Tier: {}",
        dashboard.total_points,
        dashboard.balance,
        dashboard.tier.as_str()
    );
    println!(
        "  Badges: {}  Streak: {} (best {})  Mastered tools: {}",
        dashboard.badge_count,
        dashboard.current_streak,
        dashboard.longest_streak,
        dashboard.mastered_tools
    );
    if let Some(rank) = dashboard.rank {
        println!("  Rank: #{}", rank);
    }

    if !dashboard.next_milestones.is_empty() {
        println!("\nNext milestones:");
        for m in &dashboard.next_milestones {
            println!(
                "  {:<28} {}/{} ({} to go)",
                m.label, m.current, m.target, m.remaining
            );
        }
    }
    if !dashboard.recommendations.is_empty() {
        println!("\nRecommendations:");
        for r in &dashboard.recommendations {
            println!("  - {}", r);
        }
    }

    Ok(())
}

/// Print one page of a leaderboard
pub fn leaderboard_command(
    config: &Config,
    category: &str,
    page: usize,
    around: Option<String>,
) -> Result<()> {
    let Some(category) = LeaderboardCategory::from_str(category) else {
        bail!("Unknown leaderboard category: {}", category);
    };

    let service = open_service(config)?;
    let query = LeaderboardQuery {
        page: page.max(1),
        page_size: config.leaderboard.page_size,
        around,
        radius: config.leaderboard.context_radius,
    };
    let view = service.leaderboard(category, &query)?;

    if view.entries.is_empty() {
        println!("No users ranked in {}.", category.label());
        return Ok(());
    }

    println!("{} ({} users):\n", category.label(), view.total);
    for entry in &view.entries {
        println!(
            "  #{:<4} {:<24} {:>8}  {:<9} {:+}",
            entry.rank,
            entry.user_id,
            entry.score,
            entry.tier.as_str(),
            entry.rank_delta
        );
    }

    if let Some(insight) = &view.insight {
        println!("\n{}", insight.position_insight);
    }

    Ok(())
}
