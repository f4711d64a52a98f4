//! Catalog command implementation

use anyhow::Result;

use levelup::achievements::Category;
use levelup::config::Config;

/// List the configured catalog grouped by category
pub fn catalog_command(config: &Config, category: Option<String>) -> Result<()> {
    let catalog = config.load_catalog()?;

    let filter = match category.as_deref() {
        Some(raw) => match Category::from_str(raw) {
            Some(c) => Some(c),
            None => {
                eprintln!("Unknown category: {}", raw);
                return Ok(());
            }
        },
        None => None,
    };

    println!(
        "Achievements ({}, {} points total):\n",
        catalog.len(),
        catalog.total_reward_points()
    );

    for &category in Category::ALL {
        if filter.is_some_and(|f| f != category) {
            continue;
        }
        let defs = catalog.by_category(category);
        if defs.is_empty() {
            continue;
        }

        println!("{}:", category.label());
        for def in defs {
            println!(
                "  {:<24} {:<9} {:>4} pts  {}",
                def.id,
                def.rarity.as_str(),
                def.reward_points(),
                def.description
            );
        }
        println!();
    }

    Ok(())
}
