//! Achievement engine: declarative definitions evaluated against metrics
//!
//! Unlocks are monotonic. Callers persist every unlock and pass the full set
//! back into `evaluate`; only transitions reported by `newly_unlocked` earn
//! points.

mod catalog;
mod checker;
mod definitions;

pub use catalog::Catalog;
pub use checker::{
    AchievementCheckResult, PointGrant, by_category, check, closest_to_unlock,
    completion_percentage, evaluate, newly_unlocked, unlock_grants,
};
pub use definitions::{AchievementDefinition, Category, Rarity, Requirement};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted unlock; never deleted or re-dated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementUnlock {
    pub user_id: String,
    pub achievement_id: String,
    pub unlocked_at: DateTime<Utc>,
}
