//! Profile orchestration
//!
//! Pure reducers over state the other engines already computed: the profile
//! view, the dashboard, the weekly report and tier-upgrade detection. Nothing
//! here scores anything on its own.

mod dashboard;
mod notifications;
mod report;

pub use dashboard::{
    ACHIEVEMENT_MILESTONE, Dashboard, DashboardInput, Milestone, MilestoneKind, POINTS_MILESTONE,
    STREAK_MILESTONE, dashboard, motivation, recommendations,
};
pub use notifications::{GamificationEvent, level_up_notification, unlock_notifications};
pub use report::{ChallengeCompletion, REPORT_DAYS, WeeklyReport, weekly_report};

use std::collections::BTreeSet;

use serde::Serialize;

use crate::achievements::{AchievementUnlock, Catalog, completion_percentage, evaluate};
use crate::leaderboard::{TierName, tier_of};
use crate::mastery::{ToolMastery, mastery_stats, MasteryStats};
use crate::metrics::{ComputedMetrics, UserMetrics};

/// Everything a client needs to render a user's progression
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GamificationProfile {
    pub user_id: String,
    pub metrics: UserMetrics,
    pub computed: ComputedMetrics,
    pub balance: i64,
    pub tier: TierName,
    pub unlocked_achievements: Vec<String>,
    pub unlocked_count: usize,
    /// Share of the catalog unlocked, 0-100
    pub completion_percentage: u8,
    pub tools: Vec<ToolMastery>,
    pub mastery: MasteryStats,
}

pub fn build_profile(
    catalog: &Catalog,
    metrics: UserMetrics,
    unlocks: &[AchievementUnlock],
    tools: Vec<ToolMastery>,
    balance: i64,
) -> GamificationProfile {
    let unlocked: BTreeSet<String> = unlocks.iter().map(|u| u.achievement_id.clone()).collect();
    let results = evaluate(catalog, &metrics, &unlocked);
    let computed = metrics.computed();

    GamificationProfile {
        user_id: metrics.user_id.clone(),
        tier: tier_of(computed.total_points),
        computed,
        balance,
        unlocked_count: unlocked.len(),
        completion_percentage: completion_percentage(&results),
        unlocked_achievements: unlocked.into_iter().collect(),
        mastery: mastery_stats(&tools),
        tools,
        metrics,
    }
}

/// Tier change between two point totals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierUpgrade {
    pub previous_tier: TierName,
    pub new_tier: TierName,
    /// True only when the tier went up
    pub upgraded: bool,
}

pub fn tier_upgrade(before: u64, after: u64) -> TierUpgrade {
    let previous_tier = tier_of(before);
    let new_tier = tier_of(after);
    TierUpgrade {
        previous_tier,
        new_tier,
        upgraded: new_tier > previous_tier,
    }
}
