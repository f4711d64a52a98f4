//! Leaderboards: per-category scores, deterministic ranking and tiers

mod ranking;
mod tiers;

pub use ranking::{
    CompetitiveInsight, LeaderboardCategory, LeaderboardInputs, UserRank, competitive_insight,
    context_window, page, promotions, rank, rank_against, score,
};
pub use tiers::{
    TIERS, TierName, TierReward, TierRewardKind, TierThreshold, next_tier, points_until_next_tier,
    tier_distribution, tier_of, tier_progress,
};
