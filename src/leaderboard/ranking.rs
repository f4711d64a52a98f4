//! Scoring and ranking
//!
//! Ranking sorts by score descending and breaks ties by user id ascending,
//! so the same score set always produces the same order.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::tiers::{TierName, tier_of};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LeaderboardCategory {
    TotalPoints,
    Achievements,
    StreakDays,
    PersonalityScore,
    ToolMastery,
}

impl LeaderboardCategory {
    pub const ALL: [LeaderboardCategory; 5] = [
        Self::TotalPoints,
        Self::Achievements,
        Self::StreakDays,
        Self::PersonalityScore,
        Self::ToolMastery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TotalPoints => "total-points",
            Self::Achievements => "achievements",
            Self::StreakDays => "streak-days",
            Self::PersonalityScore => "personality-score",
            Self::ToolMastery => "tool-mastery",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "total-points" => Some(Self::TotalPoints),
            "achievements" => Some(Self::Achievements),
            "streak-days" => Some(Self::StreakDays),
            "personality-score" => Some(Self::PersonalityScore),
            "tool-mastery" => Some(Self::ToolMastery),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::TotalPoints => "Total Points",
            Self::Achievements => "Achievements",
            Self::StreakDays => "Streak Days",
            Self::PersonalityScore => "Personality Score",
            Self::ToolMastery => "Tool Mastery",
        }
    }
}

/// Everything the category scores are computed from
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LeaderboardInputs {
    pub total_points: u64,
    pub unlocked_achievements: u64,
    pub current_streak: u64,
    /// 0-100
    pub average_quality: f64,
    pub mastered_tools: u64,
}

pub fn score(category: LeaderboardCategory, inputs: &LeaderboardInputs) -> u64 {
    match category {
        LeaderboardCategory::TotalPoints => inputs.total_points,
        LeaderboardCategory::Achievements => inputs.unlocked_achievements.saturating_mul(50),
        LeaderboardCategory::StreakDays => inputs.current_streak.saturating_mul(10),
        LeaderboardCategory::PersonalityScore => {
            (inputs.average_quality.clamp(0.0, 100.0) * 100.0).round() as u64
        }
        LeaderboardCategory::ToolMastery => inputs.mastered_tools.saturating_mul(500),
    }
}

/// A user's position in one category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRank {
    pub user_id: String,
    pub category: LeaderboardCategory,
    pub score: u64,
    /// 1-based
    pub rank: u32,
    pub tier: TierName,
    /// Previous rank minus current rank; positive means climbed
    pub rank_delta: i64,
}

/// Rank a score map with no previous snapshot (all deltas 0)
pub fn rank(category: LeaderboardCategory, scores: &[(String, u64)]) -> Vec<UserRank> {
    rank_against(category, scores, &HashMap::new())
}

/// Rank a score map and compute deltas against `previous` (user -> rank)
pub fn rank_against(
    category: LeaderboardCategory,
    scores: &[(String, u64)],
    previous: &HashMap<String, u32>,
) -> Vec<UserRank> {
    let mut sorted: Vec<&(String, u64)> = scores.iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (user_id, score))| {
            let rank = i as u32 + 1;
            let rank_delta = previous
                .get(user_id)
                .map(|prev| *prev as i64 - rank as i64)
                .unwrap_or(0);
            UserRank {
                user_id: user_id.clone(),
                category,
                score: *score,
                rank,
                tier: tier_of(*score),
                rank_delta,
            }
        })
        .collect()
}

/// Users whose tier rose by at least `min_tier_jump` between two rankings
pub fn promotions<'a>(
    previous: &[UserRank],
    current: &'a [UserRank],
    min_tier_jump: u8,
) -> Vec<&'a UserRank> {
    let before: HashMap<&str, TierName> = previous
        .iter()
        .map(|r| (r.user_id.as_str(), r.tier))
        .collect();

    current
        .iter()
        .filter(|r| {
            before.get(r.user_id.as_str()).is_some_and(|prev| {
                r.tier.index() as i16 - prev.index() as i16 >= min_tier_jump.max(1) as i16
            })
        })
        .collect()
}

/// One page of a ranking, `page` starting at 1
pub fn page(rankings: &[UserRank], page: usize, page_size: usize) -> &[UserRank] {
    if page == 0 || page_size == 0 {
        return &[];
    }
    let start = (page - 1).saturating_mul(page_size);
    if start >= rankings.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(rankings.len());
    &rankings[start..end]
}

/// `user_id` with up to `radius` neighbours on each side; empty when unranked
pub fn context_window<'a>(rankings: &'a [UserRank], user_id: &str, radius: usize) -> &'a [UserRank] {
    let Some(index) = rankings.iter().position(|r| r.user_id == user_id) else {
        return &[];
    };
    let start = index.saturating_sub(radius);
    let end = index.saturating_add(radius).saturating_add(1).min(rankings.len());
    &rankings[start..end]
}

/// Where a user stands relative to the field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitiveInsight {
    pub position_insight: String,
    /// Score of the user directly above (0 when already first)
    pub next_target_score: u64,
    pub next_target_user: Option<String>,
    /// Share of the field at or below this user, 0-100
    pub percentile_rank: u8,
}

pub fn competitive_insight(user: &UserRank, rankings: &[UserRank]) -> CompetitiveInsight {
    let total = rankings.len().max(1) as f64;
    let fraction = user.rank as f64 / total * 100.0;
    let position_insight = if fraction <= 10.0 {
        "You are in the top rankings!"
    } else if fraction <= 50.0 {
        "Top half! Keep the momentum going."
    } else if fraction <= 80.0 {
        "Keep grinding to reach the top 50%!"
    } else {
        "Every message counts, start climbing!"
    };

    let above = rankings.iter().find(|r| r.rank + 1 == user.rank);

    CompetitiveInsight {
        position_insight: position_insight.to_string(),
        next_target_score: above.map(|r| r.score).unwrap_or(0),
        next_target_user: above.map(|r| r.user_id.clone()),
        percentile_rank: (100.0 - fraction).round().clamp(0.0, 100.0) as u8,
    }
}
