//! Leaderboard tiers
//!
//! `tier_of` is a step function over fixed, strictly increasing minimum
//! scores, so a higher score never maps to a lower tier.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tier band of a leaderboard score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TierName {
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl TierName {
    pub const ALL: [TierName; 5] = [
        Self::Bronze,
        Self::Silver,
        Self::Gold,
        Self::Platinum,
        Self::Diamond,
    ];

    pub fn index(&self) -> u8 {
        match self {
            Self::Bronze => 0,
            Self::Silver => 1,
            Self::Gold => 2,
            Self::Platinum => 3,
            Self::Diamond => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bronze => "bronze",
            Self::Silver => "silver",
            Self::Gold => "gold",
            Self::Platinum => "platinum",
            Self::Diamond => "diamond",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "bronze" => Some(Self::Bronze),
            "silver" => Some(Self::Silver),
            "gold" => Some(Self::Gold),
            "platinum" => Some(Self::Platinum),
            "diamond" => Some(Self::Diamond),
            _ => None,
        }
    }

    pub fn threshold(&self) -> &'static TierThreshold {
        &TIERS[self.index() as usize]
    }

    pub fn next(&self) -> Option<TierName> {
        Self::ALL.get(self.index() as usize + 1).copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TierRewardKind {
    Badge,
    Theme,
    Cosmetic,
    Points,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierReward {
    pub kind: TierRewardKind,
    pub value: &'static str,
    pub points: u64,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierThreshold {
    pub tier: TierName,
    pub min_score: u64,
    pub rewards: &'static [TierReward],
}

impl TierThreshold {
    pub fn reward_points(&self) -> u64 {
        self.rewards.iter().map(|r| r.points).sum()
    }
}

const fn tr(kind: TierRewardKind, value: &'static str, description: &'static str) -> TierReward {
    TierReward {
        kind,
        value,
        points: 0,
        description,
    }
}

const fn bonus(points: u64, description: &'static str) -> TierReward {
    TierReward {
        kind: TierRewardKind::Points,
        value: "bonus-points",
        points,
        description,
    }
}

/// All tiers, sorted by minimum score
pub static TIERS: [TierThreshold; 5] = [
    TierThreshold {
        tier: TierName::Bronze,
        min_score: 0,
        rewards: &[
            tr(TierRewardKind::Badge, "bronze-medal", "Bronze Medal Badge"),
            tr(TierRewardKind::Theme, "bronze-theme", "Bronze Theme"),
        ],
    },
    TierThreshold {
        tier: TierName::Silver,
        min_score: 1_000,
        rewards: &[
            tr(TierRewardKind::Badge, "silver-medal", "Silver Medal Badge"),
            tr(TierRewardKind::Theme, "silver-theme", "Silver Theme"),
            bonus(500, "500 Bonus Points"),
        ],
    },
    TierThreshold {
        tier: TierName::Gold,
        min_score: 5_000,
        rewards: &[
            tr(TierRewardKind::Badge, "gold-medal", "Gold Medal Badge"),
            tr(TierRewardKind::Theme, "gold-theme", "Gold Theme"),
            bonus(1_000, "1000 Bonus Points"),
            tr(TierRewardKind::Cosmetic, "gold-frame", "Gold Profile Frame"),
        ],
    },
    TierThreshold {
        tier: TierName::Platinum,
        min_score: 15_000,
        rewards: &[
            tr(TierRewardKind::Badge, "platinum-medal", "Platinum Medal Badge"),
            tr(TierRewardKind::Theme, "platinum-theme", "Platinum Theme"),
            bonus(2_000, "2000 Bonus Points"),
            tr(TierRewardKind::Cosmetic, "platinum-frame", "Platinum Profile Frame"),
            tr(TierRewardKind::Cosmetic, "platinum-badge", "Platinum Badge Animated"),
        ],
    },
    TierThreshold {
        tier: TierName::Diamond,
        min_score: 50_000,
        rewards: &[
            tr(TierRewardKind::Badge, "diamond-medal", "Diamond Medal Badge"),
            tr(TierRewardKind::Theme, "diamond-theme", "Diamond Theme"),
            bonus(5_000, "5000 Bonus Points"),
            tr(TierRewardKind::Cosmetic, "diamond-frame", "Diamond Profile Frame"),
            tr(TierRewardKind::Cosmetic, "diamond-badge", "Diamond Badge Animated"),
            tr(TierRewardKind::Cosmetic, "diamond-glow", "Diamond Glow Effect"),
        ],
    },
];

pub fn tier_of(score: u64) -> TierName {
    TIERS
        .iter()
        .rev()
        .find(|t| score >= t.min_score)
        .map(|t| t.tier)
        .unwrap_or(TierName::Bronze)
}

/// Threshold of the tier above `tier` (None at the top)
pub fn next_tier(tier: TierName) -> Option<&'static TierThreshold> {
    tier.next().map(|t| t.threshold())
}

pub fn points_until_next_tier(score: u64) -> u64 {
    next_tier(tier_of(score))
        .map(|next| next.min_score.saturating_sub(score))
        .unwrap_or(0)
}

/// Progress through the current tier band, 0-100 (100 at the top tier)
pub fn tier_progress(score: u64) -> f64 {
    let current = tier_of(score).threshold();
    let Some(next) = next_tier(current.tier) else {
        return 100.0;
    };
    let span = (next.min_score - current.min_score) as f64;
    ((score - current.min_score) as f64 * 100.0 / span).clamp(0.0, 100.0)
}

/// Count of entries per tier, every tier present
pub fn tier_distribution<'a>(tiers: impl IntoIterator<Item = &'a TierName>) -> BTreeMap<TierName, usize> {
    let mut distribution: BTreeMap<TierName, usize> =
        TierName::ALL.iter().map(|t| (*t, 0)).collect();
    for tier in tiers {
        *distribution.entry(*tier).or_insert(0) += 1;
    }
    distribution
}
