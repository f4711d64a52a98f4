//! Mastery levels
//!
//! Five levels with fixed XP thresholds, the skills each level unlocks and
//! the rewards paid on reaching it.

use serde::Serialize;

/// Mastery level of a single tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MasteryLevel {
    Novice,
    Expert,
    Master,
    Legendary,
    Mythic,
}

/// Reward category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RewardKind {
    Badge,
    Cosmetic,
    Points,
    Feature,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelReward {
    pub kind: RewardKind,
    pub value: &'static str,
    /// Bonus points paid to the ledger (0 for non-point rewards)
    pub points: u64,
    pub description: &'static str,
}

const fn reward(kind: RewardKind, value: &'static str, description: &'static str) -> LevelReward {
    LevelReward {
        kind,
        value,
        points: 0,
        description,
    }
}

const fn points(amount: u64, description: &'static str) -> LevelReward {
    LevelReward {
        kind: RewardKind::Points,
        value: "bonus-points",
        points: amount,
        description,
    }
}

/// XP needed for each level, indexed by level
pub const THRESHOLDS: [u64; 5] = [0, 1_000, 5_000, 15_000, 50_000];

static NOVICE_REWARDS: &[LevelReward] =
    &[reward(RewardKind::Badge, "novice-badge", "Novice Badge")];

static EXPERT_REWARDS: &[LevelReward] = &[
    reward(RewardKind::Badge, "expert-badge", "Expert Badge"),
    points(500, "500 Bonus Points"),
    reward(RewardKind::Cosmetic, "expert-frame", "Expert Profile Frame"),
];

static MASTER_REWARDS: &[LevelReward] = &[
    reward(RewardKind::Badge, "master-badge", "Master Badge"),
    points(1_500, "1500 Bonus Points"),
    reward(RewardKind::Cosmetic, "master-frame", "Master Profile Frame"),
    reward(RewardKind::Feature, "mastery-showcase", "Featured on Leaderboard"),
];

static LEGENDARY_REWARDS: &[LevelReward] = &[
    reward(RewardKind::Badge, "legendary-badge", "Legendary Badge"),
    points(3_000, "3000 Bonus Points"),
    reward(RewardKind::Cosmetic, "legendary-frame", "Legendary Profile Frame"),
    reward(RewardKind::Cosmetic, "legendary-glow", "Legendary Glow Effect"),
    reward(RewardKind::Feature, "exclusive-challenges", "Exclusive Challenges"),
];

static MYTHIC_REWARDS: &[LevelReward] = &[
    reward(RewardKind::Badge, "mythic-badge", "Mythic Badge"),
    points(10_000, "10000 Bonus Points"),
    reward(RewardKind::Cosmetic, "mythic-frame", "Mythic Profile Frame"),
    reward(RewardKind::Cosmetic, "mythic-glow", "Mythic Ultimate Glow"),
    reward(RewardKind::Feature, "mythic-status", "Mythic Status Badge"),
    reward(RewardKind::Feature, "legendary-mentor", "Can Mentor Other Users"),
];

impl MasteryLevel {
    pub const ALL: [MasteryLevel; 5] = [
        Self::Novice,
        Self::Expert,
        Self::Master,
        Self::Legendary,
        Self::Mythic,
    ];

    /// 0 (novice) through 4 (mythic)
    pub fn index(&self) -> u8 {
        match self {
            Self::Novice => 0,
            Self::Expert => 1,
            Self::Master => 2,
            Self::Legendary => 3,
            Self::Mythic => 4,
        }
    }

    pub fn from_index(index: u8) -> Option<Self> {
        Self::ALL.get(index as usize).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Novice => "novice",
            Self::Expert => "expert",
            Self::Master => "master",
            Self::Legendary => "legendary",
            Self::Mythic => "mythic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "novice" => Some(Self::Novice),
            "expert" => Some(Self::Expert),
            "master" => Some(Self::Master),
            "legendary" => Some(Self::Legendary),
            "mythic" => Some(Self::Mythic),
            _ => None,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::Novice => "Novice",
            Self::Expert => "Expert",
            Self::Master => "Master",
            Self::Legendary => "Legendary",
            Self::Mythic => "Mythic",
        }
    }

    pub fn required_xp(&self) -> u64 {
        THRESHOLDS[self.index() as usize]
    }

    pub fn next(&self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }

    /// Skills this level adds on top of the levels below it
    pub fn skills(&self) -> &'static [&'static str] {
        match self {
            Self::Novice => &["basic-stats", "usage-tracking"],
            Self::Expert => &["advanced-stats", "strategy-tips", "performance-metrics"],
            Self::Master => &[
                "expert-analysis",
                "personalized-challenges",
                "mastery-showcase",
            ],
            Self::Legendary => &["elite-community", "exclusive-events", "coaching-mode"],
            Self::Mythic => &[
                "all-features",
                "legendary-mentor",
                "exclusive-cosmetics",
                "vip-support",
            ],
        }
    }

    pub fn rewards(&self) -> &'static [LevelReward] {
        match self {
            Self::Novice => NOVICE_REWARDS,
            Self::Expert => EXPERT_REWARDS,
            Self::Master => MASTER_REWARDS,
            Self::Legendary => LEGENDARY_REWARDS,
            Self::Mythic => MYTHIC_REWARDS,
        }
    }

    /// Bonus points paid on reaching this level
    pub fn reward_points(&self) -> u64 {
        self.rewards().iter().map(|r| r.points).sum()
    }
}

/// Level for a total XP amount: thresholds at or below `xp`, minus one
pub fn level_of(total_xp: u64) -> MasteryLevel {
    let reached = THRESHOLDS.iter().filter(|t| **t <= total_xp).count();
    MasteryLevel::from_index(reached.saturating_sub(1) as u8).unwrap_or(MasteryLevel::Novice)
}

/// Every skill unlocked at `level`, lower levels included, in unlock order
pub fn skills_at(level: MasteryLevel) -> Vec<&'static str> {
    let mut skills: Vec<&'static str> = Vec::new();
    for l in MasteryLevel::ALL.iter().take(level.index() as usize + 1) {
        for skill in l.skills() {
            if !skills.contains(skill) {
                skills.push(*skill);
            }
        }
    }
    skills
}

/// Position of a tool inside its current level
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryProgress {
    pub current_level: MasteryLevel,
    pub next_level: Option<MasteryLevel>,
    pub xp_into_level: u64,
    /// Width of the current level; 0 at the top level
    pub xp_for_level: u64,
    /// 0-100
    pub percent: f64,
}

pub fn progress(total_xp: u64) -> MasteryProgress {
    let current_level = level_of(total_xp);
    let next_level = current_level.next();
    let xp_into_level = total_xp - current_level.required_xp();

    match next_level {
        Some(next) => {
            let xp_for_level = next.required_xp() - current_level.required_xp();
            MasteryProgress {
                current_level,
                next_level,
                xp_into_level,
                xp_for_level,
                percent: (xp_into_level as f64 * 100.0 / xp_for_level as f64).min(100.0),
            }
        }
        None => MasteryProgress {
            current_level,
            next_level: None,
            xp_into_level,
            xp_for_level: 0,
            percent: 100.0,
        },
    }
}

/// XP still missing for the next level (0 at the top level)
pub fn xp_to_next_level(total_xp: u64) -> u64 {
    level_of(total_xp)
        .next()
        .map(|next| next.required_xp().saturating_sub(total_xp))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_of() {
        assert_eq!(level_of(0), MasteryLevel::Novice);
        assert_eq!(level_of(999), MasteryLevel::Novice);
        assert_eq!(level_of(1_000), MasteryLevel::Expert);
        assert_eq!(level_of(5_000), MasteryLevel::Master);
        assert_eq!(level_of(49_999), MasteryLevel::Legendary);
        assert_eq!(level_of(50_000), MasteryLevel::Mythic);
        assert_eq!(level_of(1_000_000), MasteryLevel::Mythic); // beyond max
    }

    #[test]
    fn test_progress_inside_level() {
        let p = progress(3_000);
        assert_eq!(p.current_level, MasteryLevel::Expert);
        assert_eq!(p.next_level, Some(MasteryLevel::Master));
        assert_eq!(p.xp_into_level, 2_000);
        assert_eq!(p.xp_for_level, 4_000);
        assert_eq!(p.percent, 50.0);
        assert_eq!(xp_to_next_level(3_000), 2_000);
    }

    #[test]
    fn test_progress_at_top_level() {
        let p = progress(60_000);
        assert_eq!(p.current_level, MasteryLevel::Mythic);
        assert!(p.next_level.is_none());
        assert_eq!(p.percent, 100.0);
        assert_eq!(xp_to_next_level(60_000), 0);
    }

    #[test]
    fn test_skills_accumulate() {
        let novice = skills_at(MasteryLevel::Novice);
        let expert = skills_at(MasteryLevel::Expert);
        assert_eq!(novice, vec!["basic-stats", "usage-tracking"]);
        assert_eq!(expert.len(), 5);
        assert!(novice.iter().all(|s| expert.contains(s)));
        assert_eq!(skills_at(MasteryLevel::Mythic).len(), 15);
    }

    #[test]
    fn test_reward_points() {
        assert_eq!(MasteryLevel::Novice.reward_points(), 0);
        assert_eq!(MasteryLevel::Expert.reward_points(), 500);
        assert_eq!(MasteryLevel::Master.reward_points(), 1_500);
        assert_eq!(MasteryLevel::Legendary.reward_points(), 3_000);
        assert_eq!(MasteryLevel::Mythic.reward_points(), 10_000);
    }
}
