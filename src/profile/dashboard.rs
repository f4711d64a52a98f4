//! Dashboard snapshot: headline numbers, next milestones, recommendations

use serde::Serialize;

use crate::achievements::AchievementUnlock;
use crate::leaderboard::{TierName, UserRank, next_tier, tier_of};
use crate::mastery::{ToolMastery, recommended_focus};
use crate::metrics::UserMetrics;

pub const ACHIEVEMENT_MILESTONE: u64 = 30;
pub const POINTS_MILESTONE: u64 = 10_000;
pub const STREAK_MILESTONE: u64 = 30;
const RECENT_UNLOCKS: usize = 5;
const FOCUS_TOOLS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum MilestoneKind {
    Achievements,
    Points,
    Streak,
    Tier,
}

/// Distance to a fixed target
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub kind: MilestoneKind,
    pub label: String,
    pub current: u64,
    pub target: u64,
    pub remaining: u64,
    /// 0-100
    pub progress: f64,
}

impl Milestone {
    fn new(kind: MilestoneKind, label: impl Into<String>, current: u64, target: u64) -> Self {
        let progress = if target == 0 {
            100.0
        } else {
            (current as f64 * 100.0 / target as f64).min(100.0)
        };
        Self {
            kind,
            label: label.into(),
            current,
            target,
            remaining: target.saturating_sub(current),
            progress,
        }
    }
}

/// Everything the dashboard is folded from
#[derive(Debug, Clone, Copy)]
pub struct DashboardInput<'a> {
    pub metrics: &'a UserMetrics,
    pub unlocks: &'a [AchievementUnlock],
    pub tools: &'a [ToolMastery],
    pub balance: i64,
    /// Position on the total-points board, if ranked
    pub rank: Option<&'a UserRank>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub user_id: String,
    pub total_points: u64,
    pub balance: i64,
    pub badge_count: u64,
    pub current_streak: u64,
    pub longest_streak: u64,
    pub rank: Option<u32>,
    pub tier: TierName,
    pub mastered_tools: u64,
    /// Tools with the most room to grow
    pub focus_tools: Vec<String>,
    pub next_milestones: Vec<Milestone>,
    pub recommendations: Vec<String>,
    /// Newest first
    pub recent_unlocks: Vec<AchievementUnlock>,
    pub motivation: String,
}

pub fn dashboard(input: DashboardInput<'_>) -> Dashboard {
    let metrics = input.metrics;
    let total_points = metrics.total_points();
    let badge_count = input.unlocks.len() as u64;
    let current_streak = metrics.current_streak;
    let tier = tier_of(total_points);

    let mut next_milestones = vec![
        Milestone::new(
            MilestoneKind::Achievements,
            "Achievements",
            badge_count,
            ACHIEVEMENT_MILESTONE,
        ),
        Milestone::new(MilestoneKind::Points, "Points", total_points, POINTS_MILESTONE),
        Milestone::new(
            MilestoneKind::Streak,
            "Streak",
            current_streak,
            STREAK_MILESTONE,
        ),
    ];
    if let Some(next) = next_tier(tier) {
        next_milestones.push(Milestone::new(
            MilestoneKind::Tier,
            format!("{} tier", next.tier.as_str()),
            total_points,
            next.min_score,
        ));
    }

    let rank = input.rank.map(|r| r.rank);
    let mut recent_unlocks = input.unlocks.to_vec();
    recent_unlocks.sort_by(|a, b| {
        b.unlocked_at
            .cmp(&a.unlocked_at)
            .then_with(|| a.achievement_id.cmp(&b.achievement_id))
    });
    recent_unlocks.truncate(RECENT_UNLOCKS);

    Dashboard {
        user_id: metrics.user_id.clone(),
        total_points,
        balance: input.balance,
        badge_count,
        current_streak,
        longest_streak: metrics.longest_streak,
        rank,
        tier,
        mastered_tools: input.tools.iter().filter(|t| t.is_mastered()).count() as u64,
        focus_tools: recommended_focus(input.tools, FOCUS_TOOLS)
            .into_iter()
            .map(|t| t.tool_id.clone())
            .collect(),
        next_milestones,
        recommendations: recommendations(current_streak, badge_count, total_points, rank),
        recent_unlocks,
        motivation: motivation(total_points, badge_count, current_streak).to_string(),
    }
}

pub fn recommendations(
    current_streak: u64,
    badge_count: u64,
    total_points: u64,
    rank: Option<u32>,
) -> Vec<String> {
    let mut out = Vec::new();
    if current_streak < 7 {
        out.push("Build a streak: complete the daily challenges every day.".to_string());
    }
    if badge_count < 10 {
        out.push("Unlock more badges to boost your achievement count.".to_string());
    }
    if total_points < 1_000 {
        out.push("Earn more points to unlock shop items.".to_string());
    }
    if rank.is_some_and(|r| r > 100) {
        out.push("Climb the leaderboard: the top 100 is within reach.".to_string());
    }
    out
}

/// First matching line wins, checked from beginner to veteran
pub fn motivation(total_points: u64, badge_count: u64, current_streak: u64) -> &'static str {
    if total_points < 500 {
        "You're just getting started! Complete challenges and chat with agents to earn points."
    } else if badge_count < 5 {
        "You're making progress! Unlock more badges to reach the next tier."
    } else if current_streak < 7 {
        "Build momentum! Keep your streak going for bonus rewards."
    } else if total_points < 5_000 {
        "You're halfway there! Keep going to reach the top tier rewards."
    } else if badge_count < ACHIEVEMENT_MILESTONE {
        "You're becoming a legend! Collect more badges to reach collector status."
    } else {
        "You've reached legendary status! Keep up the excellence."
    }
}
