//! Weekly report over a trailing seven day window

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::achievements::AchievementUnlock;
use crate::ledger::{LedgerTransaction, TransactionKind};

pub const REPORT_DAYS: i64 = 7;

/// A completed challenge, as recorded by the event pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeCompletion {
    pub user_id: String,
    pub challenge_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Earn plus bonus
    pub points_earned: u64,
    pub points_spent: u64,
    pub points_refunded: u64,
    pub spends: u64,
    pub challenges_completed: u64,
    pub achievements_unlocked: u64,
    /// Earned points over seven days, rounded
    pub average_daily_points: u64,
    pub highlights: Vec<String>,
}

/// Fold everything in `(now - 7 days, now]` into a report
pub fn weekly_report(
    transactions: &[LedgerTransaction],
    completions: &[ChallengeCompletion],
    unlocks: &[AchievementUnlock],
    now: DateTime<Utc>,
) -> WeeklyReport {
    let window_start = now - Duration::days(REPORT_DAYS);
    let in_window = |ts: &DateTime<Utc>| *ts > window_start && *ts <= now;

    let mut points_earned = 0u64;
    let mut points_spent = 0u64;
    let mut points_refunded = 0u64;
    let mut spends = 0u64;
    for t in transactions.iter().filter(|t| in_window(&t.timestamp)) {
        match t.kind {
            TransactionKind::Earn | TransactionKind::Bonus => {
                points_earned = points_earned.saturating_add(t.amount)
            }
            TransactionKind::Spend => {
                points_spent = points_spent.saturating_add(t.amount);
                spends += 1;
            }
            TransactionKind::Refund => {
                points_refunded = points_refunded.saturating_add(t.amount)
            }
        }
    }

    let challenges_completed = completions
        .iter()
        .filter(|c| in_window(&c.completed_at))
        .count() as u64;
    let achievements_unlocked = unlocks
        .iter()
        .filter(|u| in_window(&u.unlocked_at))
        .count() as u64;

    let mut highlights = Vec::new();
    if challenges_completed >= 21 {
        highlights.push("Daily Challenge Master".to_string());
    }
    if points_earned > 5_000 {
        highlights.push("Major Point Earner".to_string());
    }
    if achievements_unlocked >= 5 {
        highlights.push("Achievement Spree".to_string());
    }
    if spends >= 3 {
        highlights.push("Shop Enthusiast".to_string());
    }

    WeeklyReport {
        window_start,
        window_end: now,
        points_earned,
        points_spent,
        points_refunded,
        spends,
        challenges_completed,
        achievements_unlocked,
        average_daily_points: (points_earned as f64 / REPORT_DAYS as f64).round() as u64,
        highlights,
    }
}
