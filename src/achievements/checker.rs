//! Achievement checking logic
//!
//! `evaluate` is pure: the same catalog, metrics and unlock set always yield
//! the same results.

use std::collections::BTreeSet;

use serde::Serialize;

use super::catalog::Catalog;
use super::definitions::{AchievementDefinition, Category, Requirement};
use crate::metrics::UserMetrics;

/// Evaluation of one achievement against one metrics snapshot
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementCheckResult {
    pub id: String,
    pub unlocked: bool,
    /// 0-100, exactly 100 iff unlocked
    pub progress: f64,
    pub current_value: u64,
    pub target_value: u64,
}

/// Points owed for a fresh unlock
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointGrant {
    pub amount: u64,
    /// The achievement id
    pub reason: String,
}

fn percent(current: u64, target: u64) -> f64 {
    if target == 0 || current >= target {
        return 100.0;
    }
    (current as f64 * 100.0 / target as f64).clamp(0.0, 100.0)
}

/// Measure a single requirement: (unlocked, progress, current, target)
fn measure(
    requirement: &Requirement,
    metrics: &UserMetrics,
    unlocked_count: u64,
) -> (bool, f64, u64, u64) {
    let threshold = |current: u64, target: u64| {
        (current >= target, percent(current, target), current, target)
    };

    match requirement {
        Requirement::TotalMessages { target } => threshold(metrics.total_messages, *target),
        Requirement::UniqueAgents { target } => {
            threshold(metrics.agents_used.len() as u64, *target)
        }
        Requirement::ActiveDuringHours { start, end } => {
            let active = metrics.active_hours_between(*start, *end);
            let done = active > 0;
            (done, if done { 100.0 } else { 0.0 }, active, 1)
        }
        Requirement::ActiveDays { target } => threshold(metrics.active_days(), *target),
        Requirement::AverageQuality { target } => {
            threshold(metrics.average_quality() as u64, *target)
        }
        Requirement::PerfectResponses { target } => {
            threshold(metrics.perfect_response_count, *target)
        }
        Requirement::HighScores { target } => threshold(metrics.high_score_count, *target),
        Requirement::QualityResponses { target } => {
            threshold(metrics.quality_responses(), *target)
        }
        Requirement::CurrentStreak { target } => threshold(metrics.current_streak, *target),
        Requirement::LongestStreak { target } => threshold(metrics.longest_streak, *target),
        Requirement::CompletedChallenges { target } => {
            threshold(metrics.completed_challenges_count, *target)
        }
        Requirement::LongestConversation { target } => {
            threshold(metrics.longest_conversation, *target)
        }
        Requirement::MessagesInOneDay { target } => {
            threshold(metrics.max_messages_in_a_day(), *target)
        }
        Requirement::ToolsAtMastery { level, target } => {
            threshold(metrics.agents_at_mastery(*level), *target)
        }
        Requirement::TotalPoints { target } => threshold(metrics.total_points(), *target),
        Requirement::QualityOverVolume {
            min_messages,
            min_quality,
        } => {
            let quality = metrics.average_quality() as u64;
            let volume_ok = metrics.total_messages >= *min_messages;
            let quality_ok = quality >= *min_quality;
            let volume_progress = percent(metrics.total_messages, *min_messages);
            let quality_progress = percent(quality, *min_quality);
            // Report the side holding the unlock back
            let volume_is_weaker =
                !volume_ok && (quality_ok || volume_progress <= quality_progress);
            let (current, target) = if volume_is_weaker {
                (metrics.total_messages, *min_messages)
            } else {
                (quality, *min_quality)
            };
            (
                volume_ok && quality_ok,
                volume_progress.min(quality_progress),
                current,
                target,
            )
        }
        Requirement::AgentHighScores { agent, target } => {
            threshold(metrics.agent_high_scores(agent), *target)
        }
        Requirement::AgentUsage { agent, target } => threshold(metrics.agent_usage(agent), *target),
        Requirement::UnlockedAchievements { target } => threshold(unlocked_count, *target),
    }
}

/// Evaluate one definition.
///
/// An id already in `already_unlocked` stays unlocked at 100 regardless of
/// the current counters.
pub fn check(
    definition: &AchievementDefinition,
    metrics: &UserMetrics,
    already_unlocked: &BTreeSet<String>,
) -> AchievementCheckResult {
    let (unlocked, progress, current_value, target_value) =
        measure(&definition.requirement, metrics, already_unlocked.len() as u64);

    if already_unlocked.contains(&definition.id) {
        return AchievementCheckResult {
            id: definition.id.clone(),
            unlocked: true,
            progress: 100.0,
            current_value,
            target_value,
        };
    }

    AchievementCheckResult {
        id: definition.id.clone(),
        unlocked,
        progress: if unlocked { 100.0 } else { progress.min(99.99) },
        current_value,
        target_value,
    }
}

/// Evaluate every definition in catalog order
pub fn evaluate(
    catalog: &Catalog,
    metrics: &UserMetrics,
    already_unlocked: &BTreeSet<String>,
) -> Vec<AchievementCheckResult> {
    catalog
        .iter()
        .map(|def| check(def, metrics, already_unlocked))
        .collect()
}

/// Results that are unlocked now but were not before
pub fn newly_unlocked<'a>(
    results: &'a [AchievementCheckResult],
    already_unlocked: &BTreeSet<String>,
) -> Vec<&'a AchievementCheckResult> {
    results
        .iter()
        .filter(|r| r.unlocked && !already_unlocked.contains(&r.id))
        .collect()
}

/// Point grants for fresh unlocks, rarity multiplier applied
pub fn unlock_grants(catalog: &Catalog, fresh: &[&AchievementCheckResult]) -> Vec<PointGrant> {
    fresh
        .iter()
        .filter_map(|r| catalog.get(&r.id))
        .map(|def| PointGrant {
            amount: def.reward_points(),
            reason: def.id.clone(),
        })
        .collect()
}

/// Results that belong to `category`
pub fn by_category<'a>(
    catalog: &Catalog,
    results: &'a [AchievementCheckResult],
    category: Category,
) -> Vec<&'a AchievementCheckResult> {
    results
        .iter()
        .filter(|r| catalog.get(&r.id).is_some_and(|d| d.category == category))
        .collect()
}

/// Share of unlocked achievements, rounded, 0-100
pub fn completion_percentage(results: &[AchievementCheckResult]) -> u8 {
    if results.is_empty() {
        return 0;
    }
    let unlocked = results.iter().filter(|r| r.unlocked).count();
    ((unlocked as f64 / results.len() as f64) * 100.0).round() as u8
}

/// Locked achievements closest to completion, best first
pub fn closest_to_unlock(results: &[AchievementCheckResult], limit: usize) -> Vec<&AchievementCheckResult> {
    let mut locked: Vec<_> = results.iter().filter(|r| !r.unlocked).collect();
    locked.sort_by(|a, b| {
        b.progress
            .partial_cmp(&a.progress)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    locked.truncate(limit);
    locked
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn metrics() -> UserMetrics {
        UserMetrics::new("u1", Utc::now())
    }

    fn result<'a>(results: &'a [AchievementCheckResult], id: &str) -> &'a AchievementCheckResult {
        results.iter().find(|r| r.id == id).unwrap()
    }

    #[test]
    fn test_first_message_unlocks_first_agent() {
        let mut m = metrics();
        m.total_messages = 1;
        m.agents_used.insert("einstein".to_string());

        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        let first = result(&results, "first-agent");
        assert!(first.unlocked);
        assert_eq!(first.progress, 100.0);

        let collector = result(&results, "all-agents-tried");
        assert!(!collector.unlocked);
        assert!((collector.progress - 5.555).abs() < 0.01);
        assert_eq!(collector.target_value, 18);
    }

    #[test]
    fn test_boolean_requirement_is_all_or_nothing() {
        let mut m = metrics();
        m.usage_by_hour.insert(14, 30);
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        assert_eq!(result(&results, "early-bird").progress, 0.0);

        m.usage_by_hour.insert(7, 1);
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        let early = result(&results, "early-bird");
        assert!(early.unlocked);
        assert_eq!(early.progress, 100.0);
        // 7 AM is outside the night-owl window
        assert!(!result(&results, "night-owl").unlocked);
    }

    #[test]
    fn test_quality_over_volume_takes_weaker_side() {
        let mut m = metrics();
        m.total_messages = 25;
        m.perfect_response_count = 25;
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        let all_rounder = result(&results, "all-rounder");
        // quality 100%, volume 50%
        assert!(!all_rounder.unlocked);
        assert_eq!(all_rounder.progress, 50.0);
        assert_eq!(all_rounder.current_value, 25);
        assert_eq!(all_rounder.target_value, 50);
        assert!(all_rounder.current_value < all_rounder.target_value);

        // enough volume, quality now 30%
        m.total_messages = 100;
        m.perfect_response_count = 30;
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        let all_rounder = result(&results, "all-rounder");
        assert!(!all_rounder.unlocked);
        assert_eq!(all_rounder.current_value, 30);
        assert!(all_rounder.current_value < all_rounder.target_value);

        m.total_messages = 50;
        m.high_score_count = 15;
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        let all_rounder = result(&results, "all-rounder");
        assert!(all_rounder.unlocked);
        assert!(all_rounder.current_value >= all_rounder.target_value);
    }

    #[test]
    fn test_per_agent_requirement() {
        let mut m = metrics();
        m.per_agent_high_score_count.insert("einstein".to_string(), 5);
        m.per_agent_high_score_count.insert("comedy-king".to_string(), 4);
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        assert!(result(&results, "wisdom-seeker").unlocked);
        assert!(!result(&results, "comedy-gold").unlocked);
        assert_eq!(result(&results, "comedy-gold").progress, 80.0);
    }

    #[test]
    fn test_persisted_unlock_survives_metric_drop() {
        let mut m = metrics();
        m.total_messages = 10;
        m.perfect_response_count = 9;
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        assert!(result(&results, "quality-seeker").unlocked);

        let unlocked: BTreeSet<String> = newly_unlocked(&results, &BTreeSet::new())
            .into_iter()
            .map(|r| r.id.clone())
            .collect();

        // quality falls to 9%
        m.total_messages = 100;
        let results = evaluate(Catalog::builtin(), &m, &unlocked);
        let seeker = result(&results, "quality-seeker");
        assert!(seeker.unlocked);
        assert_eq!(seeker.progress, 100.0);
        assert!(newly_unlocked(&results, &unlocked).iter().all(|r| r.id != "quality-seeker"));
    }

    #[test]
    fn test_unlock_grants_apply_rarity() {
        let mut m = metrics();
        m.total_messages = 100;
        let results = evaluate(Catalog::builtin(), &m, &BTreeSet::new());
        let fresh = newly_unlocked(&results, &BTreeSet::new());
        let grants = unlock_grants(Catalog::builtin(), &fresh);

        let first = grants.iter().find(|g| g.reason == "first-agent").unwrap();
        assert_eq!(first.amount, 10);
        // uncommon 25 * 1.5
        let hundred = grants.iter().find(|g| g.reason == "explore-100-messages").unwrap();
        assert_eq!(hundred.amount, 37);
    }

    #[test]
    fn test_unlocked_achievements_counts_existing_unlocks() {
        let catalog = Catalog::builtin();
        let already: BTreeSet<String> = catalog
            .iter()
            .take(30)
            .map(|d| d.id.clone())
            .collect();
        let results = evaluate(catalog, &metrics(), &already);
        assert!(result(&results, "achievement-hunter").unlocked);
    }

    #[test]
    fn test_category_and_completion_helpers() {
        let catalog = Catalog::builtin();
        let mut m = metrics();
        m.total_messages = 1;
        let results = evaluate(catalog, &m, &BTreeSet::new());

        let legend = by_category(catalog, &results, Category::Legend);
        assert_eq!(legend.len(), catalog.by_category(Category::Legend).len());
        // 1 of 35
        assert_eq!(completion_percentage(&results), 3);
        assert_eq!(completion_percentage(&[]), 0);

        let closest = closest_to_unlock(&results, 3);
        assert_eq!(closest.len(), 3);
        assert!(closest.iter().all(|r| !r.unlocked));
    }
}
