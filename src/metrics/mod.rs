//! Per-user usage metrics
//!
//! `UserMetrics` is the raw counter snapshot every engine reads. It is written
//! only by the event pipeline (`events::apply_event`) and by metric patches;
//! everything else derives from it through `UserMetrics::computed`.
//!
//! Map reads always go through the accessors below, which make the
//! zero-default for a missing key explicit.

mod events;
mod streaks;
mod time_bucket;

pub use events::{EventEffect, EventKind, Interaction, MetricsEvent, apply_event};
pub use streaks::{StreakChange, challenge_streak, record_activity_day};
pub use time_bucket::{day_bucket, hour_bucket, parse_day_bucket};

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Messages per agent needed for one usage-mastery step
pub const USAGE_PER_MASTERY_STEP: u64 = 10;

/// Highest usage-mastery step an agent can reach
pub const MAX_USAGE_MASTERY: u8 = 5;

/// Largest value a patch or event field may set a counter to
pub const MAX_COUNTER: u64 = 1_000_000_000_000;

/// Raw per-user counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMetrics {
    pub user_id: String,

    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub perfect_response_count: u64,
    #[serde(default)]
    pub high_score_count: u64,
    #[serde(default)]
    pub completed_challenges_count: u64,
    #[serde(default)]
    pub longest_conversation: u64,
    #[serde(default)]
    pub current_streak: u64,
    #[serde(default)]
    pub longest_streak: u64,

    #[serde(default)]
    pub agents_used: BTreeSet<String>,
    /// Hour of day (0-23, UTC) -> messages
    #[serde(default)]
    pub usage_by_hour: BTreeMap<u8, u64>,
    /// Day bucket ("YYYY-MM-DD") -> messages
    #[serde(default)]
    pub usage_by_day: BTreeMap<String, u64>,
    #[serde(default)]
    pub per_agent_high_score_count: BTreeMap<String, u64>,
    #[serde(default)]
    pub per_agent_usage_count: BTreeMap<String, u64>,

    /// Last day with a message, drives the usage streak
    #[serde(default)]
    pub last_active_day: Option<NaiveDate>,
    /// Messages in the currently open conversation
    #[serde(default)]
    pub current_session_turns: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Values derived from the counters, never stored
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedMetrics {
    /// Share of quality responses, 0-100
    pub average_quality: f64,
    pub total_points: u64,
    /// Agent id -> usage mastery step (0-5)
    pub agent_mastery_level: BTreeMap<String, u8>,
    pub active_days: u64,
    pub active_hours: u64,
}

impl UserMetrics {
    /// Empty metrics for a user seen for the first time
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            total_messages: 0,
            perfect_response_count: 0,
            high_score_count: 0,
            completed_challenges_count: 0,
            longest_conversation: 0,
            current_streak: 0,
            longest_streak: 0,
            agents_used: BTreeSet::new(),
            usage_by_hour: BTreeMap::new(),
            usage_by_day: BTreeMap::new(),
            per_agent_high_score_count: BTreeMap::new(),
            per_agent_usage_count: BTreeMap::new(),
            last_active_day: None,
            current_session_turns: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Messages sent during `hour` (0 when the hour was never active)
    pub fn hour_count(&self, hour: u8) -> u64 {
        self.usage_by_hour.get(&hour).copied().unwrap_or(0)
    }

    /// Messages sent on `day` (0 when the day was never active)
    pub fn day_count(&self, day: &str) -> u64 {
        self.usage_by_day.get(day).copied().unwrap_or(0)
    }

    /// High-score responses from `agent` (0 when none)
    pub fn agent_high_scores(&self, agent: &str) -> u64 {
        self.per_agent_high_score_count
            .get(agent)
            .copied()
            .unwrap_or(0)
    }

    /// Messages sent to `agent` (0 when never used)
    pub fn agent_usage(&self, agent: &str) -> u64 {
        self.per_agent_usage_count.get(agent).copied().unwrap_or(0)
    }

    /// Number of hours in `[start, end)` that saw at least one message
    pub fn active_hours_between(&self, start: u8, end: u8) -> u64 {
        (start..end).filter(|h| self.hour_count(*h) > 0).count() as u64
    }

    /// Days with at least one message
    pub fn active_days(&self) -> u64 {
        self.usage_by_day.values().filter(|c| **c > 0).count() as u64
    }

    /// Busiest single day
    pub fn max_messages_in_a_day(&self) -> u64 {
        self.usage_by_day.values().copied().max().unwrap_or(0)
    }

    pub fn quality_responses(&self) -> u64 {
        self.perfect_response_count
            .saturating_add(self.high_score_count)
    }

    /// Share of quality responses among all messages, rounded, 0-100
    pub fn average_quality(&self) -> f64 {
        if self.total_messages == 0 {
            return 0.0;
        }
        let ratio = self.quality_responses() as f64 / self.total_messages as f64;
        (ratio * 100.0).round().clamp(0.0, 100.0)
    }

    /// Points implied by the counters, saturating at `u64::MAX`
    pub fn total_points(&self) -> u64 {
        [
            (self.total_messages, 10),
            (self.perfect_response_count, 50),
            (self.high_score_count, 25),
            (self.completed_challenges_count, 100),
        ]
        .into_iter()
        .fold(0u64, |sum, (count, weight)| {
            sum.saturating_add(count.saturating_mul(weight))
        })
    }

    /// Usage mastery step for every agent the user has talked to
    pub fn agent_mastery_level(&self) -> BTreeMap<String, u8> {
        self.agents_used
            .iter()
            .map(|agent| {
                let step = (self.agent_usage(agent) / USAGE_PER_MASTERY_STEP)
                    .min(MAX_USAGE_MASTERY as u64) as u8;
                (agent.clone(), step)
            })
            .collect()
    }

    /// Agents whose usage mastery step is at least `level`
    pub fn agents_at_mastery(&self, level: u8) -> u64 {
        self.agent_mastery_level()
            .values()
            .filter(|l| **l >= level)
            .count() as u64
    }

    pub fn computed(&self) -> ComputedMetrics {
        ComputedMetrics {
            average_quality: self.average_quality(),
            total_points: self.total_points(),
            agent_mastery_level: self.agent_mastery_level(),
            active_days: self.active_days(),
            active_hours: self.usage_by_hour.values().filter(|c| **c > 0).count() as u64,
        }
    }
}

/// Partial update for `UserMetrics`
///
/// Merge semantics: absent fields are untouched, map entries are set key by
/// key, and `agentsUsed` is unioned into the existing set.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct MetricsPatch {
    pub total_messages: Option<u64>,
    pub perfect_response_count: Option<u64>,
    pub high_score_count: Option<u64>,
    pub completed_challenges_count: Option<u64>,
    pub longest_conversation: Option<u64>,
    pub current_streak: Option<u64>,
    pub longest_streak: Option<u64>,
    pub agents_used: Option<BTreeSet<String>>,
    pub usage_by_hour: Option<BTreeMap<u8, u64>>,
    pub usage_by_day: Option<BTreeMap<String, u64>>,
    pub per_agent_high_score_count: Option<BTreeMap<String, u64>>,
    pub per_agent_usage_count: Option<BTreeMap<String, u64>>,
}

impl MetricsPatch {
    pub fn is_empty(&self) -> bool {
        self.total_messages.is_none()
            && self.perfect_response_count.is_none()
            && self.high_score_count.is_none()
            && self.completed_challenges_count.is_none()
            && self.longest_conversation.is_none()
            && self.current_streak.is_none()
            && self.longest_streak.is_none()
            && self.agents_used.is_none()
            && self.usage_by_hour.is_none()
            && self.usage_by_day.is_none()
            && self.per_agent_high_score_count.is_none()
            && self.per_agent_usage_count.is_none()
    }

    /// Reject values no event could have produced
    pub fn validate(&self) -> Result<()> {
        let scalars = [
            ("totalMessages", self.total_messages),
            ("perfectResponseCount", self.perfect_response_count),
            ("highScoreCount", self.high_score_count),
            ("completedChallengesCount", self.completed_challenges_count),
            ("longestConversation", self.longest_conversation),
            ("currentStreak", self.current_streak),
            ("longestStreak", self.longest_streak),
        ];
        for (name, value) in scalars {
            check_counter(name, value.unwrap_or(0))?;
        }
        if let Some(hours) = &self.usage_by_hour {
            for count in hours.values() {
                check_counter("usageByHour", *count)?;
            }
        }
        for (name, map) in [
            ("usageByDay", &self.usage_by_day),
            ("perAgentHighScoreCount", &self.per_agent_high_score_count),
            ("perAgentUsageCount", &self.per_agent_usage_count),
        ] {
            for count in map.iter().flat_map(|m| m.values()) {
                check_counter(name, *count)?;
            }
        }

        if let Some(hours) = &self.usage_by_hour {
            if let Some(bad) = hours.keys().find(|h| **h > 23) {
                return Err(crate::GamificationError::Validation(format!(
                    "usageByHour key {} is not an hour of day",
                    bad
                )));
            }
        }
        if let Some(days) = &self.usage_by_day {
            if let Some(bad) = days.keys().find(|d| parse_day_bucket(d).is_none()) {
                return Err(crate::GamificationError::Validation(format!(
                    "usageByDay key '{}' is not a YYYY-MM-DD day",
                    bad
                )));
            }
        }
        Ok(())
    }

    pub fn apply(&self, metrics: &mut UserMetrics, now: DateTime<Utc>) {
        fn set(field: &mut u64, value: Option<u64>) {
            if let Some(v) = value {
                *field = v;
            }
        }
        fn merge<K: Ord + Clone>(target: &mut BTreeMap<K, u64>, patch: &Option<BTreeMap<K, u64>>) {
            if let Some(entries) = patch {
                for (k, v) in entries {
                    target.insert(k.clone(), *v);
                }
            }
        }

        set(&mut metrics.total_messages, self.total_messages);
        set(&mut metrics.perfect_response_count, self.perfect_response_count);
        set(&mut metrics.high_score_count, self.high_score_count);
        set(
            &mut metrics.completed_challenges_count,
            self.completed_challenges_count,
        );
        set(&mut metrics.longest_conversation, self.longest_conversation);
        set(&mut metrics.current_streak, self.current_streak);
        set(&mut metrics.longest_streak, self.longest_streak);
        metrics.longest_streak = metrics.longest_streak.max(metrics.current_streak);

        if let Some(agents) = &self.agents_used {
            metrics.agents_used.extend(agents.iter().cloned());
        }
        merge(&mut metrics.usage_by_hour, &self.usage_by_hour);
        merge(&mut metrics.usage_by_day, &self.usage_by_day);
        merge(
            &mut metrics.per_agent_high_score_count,
            &self.per_agent_high_score_count,
        );
        merge(&mut metrics.per_agent_usage_count, &self.per_agent_usage_count);
        // Usage counts imply the agent was used
        if let Some(usage) = &self.per_agent_usage_count {
            metrics.agents_used.extend(
                usage
                    .iter()
                    .filter(|(_, count)| **count > 0)
                    .map(|(agent, _)| agent.clone()),
            );
        }

        metrics.updated_at = now;
    }
}

/// Reject a counter value above `MAX_COUNTER`
pub(crate) fn check_counter(name: &str, value: u64) -> Result<()> {
    if value > MAX_COUNTER {
        return Err(crate::GamificationError::Validation(format!(
            "{} value {} exceeds {}",
            name, value, MAX_COUNTER
        )));
    }
    Ok(())
}

/// Supplies metric snapshots to the engines
///
/// The engines never reach for global state; whoever owns the metrics passes
/// them in through this trait.
pub trait MetricsSource: Send + Sync {
    /// Snapshot for `user_id`, `None` if the user has no metrics yet
    fn metrics(&self, user_id: &str) -> Result<Option<UserMetrics>>;
}
