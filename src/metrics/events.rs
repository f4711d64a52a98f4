//! Event vocabulary
//!
//! Raw events from the chat runtime are folded into `UserMetrics` here. The
//! function only touches counters; points, XP and unlocks are applied by the
//! service from the returned `EventEffect`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::streaks::{StreakChange, record_activity_day};
use super::time_bucket::{day_bucket, hour_bucket};
use super::{UserMetrics, check_counter};
use crate::error::{GamificationError, Result};

/// Default payout for a completed challenge without explicit points
pub const DEFAULT_CHALLENGE_POINTS: u64 = 100;

/// Known event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageSent,
    PerfectResponse,
    HighScore,
    SessionEnd,
    StreakUpdate,
    ChallengeCompleted,
    AgentCreated,
    FirstLogin,
}

impl EventKind {
    pub const ALL: &'static [EventKind] = &[
        Self::MessageSent,
        Self::PerfectResponse,
        Self::HighScore,
        Self::SessionEnd,
        Self::StreakUpdate,
        Self::ChallengeCompleted,
        Self::AgentCreated,
        Self::FirstLogin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageSent => "message-sent",
            Self::PerfectResponse => "perfect-response",
            Self::HighScore => "high-score",
            Self::SessionEnd => "session-end",
            Self::StreakUpdate => "streak-update",
            Self::ChallengeCompleted => "challenge-completed",
            Self::AgentCreated => "agent-created",
            Self::FirstLogin => "first-login",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "message-sent" => Some(Self::MessageSent),
            "perfect-response" => Some(Self::PerfectResponse),
            "high-score" => Some(Self::HighScore),
            "session-end" => Some(Self::SessionEnd),
            // older clients send the past tense
            "streak-update" | "streak-updated" => Some(Self::StreakUpdate),
            "challenge-completed" => Some(Self::ChallengeCompleted),
            "agent-created" => Some(Self::AgentCreated),
            "first-login" => Some(Self::FirstLogin),
            _ => None,
        }
    }

    /// Fixed payout; `None` when it depends on the event data
    pub fn base_points(&self) -> Option<u64> {
        match self {
            Self::MessageSent => Some(10),
            Self::PerfectResponse => Some(50),
            Self::HighScore => Some(25),
            Self::SessionEnd => Some(0),
            Self::StreakUpdate | Self::ChallengeCompleted => None,
            Self::AgentCreated => Some(50),
            Self::FirstLogin => Some(25),
        }
    }

    /// Only the first occurrence per user pays out
    pub fn once_per_user(&self) -> bool {
        matches!(self, Self::FirstLogin)
    }
}

/// An incoming event as posted by the chat runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: Value,
    /// When the event happened; defaults to processing time
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl MetricsEvent {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            timestamp: None,
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_str(&self.event_type)
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    fn u64_field(&self, key: &str) -> Result<Option<u64>> {
        match self.data.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let value = v.as_u64().ok_or_else(|| {
                    GamificationError::Validation(format!(
                        "{}: '{}' must be a non-negative integer",
                        self.event_type, key
                    ))
                })?;
                check_counter(&format!("{}.{}", self.event_type, key), value)?;
                Ok(Some(value))
            }
        }
    }

    fn bool_field(&self, key: &str) -> bool {
        self.data.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// One chat interaction with a tool, the input to XP computation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interaction {
    pub tool: String,
    /// Quality score 0-100, if the response was rated
    pub quality_score: Option<u64>,
    /// Turns in the conversation so far, including this one
    pub conversation_length: u64,
    pub completed_challenge: bool,
}

/// What an event did besides updating counters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EventEffect {
    /// `None` for event types outside the vocabulary
    pub kind: Option<EventKind>,
    pub points: u64,
    pub interaction: Option<Interaction>,
    pub challenge_id: Option<String>,
    pub streak: Option<StreakChange>,
}

impl EventEffect {
    pub fn is_known(&self) -> bool {
        self.kind.is_some()
    }
}

/// Fold `event` into `metrics`.
///
/// Unknown event types leave the metrics untouched and yield an effect with
/// zero points. Malformed data on a known type is a validation error and also
/// leaves the metrics untouched.
pub fn apply_event(
    metrics: &mut UserMetrics,
    event: &MetricsEvent,
    now: DateTime<Utc>,
) -> Result<EventEffect> {
    let Some(kind) = event.kind() else {
        return Ok(EventEffect::default());
    };
    let at = event.timestamp.unwrap_or(now);
    let agent = event.str_field("agentId").map(str::to_string);
    let mut effect = EventEffect {
        kind: Some(kind),
        points: kind.base_points().unwrap_or(0),
        ..Default::default()
    };

    match kind {
        EventKind::MessageSent => {
            let score = event.u64_field("score")?;
            if let Some(s) = score.filter(|s| *s > 100) {
                return Err(GamificationError::Validation(format!(
                    "message-sent: score {} is outside 0-100",
                    s
                )));
            }
            let explicit_length = event.u64_field("conversationLength")?;

            metrics.total_messages += 1;
            *metrics.usage_by_hour.entry(hour_bucket(at)).or_insert(0) += 1;
            *metrics.usage_by_day.entry(day_bucket(at)).or_insert(0) += 1;
            metrics.current_session_turns += 1;
            effect.streak = Some(record_activity_day(metrics, at.date_naive()));

            if let Some(agent) = agent {
                metrics.agents_used.insert(agent.clone());
                *metrics.per_agent_usage_count.entry(agent.clone()).or_insert(0) += 1;
                effect.interaction = Some(Interaction {
                    tool: agent,
                    quality_score: score,
                    conversation_length: explicit_length
                        .unwrap_or(metrics.current_session_turns),
                    completed_challenge: event.bool_field("completedChallenge"),
                });
            }
        }
        EventKind::PerfectResponse => {
            metrics.perfect_response_count += 1;
            if let Some(agent) = agent {
                *metrics.per_agent_high_score_count.entry(agent).or_insert(0) += 1;
            }
        }
        EventKind::HighScore => {
            metrics.high_score_count += 1;
            if let Some(agent) = agent {
                *metrics.per_agent_high_score_count.entry(agent).or_insert(0) += 1;
            }
        }
        EventKind::SessionEnd => {
            let turns = event
                .u64_field("messageCount")?
                .unwrap_or(metrics.current_session_turns);
            metrics.longest_conversation = metrics.longest_conversation.max(turns);
            metrics.current_session_turns = 0;
        }
        EventKind::StreakUpdate => {
            let streak = event.u64_field("streak")?.ok_or_else(|| {
                GamificationError::Validation("streak-update: missing 'streak'".to_string())
            })?;
            metrics.current_streak = streak;
            metrics.longest_streak = metrics.longest_streak.max(streak);
            effect.points = streak.saturating_mul(10);
        }
        EventKind::ChallengeCompleted => {
            let points = event
                .u64_field("points")?
                .unwrap_or(DEFAULT_CHALLENGE_POINTS);
            metrics.completed_challenges_count += 1;
            effect.points = points;
            effect.challenge_id = Some(
                event
                    .str_field("challengeId")
                    .unwrap_or("daily")
                    .to_string(),
            );
        }
        EventKind::AgentCreated | EventKind::FirstLogin => {}
    }

    metrics.updated_at = now;
    Ok(effect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MAX_COUNTER;
    use chrono::TimeZone;
    use serde_json::json;

    fn at(h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 3, h, 15, 0).unwrap()
    }

    #[test]
    fn test_message_sent_updates_buckets() {
        let mut m = UserMetrics::new("u1", at(0));
        let event = MetricsEvent::new("message-sent", json!({"agentId": "einstein", "score": 90}))
            .at(at(6));
        let effect = apply_event(&mut m, &event, at(7)).unwrap();

        assert_eq!(effect.points, 10);
        assert_eq!(m.total_messages, 1);
        assert_eq!(m.hour_count(6), 1);
        assert_eq!(m.day_count("2024-06-03"), 1);
        assert_eq!(m.agent_usage("einstein"), 1);
        assert!(m.agents_used.contains("einstein"));
        assert_eq!(m.current_streak, 1);

        let interaction = effect.interaction.unwrap();
        assert_eq!(interaction.tool, "einstein");
        assert_eq!(interaction.quality_score, Some(90));
        assert_eq!(interaction.conversation_length, 1);
    }

    #[test]
    fn test_session_end_records_longest_conversation() {
        let mut m = UserMetrics::new("u1", at(0));
        for _ in 0..4 {
            apply_event(&mut m, &MetricsEvent::new("message-sent", json!({})), at(9)).unwrap();
        }
        let effect =
            apply_event(&mut m, &MetricsEvent::new("session-end", Value::Null), at(9)).unwrap();
        assert_eq!(effect.points, 0);
        assert_eq!(m.longest_conversation, 4);
        assert_eq!(m.current_session_turns, 0);

        // a shorter session never lowers the record
        apply_event(
            &mut m,
            &MetricsEvent::new("session-end", json!({"messageCount": 2})),
            at(10),
        )
        .unwrap();
        assert_eq!(m.longest_conversation, 4);
    }

    #[test]
    fn test_variable_payouts() {
        let mut m = UserMetrics::new("u1", at(0));
        let streak =
            apply_event(&mut m, &MetricsEvent::new("streak-update", json!({"streak": 4})), at(1))
                .unwrap();
        assert_eq!(streak.points, 40);
        assert_eq!(m.current_streak, 4);
        assert_eq!(m.longest_streak, 4);

        let challenge =
            apply_event(&mut m, &MetricsEvent::new("challenge-completed", json!({})), at(1))
                .unwrap();
        assert_eq!(challenge.points, DEFAULT_CHALLENGE_POINTS);
        assert_eq!(challenge.challenge_id.as_deref(), Some("daily"));

        let custom = apply_event(
            &mut m,
            &MetricsEvent::new(
                "challenge-completed",
                json!({"points": 250, "challengeId": "night-owl"}),
            ),
            at(1),
        )
        .unwrap();
        assert_eq!(custom.points, 250);
        assert_eq!(m.completed_challenges_count, 2);
    }

    #[test]
    fn test_unknown_event_is_a_no_op() {
        let mut m = UserMetrics::new("u1", at(0));
        let before = m.clone();
        let effect =
            apply_event(&mut m, &MetricsEvent::new("moon-landing", json!({"x": 1})), at(1))
                .unwrap();
        assert!(!effect.is_known());
        assert_eq!(effect.points, 0);
        assert_eq!(m, before);
    }

    #[test]
    fn test_malformed_known_event_leaves_metrics_alone() {
        let mut m = UserMetrics::new("u1", at(0));
        let before = m.clone();
        let bad_score = MetricsEvent::new("message-sent", json!({"score": 140}));
        assert!(apply_event(&mut m, &bad_score, at(1)).is_err());
        let missing = MetricsEvent::new("streak-update", json!({}));
        assert!(apply_event(&mut m, &missing, at(1)).is_err());
        assert_eq!(m, before);
    }

    #[test]
    fn test_oversized_fields_are_rejected_before_any_change() {
        let mut m = UserMetrics::new("u1", at(0));
        let before = m.clone();
        let huge_length = MetricsEvent::new(
            "message-sent",
            json!({"agentId": "einstein", "conversationLength": 2_305_843_009_213_693_957u64}),
        );
        assert!(apply_event(&mut m, &huge_length, at(1)).is_err());
        let huge_streak = MetricsEvent::new("streak-update", json!({"streak": u64::MAX}));
        assert!(apply_event(&mut m, &huge_streak, at(1)).is_err());
        assert_eq!(m, before);

        let top = MetricsEvent::new("streak-update", json!({"streak": MAX_COUNTER}));
        let effect = apply_event(&mut m, &top, at(1)).unwrap();
        assert_eq!(effect.points, MAX_COUNTER * 10);
    }

    #[test]
    fn test_vocabulary_round_trips() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(*kind));
        }
        assert_eq!(
            EventKind::from_str("streak-updated"),
            Some(EventKind::StreakUpdate)
        );
    }
}
