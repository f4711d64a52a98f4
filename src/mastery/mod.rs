//! Tool mastery: per-tool XP and levels
//!
//! XP only ever grows. Levels, skills and progress are derived from the XP
//! total, so a `ToolMastery` loaded from storage is always self-consistent.

mod levels;
mod xp;

pub use levels::{
    LevelReward, MasteryLevel, MasteryProgress, RewardKind, THRESHOLDS, level_of, progress,
    skills_at, xp_to_next_level,
};
pub use xp::{XpRewards, xp_for};

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{GamificationError, Result};
use crate::metrics::Interaction;

/// Mastery state of one user with one tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolMastery {
    pub tool_id: String,
    pub total_xp: u64,
    pub unlocked_skills: BTreeSet<String>,
    pub usage_count: u64,
    /// Sum of rated quality scores
    pub score_sum: u64,
    pub scored_count: u64,
    pub perfect_scores: u64,
}

/// Outcome of adding XP to a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct XpGrant {
    pub tool_id: String,
    pub xp: u64,
    pub total_xp: u64,
    pub previous_level: MasteryLevel,
    pub new_level: MasteryLevel,
    pub new_skills: Vec<String>,
    /// Levels reached by this grant, lowest first
    pub levels_reached: Vec<MasteryLevel>,
}

impl XpGrant {
    pub fn leveled_up(&self) -> bool {
        self.new_level > self.previous_level
    }

    /// Bonus points owed for every level reached
    pub fn level_reward_points(&self) -> u64 {
        self.levels_reached.iter().map(|l| l.reward_points()).sum()
    }
}

impl ToolMastery {
    pub fn new(tool_id: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            total_xp: 0,
            unlocked_skills: skills_at(MasteryLevel::Novice)
                .into_iter()
                .map(str::to_string)
                .collect(),
            usage_count: 0,
            score_sum: 0,
            scored_count: 0,
            perfect_scores: 0,
        }
    }

    pub fn level(&self) -> MasteryLevel {
        level_of(self.total_xp)
    }

    pub fn progress(&self) -> MasteryProgress {
        progress(self.total_xp)
    }

    pub fn average_score(&self) -> f64 {
        if self.scored_count == 0 {
            return 0.0;
        }
        self.score_sum as f64 / self.scored_count as f64
    }

    /// A tool counts as mastered from expert upwards
    pub fn is_mastered(&self) -> bool {
        self.level() >= MasteryLevel::Expert
    }

    /// Add `amount` XP. Non-positive amounts are rejected and change nothing.
    pub fn apply_xp(&mut self, amount: i64) -> Result<XpGrant> {
        if amount <= 0 {
            return Err(GamificationError::InvalidXpGrant(amount));
        }
        let xp = amount as u64;
        let previous_level = self.level();
        self.total_xp = self.total_xp.saturating_add(xp);
        let new_level = self.level();

        let mut new_skills = Vec::new();
        for skill in skills_at(new_level) {
            if self.unlocked_skills.insert(skill.to_string()) {
                new_skills.push(skill.to_string());
            }
        }

        let levels_reached = MasteryLevel::ALL
            .iter()
            .copied()
            .filter(|l| *l > previous_level && *l <= new_level)
            .collect();

        Ok(XpGrant {
            tool_id: self.tool_id.clone(),
            xp,
            total_xp: self.total_xp,
            previous_level,
            new_level,
            new_skills,
            levels_reached,
        })
    }

    /// Record the usage stats of one interaction and grant its XP
    pub fn record_interaction(&mut self, interaction: &Interaction) -> Result<XpGrant> {
        let xp = i64::try_from(xp_for(interaction)).unwrap_or(i64::MAX);
        let grant = self.apply_xp(xp)?;
        self.usage_count = self.usage_count.saturating_add(1);
        if let Some(score) = interaction.quality_score {
            self.score_sum = self.score_sum.saturating_add(score);
            self.scored_count = self.scored_count.saturating_add(1);
            if score == 100 {
                self.perfect_scores = self.perfect_scores.saturating_add(1);
            }
        }
        Ok(grant)
    }
}

/// Grant XP for `interaction` to the matching tool mastery
pub fn grant_xp(mastery: &mut ToolMastery, interaction: &Interaction) -> Result<XpGrant> {
    if mastery.tool_id != interaction.tool {
        return Err(GamificationError::Validation(format!(
            "interaction for '{}' applied to mastery of '{}'",
            interaction.tool, mastery.tool_id
        )));
    }
    mastery.record_interaction(interaction)
}

/// Summary over all of a user's tools
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MasteryStats {
    pub total_mastered_tools: usize,
    /// Mean of level numbers 1 (novice) to 5 (mythic), two decimals
    pub average_level: f64,
    pub highest_level: MasteryLevel,
    pub total_xp: u64,
    /// Share of tools past novice, 0-100
    pub completion: u8,
}

pub fn mastery_stats(tools: &[ToolMastery]) -> MasteryStats {
    let total_mastered_tools = tools.iter().filter(|t| t.is_mastered()).count();
    let total_xp = tools.iter().fold(0u64, |sum, t| sum.saturating_add(t.total_xp));
    let highest_level = tools
        .iter()
        .map(ToolMastery::level)
        .max()
        .unwrap_or(MasteryLevel::Novice);

    let (average_level, completion) = if tools.is_empty() {
        (0.0, 0)
    } else {
        let level_sum: u64 = tools.iter().map(|t| t.level().index() as u64 + 1).sum();
        let avg = level_sum as f64 / tools.len() as f64;
        let completion = (total_mastered_tools as f64 / tools.len() as f64 * 100.0).round() as u8;
        ((avg * 100.0).round() / 100.0, completion)
    };

    MasteryStats {
        total_mastered_tools,
        average_level,
        highest_level,
        total_xp,
        completion,
    }
}

/// Tools to focus on next: lowest level first, then least progress
pub fn recommended_focus(tools: &[ToolMastery], limit: usize) -> Vec<&ToolMastery> {
    let mut sorted: Vec<&ToolMastery> = tools.iter().collect();
    sorted.sort_by(|a, b| {
        a.level()
            .cmp(&b.level())
            .then_with(|| {
                a.progress()
                    .percent
                    .partial_cmp(&b.progress().percent)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.tool_id.cmp(&b.tool_id))
    });
    sorted.truncate(limit);
    sorted
}

/// Aggregate mastery score: 100 per level step plus 1 per 1000 XP
pub fn total_mastery_score(tools: &[ToolMastery]) -> u64 {
    tools
        .iter()
        .map(|t| (t.level().index() as u64 + 1) * 100 + t.total_xp / 1_000)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(tool: &str, score: Option<u64>) -> Interaction {
        Interaction {
            tool: tool.to_string(),
            quality_score: score,
            conversation_length: 1,
            completed_challenge: false,
        }
    }

    #[test]
    fn test_oversized_interaction_is_capped_not_rejected() {
        let mut m = ToolMastery::new("einstein");
        let long = Interaction {
            conversation_length: 2_305_843_009_213_693_957,
            ..interaction("einstein", None)
        };
        let grant = grant_xp(&mut m, &long).unwrap();
        assert_eq!(grant.xp, i64::MAX as u64);
        assert_eq!(grant.new_level, MasteryLevel::Mythic);

        // further grants saturate instead of wrapping
        grant_xp(&mut m, &long).unwrap();
        assert_eq!(m.total_xp, u64::MAX);
        assert_eq!(m.usage_count, 2);
    }

    #[test]
    fn test_xp_sequence_levels_and_skills() {
        let mut m = ToolMastery::new("einstein");
        assert_eq!(m.level(), MasteryLevel::Novice);
        let novice_skills = m.unlocked_skills.clone();

        let g = m.apply_xp(1_000).unwrap();
        assert_eq!(g.previous_level, MasteryLevel::Novice);
        assert_eq!(g.new_level, MasteryLevel::Expert);
        assert_eq!(g.levels_reached, vec![MasteryLevel::Expert]);
        assert_eq!(g.level_reward_points(), 500);
        assert!(novice_skills.is_subset(&m.unlocked_skills));
        assert!(m.unlocked_skills.len() > novice_skills.len());
        let expert_skills = m.unlocked_skills.clone();

        let g = m.apply_xp(4_000).unwrap();
        assert_eq!(m.total_xp, 5_000);
        assert_eq!(g.new_level, MasteryLevel::Master);
        assert!(expert_skills.is_subset(&m.unlocked_skills));
        assert!(m.unlocked_skills.len() > expert_skills.len());
    }

    #[test]
    fn test_non_positive_xp_rejected() {
        let mut m = ToolMastery::new("einstein");
        assert!(matches!(
            m.apply_xp(0),
            Err(GamificationError::InvalidXpGrant(0))
        ));
        assert!(matches!(
            m.apply_xp(-5),
            Err(GamificationError::InvalidXpGrant(-5))
        ));
        assert_eq!(m.total_xp, 0);
    }

    #[test]
    fn test_multi_level_jump_pays_every_level() {
        let mut m = ToolMastery::new("chef-biew");
        let g = m.apply_xp(16_000).unwrap();
        assert_eq!(
            g.levels_reached,
            vec![
                MasteryLevel::Expert,
                MasteryLevel::Master,
                MasteryLevel::Legendary
            ]
        );
        assert_eq!(g.level_reward_points(), 500 + 1_500 + 3_000);
        assert!(g.leveled_up());
    }

    #[test]
    fn test_record_interaction_tracks_scores() {
        let mut m = ToolMastery::new("einstein");
        grant_xp(&mut m, &interaction("einstein", Some(100))).unwrap();
        grant_xp(&mut m, &interaction("einstein", Some(80))).unwrap();
        grant_xp(&mut m, &interaction("einstein", None)).unwrap();

        assert_eq!(m.usage_count, 3);
        assert_eq!(m.perfect_scores, 1);
        assert_eq!(m.average_score(), 90.0);
        assert_eq!(m.total_xp, 60 + 35 + 10);
        assert!(grant_xp(&mut m, &interaction("tech-wizard", None)).is_err());
    }

    #[test]
    fn test_stats_and_focus() {
        let mut a = ToolMastery::new("a");
        a.apply_xp(5_000).unwrap();
        let mut b = ToolMastery::new("b");
        b.apply_xp(1_200).unwrap();
        let mut c = ToolMastery::new("c");
        c.apply_xp(100).unwrap();
        let tools = vec![a, b, c];

        let stats = mastery_stats(&tools);
        assert_eq!(stats.total_mastered_tools, 2);
        assert_eq!(stats.highest_level, MasteryLevel::Master);
        assert_eq!(stats.total_xp, 6_300);
        // (3 + 2 + 1) / 3
        assert_eq!(stats.average_level, 2.0);
        assert_eq!(stats.completion, 67);

        let focus = recommended_focus(&tools, 2);
        assert_eq!(focus[0].tool_id, "c");
        assert_eq!(focus[1].tool_id, "b");

        assert_eq!(total_mastery_score(&tools), 305 + 201 + 100);
    }

    #[test]
    fn test_xp_never_decreases() {
        let mut m = ToolMastery::new("einstein");
        let mut last_xp = 0;
        let mut last_level = m.level();
        for amount in [10, 990, 1, 3_999, 10_000, 40_000] {
            m.apply_xp(amount).unwrap();
            assert!(m.total_xp > last_xp);
            assert!(m.level() >= last_level);
            last_xp = m.total_xp;
            last_level = m.level();
        }
    }
}
