//! XP rewards for interactions

use crate::metrics::Interaction;

/// XP rewards for the parts of an interaction
pub struct XpRewards;

impl XpRewards {
    /// XP for any message
    pub const BASE: u64 = 10;

    /// Quality score of exactly 100
    pub const PERFECT_SCORE_BONUS: u64 = 50;

    /// Quality score of 80 or more
    pub const HIGH_SCORE_BONUS: u64 = 25;

    /// Turns after this many earn the long-conversation bonus
    pub const FREE_TURNS: u64 = 5;

    /// Per turn beyond `FREE_TURNS`
    pub const PER_EXTRA_TURN: u64 = 5;

    /// Interaction that also completed a daily challenge
    pub const CHALLENGE_BONUS: u64 = 100;
}

/// XP earned by one interaction, saturating at `u64::MAX`
pub fn xp_for(interaction: &Interaction) -> u64 {
    let mut xp = XpRewards::BASE;

    match interaction.quality_score {
        Some(100) => xp += XpRewards::PERFECT_SCORE_BONUS,
        Some(score) if score >= 80 => xp += XpRewards::HIGH_SCORE_BONUS,
        _ => {}
    }

    let extra_turns = interaction
        .conversation_length
        .saturating_sub(XpRewards::FREE_TURNS);
    xp = xp.saturating_add(extra_turns.saturating_mul(XpRewards::PER_EXTRA_TURN));

    if interaction.completed_challenge {
        xp = xp.saturating_add(XpRewards::CHALLENGE_BONUS);
    }

    xp
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interaction(score: Option<u64>, length: u64, challenge: bool) -> Interaction {
        Interaction {
            tool: "einstein".to_string(),
            quality_score: score,
            conversation_length: length,
            completed_challenge: challenge,
        }
    }

    #[test]
    fn test_base_xp() {
        assert_eq!(xp_for(&interaction(None, 1, false)), 10);
        assert_eq!(xp_for(&interaction(Some(79), 5, false)), 10);
    }

    #[test]
    fn test_score_bonuses_do_not_stack() {
        assert_eq!(xp_for(&interaction(Some(80), 1, false)), 35);
        assert_eq!(xp_for(&interaction(Some(100), 1, false)), 60);
    }

    #[test]
    fn test_long_conversation_and_challenge() {
        // 10 + 3 extra turns * 5 + 100
        assert_eq!(xp_for(&interaction(None, 8, true)), 125);
    }

    #[test]
    fn test_huge_conversation_saturates() {
        assert_eq!(xp_for(&interaction(Some(100), u64::MAX, true)), u64::MAX);
        // fits in u64 but not in i64
        assert_eq!(
            xp_for(&interaction(None, 2_305_843_009_213_693_957, false)),
            11_529_215_046_068_469_770
        );
    }
}
