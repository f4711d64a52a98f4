//! Achievement definitions and metadata
//!
//! Requirement kinds form a closed set. Each kind maps to exactly one metric
//! accessor in `checker.rs`; there is no lookup by field name.

use serde::{Deserialize, Serialize};

/// Achievement category for grouping in the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Explorer,
    Communicator,
    Master,
    Legend,
}

impl Category {
    pub const ALL: &'static [Category] = &[
        Self::Explorer,
        Self::Communicator,
        Self::Master,
        Self::Legend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explorer => "explorer",
            Self::Communicator => "communicator",
            Self::Master => "master",
            Self::Legend => "legend",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "explorer" => Some(Self::Explorer),
            "communicator" => Some(Self::Communicator),
            "master" => Some(Self::Master),
            "legend" => Some(Self::Legend),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Explorer => "Explorer",
            Self::Communicator => "Communicator",
            Self::Master => "Master",
            Self::Legend => "Legend",
        }
    }
}

/// Rarity scales the base point value on unlock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Uncommon => "uncommon",
            Self::Rare => "rare",
            Self::Epic => "epic",
            Self::Legendary => "legendary",
        }
    }

    /// Point multiplier in tenths (1.5x = 15)
    pub fn multiplier_tenths(&self) -> u64 {
        match self {
            Self::Common => 10,
            Self::Uncommon => 15,
            Self::Rare => 20,
            Self::Epic => 25,
            Self::Legendary => 30,
        }
    }

    /// `floor(multiplier * base)`
    pub fn scale(&self, base: u64) -> u64 {
        base * self.multiplier_tenths() / 10
    }
}

/// What a user has to do to unlock an achievement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Requirement {
    TotalMessages { target: u64 },
    UniqueAgents { target: u64 },
    /// Any message sent in an hour in `[start, end)` (UTC)
    ActiveDuringHours { start: u8, end: u8 },
    ActiveDays { target: u64 },
    /// Target is a percentage
    AverageQuality { target: u64 },
    PerfectResponses { target: u64 },
    HighScores { target: u64 },
    /// Perfect plus high-score responses
    QualityResponses { target: u64 },
    CurrentStreak { target: u64 },
    LongestStreak { target: u64 },
    CompletedChallenges { target: u64 },
    LongestConversation { target: u64 },
    /// Busiest single day
    MessagesInOneDay { target: u64 },
    /// `target` agents at usage mastery `level` or above
    ToolsAtMastery { level: u8, target: u64 },
    TotalPoints { target: u64 },
    /// At least `min_messages` messages AND average quality of `min_quality`
    QualityOverVolume { min_messages: u64, min_quality: u64 },
    AgentHighScores { agent: String, target: u64 },
    AgentUsage { agent: String, target: u64 },
    UnlockedAchievements { target: u64 },
}

impl Requirement {
    /// Every kind string a catalog file may use
    pub const KINDS: &'static [&'static str] = &[
        "total-messages",
        "unique-agents",
        "active-during-hours",
        "active-days",
        "average-quality",
        "perfect-responses",
        "high-scores",
        "quality-responses",
        "current-streak",
        "longest-streak",
        "completed-challenges",
        "longest-conversation",
        "messages-in-one-day",
        "tools-at-mastery",
        "total-points",
        "quality-over-volume",
        "agent-high-scores",
        "agent-usage",
        "unlocked-achievements",
    ];

    pub fn kind(&self) -> &'static str {
        match self {
            Self::TotalMessages { .. } => "total-messages",
            Self::UniqueAgents { .. } => "unique-agents",
            Self::ActiveDuringHours { .. } => "active-during-hours",
            Self::ActiveDays { .. } => "active-days",
            Self::AverageQuality { .. } => "average-quality",
            Self::PerfectResponses { .. } => "perfect-responses",
            Self::HighScores { .. } => "high-scores",
            Self::QualityResponses { .. } => "quality-responses",
            Self::CurrentStreak { .. } => "current-streak",
            Self::LongestStreak { .. } => "longest-streak",
            Self::CompletedChallenges { .. } => "completed-challenges",
            Self::LongestConversation { .. } => "longest-conversation",
            Self::MessagesInOneDay { .. } => "messages-in-one-day",
            Self::ToolsAtMastery { .. } => "tools-at-mastery",
            Self::TotalPoints { .. } => "total-points",
            Self::QualityOverVolume { .. } => "quality-over-volume",
            Self::AgentHighScores { .. } => "agent-high-scores",
            Self::AgentUsage { .. } => "agent-usage",
            Self::UnlockedAchievements { .. } => "unlocked-achievements",
        }
    }

    /// Boolean requirements are either done or not, progress is 0 or 100
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::ActiveDuringHours { .. })
    }

    /// Per-entity requirements name the agent they track
    pub fn agent(&self) -> Option<&str> {
        match self {
            Self::AgentHighScores { agent, .. } | Self::AgentUsage { agent, .. } => Some(agent),
            _ => None,
        }
    }
}

/// Achievement definition with all metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: Category,
    pub rarity: Rarity,
    /// Base point value before the rarity multiplier
    pub points: u64,
    pub requirement: Requirement,
}

impl AchievementDefinition {
    /// Points granted when this achievement unlocks
    pub fn reward_points(&self) -> u64 {
        self.rarity.scale(self.points)
    }
}

fn def(
    id: &str,
    name: &str,
    description: &str,
    category: Category,
    rarity: Rarity,
    points: u64,
    requirement: Requirement,
) -> AchievementDefinition {
    AchievementDefinition {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        rarity,
        points,
        requirement,
    }
}

fn agent(id: &str) -> String {
    id.to_string()
}

/// The product's built-in achievements
pub(crate) fn builtin_definitions() -> Vec<AchievementDefinition> {
    use Category::*;
    use Rarity::*;
    use Requirement as R;

    vec![
        // === EXPLORER ===
        def(
            "first-agent",
            "Agent Whisperer",
            "Send your first message",
            Explorer,
            Common,
            10,
            R::TotalMessages { target: 1 },
        ),
        def(
            "all-agents-tried",
            "Agent Collector",
            "Try all 18 AI agents",
            Explorer,
            Rare,
            50,
            R::UniqueAgents { target: 18 },
        ),
        def(
            "explore-100-messages",
            "Conversationalist",
            "Send 100 messages",
            Explorer,
            Uncommon,
            25,
            R::TotalMessages { target: 100 },
        ),
        def(
            "early-bird",
            "Early Bird",
            "Use the platform before 8 AM",
            Explorer,
            Common,
            15,
            R::ActiveDuringHours { start: 0, end: 8 },
        ),
        def(
            "night-owl",
            "Night Owl",
            "Use the platform between midnight and 6 AM",
            Explorer,
            Common,
            15,
            R::ActiveDuringHours { start: 0, end: 6 },
        ),
        def(
            "weekly-warrior",
            "Weekly Warrior",
            "Be active on 7 different days",
            Explorer,
            Uncommon,
            40,
            R::ActiveDays { target: 7 },
        ),
        def(
            "month-marathon",
            "Month Marathon",
            "Be active on 30 different days",
            Explorer,
            Rare,
            100,
            R::ActiveDays { target: 30 },
        ),
        def(
            "chatbot-companion",
            "Chatbot Companion",
            "Send 500 messages",
            Explorer,
            Rare,
            60,
            R::TotalMessages { target: 500 },
        ),
        def(
            "conversation-master",
            "Conversation Master",
            "Send 1,000 messages",
            Explorer,
            Epic,
            100,
            R::TotalMessages { target: 1000 },
        ),
        // === COMMUNICATOR ===
        def(
            "quality-seeker",
            "Quality Seeker",
            "Maintain 80%+ response quality",
            Communicator,
            Rare,
            60,
            R::AverageQuality { target: 80 },
        ),
        def(
            "perfectionist",
            "Perfectionist",
            "Get 10 perfect responses",
            Communicator,
            Epic,
            75,
            R::PerfectResponses { target: 10 },
        ),
        def(
            "excellence-badge",
            "Excellence Badge",
            "Achieve 50 high scores",
            Communicator,
            Rare,
            60,
            R::HighScores { target: 50 },
        ),
        def(
            "response-master",
            "Response Master",
            "Get 100 quality responses",
            Communicator,
            Epic,
            120,
            R::QualityResponses { target: 100 },
        ),
        def(
            "streaker",
            "Streaker",
            "Keep a 3-day usage streak",
            Communicator,
            Common,
            20,
            R::CurrentStreak { target: 3 },
        ),
        def(
            "week-warrior",
            "Week Warrior",
            "Keep a 7-day usage streak",
            Communicator,
            Uncommon,
            40,
            R::CurrentStreak { target: 7 },
        ),
        def(
            "marathon-runner",
            "Marathon Runner",
            "Keep a 30-day usage streak",
            Communicator,
            Rare,
            100,
            R::CurrentStreak { target: 30 },
        ),
        def(
            "challenge-master",
            "Challenge Master",
            "Complete 10 daily challenges",
            Communicator,
            Uncommon,
            50,
            R::CompletedChallenges { target: 10 },
        ),
        def(
            "long-talker",
            "Long Talker",
            "Keep a conversation going for 20+ messages",
            Communicator,
            Uncommon,
            35,
            R::LongestConversation { target: 20 },
        ),
        def(
            "comedy-gold",
            "Comedy Gold",
            "Get 5 high-scoring Comedy King responses",
            Communicator,
            Rare,
            50,
            R::AgentHighScores {
                agent: agent("comedy-king"),
                target: 5,
            },
        ),
        def(
            "wisdom-seeker",
            "Wisdom Seeker",
            "Get 5 high-scoring Einstein responses",
            Communicator,
            Rare,
            50,
            R::AgentHighScores {
                agent: agent("einstein"),
                target: 5,
            },
        ),
        // === MASTER ===
        def(
            "mastery-level-1",
            "Apprentice of Many",
            "Reach mastery level 1 with 5 agents",
            Master,
            Uncommon,
            50,
            R::ToolsAtMastery { level: 1, target: 5 },
        ),
        def(
            "mastery-level-2",
            "Journeyman",
            "Reach mastery level 2 with 10 agents",
            Master,
            Rare,
            100,
            R::ToolsAtMastery {
                level: 2,
                target: 10,
            },
        ),
        def(
            "specialist",
            "Specialist",
            "Reach maximum mastery with one agent",
            Master,
            Rare,
            80,
            R::ToolsAtMastery { level: 5, target: 1 },
        ),
        def(
            "polymath",
            "Polymath",
            "Reach maximum mastery with 3 agents",
            Master,
            Epic,
            150,
            R::ToolsAtMastery { level: 5, target: 3 },
        ),
        def(
            "xp-milestone-1000",
            "Rising Star",
            "Earn 1,000 total points",
            Master,
            Uncommon,
            50,
            R::TotalPoints { target: 1000 },
        ),
        def(
            "xp-milestone-5000",
            "Powerhouse",
            "Earn 5,000 total points",
            Master,
            Rare,
            100,
            R::TotalPoints { target: 5000 },
        ),
        def(
            "conversation-length-50",
            "Story Teller",
            "Keep a conversation going for 50 messages",
            Master,
            Rare,
            75,
            R::LongestConversation { target: 50 },
        ),
        def(
            "speed-demon",
            "Speed Demon",
            "Send 100 messages in a single day",
            Master,
            Epic,
            100,
            R::MessagesInOneDay { target: 100 },
        ),
        def(
            "all-rounder",
            "All-Rounder",
            "Average 80%+ quality across 50+ messages",
            Master,
            Epic,
            150,
            R::QualityOverVolume {
                min_messages: 50,
                min_quality: 80,
            },
        ),
        def(
            "tech-specialist",
            "Tech Specialist",
            "Use Tech Wizard 100+ times",
            Master,
            Rare,
            60,
            R::AgentUsage {
                agent: agent("tech-wizard"),
                target: 100,
            },
        ),
        // === LEGEND ===
        def(
            "grand-master",
            "Grand Master",
            "Reach a 100-day usage streak",
            Legend,
            Legendary,
            300,
            R::LongestStreak { target: 100 },
        ),
        def(
            "sage",
            "Sage",
            "Earn 50,000 total points",
            Legend,
            Legendary,
            250,
            R::TotalPoints { target: 50_000 },
        ),
        def(
            "perfect-record",
            "Perfect Record",
            "Maintain 95%+ quality across 10,000+ messages",
            Legend,
            Legendary,
            500,
            R::QualityOverVolume {
                min_messages: 10_000,
                min_quality: 95,
            },
        ),
        def(
            "supreme-master",
            "Supreme Master",
            "Complete 1,000 daily challenges",
            Legend,
            Legendary,
            400,
            R::CompletedChallenges { target: 1000 },
        ),
        def(
            "achievement-hunter",
            "Achievement Hunter",
            "Unlock 30 achievements",
            Legend,
            Legendary,
            200,
            R::UnlockedAchievements { target: 30 },
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_scaling_floors() {
        assert_eq!(Rarity::Common.scale(15), 15);
        assert_eq!(Rarity::Uncommon.scale(25), 37);
        assert_eq!(Rarity::Rare.scale(50), 100);
        assert_eq!(Rarity::Epic.scale(75), 187);
        assert_eq!(Rarity::Legendary.scale(200), 600);
    }

    #[test]
    fn test_kind_table_matches_variants() {
        for d in builtin_definitions() {
            assert!(Requirement::KINDS.contains(&d.requirement.kind()));
        }
    }

    #[test]
    fn test_requirement_json_shape() {
        let r = Requirement::QualityOverVolume {
            min_messages: 50,
            min_quality: 80,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["kind"], "quality-over-volume");
        assert_eq!(json["minMessages"], 50);
        assert_eq!(json["minQuality"], 80);
    }

    #[test]
    fn test_category_round_trip() {
        for c in Category::ALL {
            assert_eq!(Category::from_str(c.as_str()), Some(*c));
        }
    }
}
