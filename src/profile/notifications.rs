//! Notifications emitted while processing an event

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::achievements::{AchievementUnlock, Catalog, Rarity};
use crate::leaderboard::TierName;
use crate::mastery::{MasteryLevel, XpGrant};

/// Something the user should be told about
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum GamificationEvent {
    AchievementUnlocked {
        achievement_id: String,
        name: String,
        rarity: Rarity,
        points: u64,
        unlocked_at: DateTime<Utc>,
    },
    MasteryLevelUp {
        tool_id: String,
        previous_level: MasteryLevel,
        new_level: MasteryLevel,
        new_skills: Vec<String>,
    },
    StreakExtended {
        count: u64,
    },
    PointsAwarded {
        amount: u64,
        reason: String,
        balance_after: i64,
    },
    TierUpgraded {
        previous_tier: TierName,
        new_tier: TierName,
    },
}

/// One notification per unlock, skipping ids the catalog no longer knows
pub fn unlock_notifications(catalog: &Catalog, unlocks: &[AchievementUnlock]) -> Vec<GamificationEvent> {
    unlocks
        .iter()
        .filter_map(|u| {
            let def = catalog.get(&u.achievement_id)?;
            Some(GamificationEvent::AchievementUnlocked {
                achievement_id: def.id.clone(),
                name: def.name.clone(),
                rarity: def.rarity,
                points: def.reward_points(),
                unlocked_at: u.unlocked_at,
            })
        })
        .collect()
}

pub fn level_up_notification(grant: &XpGrant) -> Option<GamificationEvent> {
    grant.leveled_up().then(|| GamificationEvent::MasteryLevelUp {
        tool_id: grant.tool_id.clone(),
        previous_level: grant.previous_level,
        new_level: grant.new_level,
        new_skills: grant.new_skills.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mastery::ToolMastery;

    #[test]
    fn test_unlock_notifications_use_catalog_points() {
        let unlocks = vec![
            AchievementUnlock {
                user_id: "u1".to_string(),
                achievement_id: "first-agent".to_string(),
                unlocked_at: Utc::now(),
            },
            AchievementUnlock {
                user_id: "u1".to_string(),
                achievement_id: "retired-badge".to_string(),
                unlocked_at: Utc::now(),
            },
        ];
        let events = unlock_notifications(Catalog::builtin(), &unlocks);
        assert_eq!(events.len(), 1);
        let def = Catalog::builtin().get("first-agent").unwrap();
        match &events[0] {
            GamificationEvent::AchievementUnlocked { points, .. } => {
                assert_eq!(*points, def.reward_points())
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_level_up_only_on_level_change() {
        let mut m = ToolMastery::new("einstein");
        let small = m.apply_xp(10).unwrap();
        assert!(level_up_notification(&small).is_none());
        let big = m.apply_xp(990).unwrap();
        assert!(matches!(
            level_up_notification(&big),
            Some(GamificationEvent::MasteryLevelUp {
                new_level: MasteryLevel::Expert,
                ..
            })
        ));
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(GamificationEvent::PointsAwarded {
            amount: 10,
            reason: "message-sent".to_string(),
            balance_after: 10,
        })
        .unwrap();
        assert_eq!(value["type"], "points-awarded");
        assert_eq!(value["balanceAfter"], 10);
    }
}
