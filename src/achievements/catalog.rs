//! Achievement catalog
//!
//! The catalog is immutable once loaded. External catalogs are TOML files with
//! one `[[achievement]]` table per definition:
//!
//! ```toml
//! [[achievement]]
//! id = "first-agent"
//! name = "Agent Whisperer"
//! description = "Send your first message"
//! category = "explorer"
//! rarity = "common"
//! points = 10
//! requirement = { kind = "total-messages", target = 1 }
//! ```

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;

use super::definitions::{AchievementDefinition, Category, Requirement, builtin_definitions};
use crate::error::{GamificationError, Result};

static BUILTIN: Lazy<Catalog> = Lazy::new(|| Catalog {
    definitions: builtin_definitions(),
});

/// Validated set of achievement definitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    definitions: Vec<AchievementDefinition>,
}

impl Catalog {
    /// The built-in product catalog
    pub fn builtin() -> &'static Catalog {
        &BUILTIN
    }

    pub fn from_definitions(definitions: Vec<AchievementDefinition>) -> Result<Self> {
        let catalog = Self { definitions };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Parse a TOML catalog.
    ///
    /// A requirement kind outside the known set fails with
    /// `UnknownRequirementKind`; any other shape problem is a `Catalog` error.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let root: toml::Table = toml::from_str(content)
            .map_err(|e| GamificationError::Catalog(format!("invalid TOML: {}", e)))?;

        let entries = match root.get("achievement") {
            Some(toml::Value::Array(entries)) => entries.clone(),
            Some(_) => {
                return Err(GamificationError::Catalog(
                    "'achievement' must be an array of tables".to_string(),
                ));
            }
            None => Vec::new(),
        };

        let mut definitions = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let id = entry
                .get("id")
                .and_then(toml::Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("#{}", index + 1));

            let kind = entry
                .get("requirement")
                .and_then(|r| r.get("kind"))
                .and_then(toml::Value::as_str)
                .ok_or_else(|| {
                    GamificationError::Catalog(format!("achievement '{}' has no requirement kind", id))
                })?;
            if !Requirement::KINDS.contains(&kind) {
                return Err(GamificationError::UnknownRequirementKind {
                    achievement: id,
                    kind: kind.to_string(),
                });
            }

            let definition = entry.try_into::<AchievementDefinition>().map_err(|e| {
                GamificationError::Catalog(format!("achievement '{}': {}", id, e))
            })?;
            definitions.push(definition);
        }

        Self::from_definitions(definitions)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            GamificationError::Catalog(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check the invariants every evaluation relies on
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for def in &self.definitions {
            let fail = |msg: String| Err(GamificationError::Catalog(format!("'{}': {}", def.id, msg)));

            if def.id.trim().is_empty() {
                return Err(GamificationError::Catalog("empty achievement id".to_string()));
            }
            if !seen.insert(def.id.as_str()) {
                return fail("duplicate id".to_string());
            }
            if def.name.trim().is_empty() {
                return fail("empty name".to_string());
            }

            match &def.requirement {
                Requirement::ActiveDuringHours { start, end } => {
                    if start >= end || *end > 24 {
                        return fail(format!("hour window {}..{} is invalid", start, end));
                    }
                }
                Requirement::ToolsAtMastery { level, target } => {
                    if *level == 0 || *level > crate::metrics::MAX_USAGE_MASTERY {
                        return fail(format!("mastery level {} is out of range", level));
                    }
                    if *target == 0 {
                        return fail("target must be positive".to_string());
                    }
                }
                Requirement::QualityOverVolume {
                    min_messages,
                    min_quality,
                } => {
                    if *min_messages == 0 || *min_quality == 0 || *min_quality > 100 {
                        return fail("volume and quality thresholds must be positive, quality at most 100".to_string());
                    }
                }
                Requirement::AverageQuality { target } => {
                    if *target == 0 || *target > 100 {
                        return fail(format!("quality target {} is outside 1-100", target));
                    }
                }
                Requirement::AgentHighScores { agent, target }
                | Requirement::AgentUsage { agent, target } => {
                    if agent.trim().is_empty() {
                        return fail("per-agent requirement without an agent".to_string());
                    }
                    if *target == 0 {
                        return fail("target must be positive".to_string());
                    }
                }
                Requirement::TotalMessages { target }
                | Requirement::UniqueAgents { target }
                | Requirement::ActiveDays { target }
                | Requirement::PerfectResponses { target }
                | Requirement::HighScores { target }
                | Requirement::QualityResponses { target }
                | Requirement::CurrentStreak { target }
                | Requirement::LongestStreak { target }
                | Requirement::CompletedChallenges { target }
                | Requirement::LongestConversation { target }
                | Requirement::MessagesInOneDay { target }
                | Requirement::TotalPoints { target }
                | Requirement::UnlockedAchievements { target } => {
                    if *target == 0 {
                        return fail("target must be positive".to_string());
                    }
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&AchievementDefinition> {
        self.definitions.iter().find(|d| d.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AchievementDefinition> {
        self.definitions.iter()
    }

    pub fn definitions(&self) -> &[AchievementDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn by_category(&self, category: Category) -> Vec<&AchievementDefinition> {
        self.definitions
            .iter()
            .filter(|d| d.category == category)
            .collect()
    }

    /// Sum of all unlock rewards, rarity applied
    pub fn total_reward_points(&self) -> u64 {
        self.definitions.iter().map(|d| d.reward_points()).sum()
    }
}
