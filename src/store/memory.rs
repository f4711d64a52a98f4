//! In-memory store
//!
//! The ledger half is a `RewardsLedger`, which already serializes appends per
//! user. Everything else sits behind a single `RwLock`. A commit holds the
//! user's ledger lock and then the table lock, never the other way round.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{ChangeSet, CommitReceipt, GamificationStore};
use crate::achievements::AchievementUnlock;
use crate::error::Result;
use crate::leaderboard::{LeaderboardCategory, UserRank};
use crate::ledger::{AppendReceipt, LedgerTransaction, RewardsLedger, TransactionDraft};
use crate::mastery::ToolMastery;
use crate::metrics::{MetricsSource, UserMetrics};
use crate::profile::ChallengeCompletion;

#[derive(Debug, Default)]
struct Tables {
    metrics: BTreeMap<String, UserMetrics>,
    unlocks: HashMap<String, Vec<AchievementUnlock>>,
    tools: HashMap<String, BTreeMap<String, ToolMastery>>,
    challenges: HashMap<String, Vec<ChallengeCompletion>>,
    snapshots: HashMap<LeaderboardCategory, Vec<UserRank>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    ledger: RewardsLedger,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> T {
        let tables = self.tables.read().unwrap_or_else(|e| e.into_inner());
        f(&tables)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> T {
        let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());
        f(&mut tables)
    }
}

impl MetricsSource for MemoryStore {
    fn metrics(&self, user_id: &str) -> Result<Option<UserMetrics>> {
        Ok(self.read(|t| t.metrics.get(user_id).cloned()))
    }
}

impl GamificationStore for MemoryStore {
    fn save_metrics(&self, metrics: &UserMetrics) -> Result<()> {
        self.write(|t| {
            t.metrics.insert(metrics.user_id.clone(), metrics.clone());
        });
        Ok(())
    }

    fn user_ids(&self) -> Result<Vec<String>> {
        Ok(self.read(|t| t.metrics.keys().cloned().collect()))
    }

    fn unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        Ok(self.read(|t| t.unlocks.get(user_id).cloned().unwrap_or_default()))
    }

    fn transactions(&self, user_id: &str) -> Result<Vec<LedgerTransaction>> {
        Ok(self.ledger.history(user_id))
    }

    fn append_transaction(
        &self,
        user_id: &str,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<AppendReceipt> {
        self.ledger.append_at(user_id, draft, now)
    }

    fn balance(&self, user_id: &str) -> Result<i64> {
        Ok(self.ledger.balance(user_id))
    }

    fn tool_masteries(&self, user_id: &str) -> Result<Vec<ToolMastery>> {
        Ok(self.read(|t| {
            t.tools
                .get(user_id)
                .map(|tools| tools.values().cloned().collect())
                .unwrap_or_default()
        }))
    }

    fn challenges(&self, user_id: &str) -> Result<Vec<ChallengeCompletion>> {
        Ok(self.read(|t| t.challenges.get(user_id).cloned().unwrap_or_default()))
    }

    fn save_snapshot(
        &self,
        category: LeaderboardCategory,
        rankings: &[UserRank],
        _taken_at: DateTime<Utc>,
    ) -> Result<()> {
        let rows = rankings
            .iter()
            .map(|r| UserRank {
                rank_delta: 0,
                ..r.clone()
            })
            .collect();
        self.write(|t| {
            t.snapshots.insert(category, rows);
        });
        Ok(())
    }

    fn latest_snapshot(&self, category: LeaderboardCategory) -> Result<Vec<UserRank>> {
        Ok(self.read(|t| t.snapshots.get(&category).cloned().unwrap_or_default()))
    }

    fn commit(&self, changes: &ChangeSet, now: DateTime<Utc>) -> Result<CommitReceipt> {
        let user_id = changes.user_id.as_str();
        self.ledger.with_user(user_id, |ledger| -> Result<CommitReceipt> {
            let mut tables = self.tables.write().unwrap_or_else(|e| e.into_inner());

            // Validate on a copy; nothing is touched until every draft passes
            let mut next = ledger.clone();
            let mut receipt = CommitReceipt::default();
            for draft in &changes.credits {
                let prepared = next.prepare(draft, now)?;
                receipt.receipts.push(next.commit(prepared));
            }
            let mut recorded: BTreeSet<String> = tables
                .unlocks
                .get(user_id)
                .map(|rows| rows.iter().map(|r| r.achievement_id.clone()).collect())
                .unwrap_or_default();
            for staged in &changes.unlocks {
                if !recorded.insert(staged.unlock.achievement_id.clone()) {
                    continue;
                }
                if let Some(reward) = &staged.reward {
                    let prepared = next.prepare(reward, now)?;
                    receipt.receipts.push(next.commit(prepared));
                }
                receipt.unlocked.push(staged.unlock.clone());
            }

            *ledger = next;
            tables
                .unlocks
                .entry(user_id.to_string())
                .or_default()
                .extend(receipt.unlocked.iter().cloned());
            if let Some(metrics) = &changes.metrics {
                tables.metrics.insert(user_id.to_string(), metrics.clone());
            }
            let tools = tables.tools.entry(user_id.to_string()).or_default();
            for mastery in &changes.tools {
                tools.insert(mastery.tool_id.clone(), mastery.clone());
            }
            tables
                .challenges
                .entry(user_id.to_string())
                .or_default()
                .extend(changes.challenges.iter().cloned());
            Ok(receipt)
        })
    }
}
