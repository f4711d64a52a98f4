//! Persistence for metrics, unlocks, ledger rows, mastery and snapshots
//!
//! Two backends implement `GamificationStore`: `SqliteStore` for the server
//! and `MemoryStore` for tests and throwaway runs. Both validate ledger
//! appends against the stored log inside one critical section, so a spend
//! can never be checked against a stale balance.
//!
//! Everything one event, patch or sync writes goes through `commit` as a
//! single `ChangeSet`: either all of it lands or none of it does.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::{SCHEMA_VERSION, SqliteStore};

use chrono::{DateTime, Utc};

use crate::achievements::AchievementUnlock;
use crate::error::Result;
use crate::leaderboard::{LeaderboardCategory, UserRank};
use crate::ledger::{AppendReceipt, LedgerTransaction, TransactionDraft};
use crate::mastery::ToolMastery;
use crate::metrics::{MetricsSource, UserMetrics};
use crate::profile::ChallengeCompletion;

/// Achievement row plus the points it pays when newly recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedUnlock {
    pub unlock: AchievementUnlock,
    pub reward: Option<TransactionDraft>,
}

/// All writes of one operation for one user
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub user_id: String,
    pub metrics: Option<UserMetrics>,
    pub tools: Vec<ToolMastery>,
    pub challenges: Vec<ChallengeCompletion>,
    /// Appended in order, before any unlock reward
    pub credits: Vec<TransactionDraft>,
    pub unlocks: Vec<StagedUnlock>,
}

impl ChangeSet {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_none()
            && self.tools.is_empty()
            && self.challenges.is_empty()
            && self.credits.is_empty()
            && self.unlocks.is_empty()
    }
}

/// What a commit wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Credits in order, then the rewards of inserted unlocks
    pub receipts: Vec<AppendReceipt>,
    /// Unlocks that were not recorded before
    pub unlocked: Vec<AchievementUnlock>,
}

pub trait GamificationStore: MetricsSource {
    fn save_metrics(&self, metrics: &UserMetrics) -> Result<()>;

    /// Every user with stored metrics, sorted
    fn user_ids(&self) -> Result<Vec<String>>;

    /// Unlocks for one user, oldest first
    fn unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>>;

    /// Ledger rows for one user, oldest first
    fn transactions(&self, user_id: &str) -> Result<Vec<LedgerTransaction>>;

    /// Validate `draft` against the stored log and append it atomically
    fn append_transaction(
        &self,
        user_id: &str,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<AppendReceipt>;

    fn balance(&self, user_id: &str) -> Result<i64>;

    fn tool_masteries(&self, user_id: &str) -> Result<Vec<ToolMastery>>;

    fn challenges(&self, user_id: &str) -> Result<Vec<ChallengeCompletion>>;

    /// Replace the stored snapshot for `category`
    fn save_snapshot(
        &self,
        category: LeaderboardCategory,
        rankings: &[UserRank],
        taken_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Last recorded ranking of `category`, best first (empty if none)
    fn latest_snapshot(&self, category: LeaderboardCategory) -> Result<Vec<UserRank>>;

    /// Write `changes` atomically.
    ///
    /// Every credit is validated against the stored log first. An unlock
    /// that is already recorded keeps its row, and so its first unlock time,
    /// and pays nothing. Any error leaves the store exactly as it was.
    fn commit(&self, changes: &ChangeSet, now: DateTime<Utc>) -> Result<CommitReceipt>;
}
