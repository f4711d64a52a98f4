//! SQLite store
//!
//! Metrics and tool mastery rows are stored as JSON documents; unlocks,
//! ledger rows, challenge completions and snapshots are plain columns.
//! Timestamps outside the JSON documents are UTC milliseconds.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info};

use super::{ChangeSet, CommitReceipt, GamificationStore};
use crate::achievements::AchievementUnlock;
use crate::error::{GamificationError, Result};
use crate::leaderboard::{LeaderboardCategory, TierName, UserRank};
use crate::ledger::{AppendReceipt, LedgerTransaction, TransactionDraft, TransactionKind, UserLedger};
use crate::mastery::ToolMastery;
use crate::metrics::{MetricsSource, UserMetrics};
use crate::profile::ChallengeCompletion;

/// Current schema version, bumped by every migration
pub const SCHEMA_VERSION: i32 = 2;

/// How long a writer waits for another connection's lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY
);

CREATE TABLE IF NOT EXISTS user_metrics (
    user_id TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS achievement_unlocks (
    user_id TEXT NOT NULL,
    achievement_id TEXT NOT NULL,
    unlocked_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, achievement_id)
);

CREATE TABLE IF NOT EXISTS ledger_transactions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    kind TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    reason TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    refund_of TEXT
);
CREATE INDEX IF NOT EXISTS idx_ledger_user ON ledger_transactions(user_id);

CREATE TABLE IF NOT EXISTS tool_mastery (
    user_id TEXT NOT NULL,
    tool_id TEXT NOT NULL,
    data TEXT NOT NULL,
    PRIMARY KEY (user_id, tool_id)
);

CREATE TABLE IF NOT EXISTS challenge_completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    completed_at INTEGER NOT NULL
);

INSERT OR IGNORE INTO schema_version VALUES (1);
"#;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn to_millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(0, ms))
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerTransaction> {
    let kind: String = row.get(2)?;
    let kind = TransactionKind::from_str(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            Type::Text,
            format!("unknown transaction kind '{}'", kind).into(),
        )
    })?;
    Ok(LedgerTransaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        kind,
        amount: row.get::<_, i64>(3)? as u64,
        reason: row.get(4)?,
        timestamp: from_millis(row.get(5)?)?,
        refund_of: row.get(6)?,
    })
}

fn load_transactions(conn: &Connection, user_id: &str) -> Result<Vec<LedgerTransaction>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, kind, amount, reason, timestamp, refund_of
         FROM ledger_transactions WHERE user_id = ?1 ORDER BY seq",
    )?;
    let rows = stmt
        .query_map([user_id], transaction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Validate `draft` against `ledger`, insert the row and fold it in
fn append_row(
    conn: &Connection,
    ledger: &mut UserLedger,
    draft: &TransactionDraft,
    now: DateTime<Utc>,
) -> Result<AppendReceipt> {
    let prepared = ledger.prepare(draft, now)?;
    conn.execute(
        "INSERT INTO ledger_transactions (id, user_id, kind, amount, reason, timestamp, refund_of)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            prepared.id,
            prepared.user_id,
            prepared.kind.as_str(),
            prepared.amount as i64,
            prepared.reason,
            to_millis(prepared.timestamp),
            prepared.refund_of,
        ],
    )?;
    Ok(ledger.commit(prepared))
}

fn upsert_metrics(conn: &Connection, metrics: &UserMetrics) -> Result<()> {
    let data = serde_json::to_string(metrics)?;
    conn.execute(
        "INSERT INTO user_metrics (user_id, data, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
        params![metrics.user_id, data, to_millis(metrics.updated_at)],
    )?;
    Ok(())
}

fn upsert_tool(conn: &Connection, user_id: &str, mastery: &ToolMastery) -> Result<()> {
    let data = serde_json::to_string(mastery)?;
    conn.execute(
        "INSERT INTO tool_mastery (user_id, tool_id, data) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id, tool_id) DO UPDATE SET data = excluded.data",
        params![user_id, mastery.tool_id, data],
    )?;
    Ok(())
}

fn insert_challenge(conn: &Connection, completion: &ChallengeCompletion) -> Result<()> {
    conn.execute(
        "INSERT INTO challenge_completions (user_id, challenge_id, completed_at)
         VALUES (?1, ?2, ?3)",
        params![
            completion.user_id,
            completion.challenge_id,
            to_millis(completion.completed_at)
        ],
    )?;
    Ok(())
}

/// True when the row was new
fn insert_unlock(conn: &Connection, unlock: &AchievementUnlock) -> Result<bool> {
    let changed = conn.execute(
        "INSERT OR IGNORE INTO achievement_unlocks (user_id, achievement_id, unlocked_at)
         VALUES (?1, ?2, ?3)",
        params![
            unlock.user_id,
            unlock.achievement_id,
            to_millis(unlock.unlocked_at)
        ],
    )?;
    Ok(changed == 1)
}

impl SqliteStore {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        info!("[levelup:store] Opened {}", path.display());
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn schema_version(&self) -> Result<i32> {
        let conn = self.conn();
        let version = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |r| r.get(0),
        )?;
        Ok(version)
    }

    fn run_migrations(&self) -> Result<()> {
        let version = self.schema_version()?;
        let conn = self.conn();

        // Migration 2: leaderboard snapshots for rank deltas
        if version < 2 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS leaderboard_snapshots (
                    category TEXT NOT NULL,
                    user_id TEXT NOT NULL,
                    rank INTEGER NOT NULL,
                    score INTEGER NOT NULL,
                    tier TEXT NOT NULL,
                    taken_at INTEGER NOT NULL,
                    PRIMARY KEY (category, user_id)
                );
                CREATE INDEX IF NOT EXISTS idx_challenge_user ON challenge_completions(user_id);
                "#,
            )?;
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
            debug!("[levelup:store] Migrated schema to version 2");
        }

        Ok(())
    }
}

impl MetricsSource for SqliteStore {
    fn metrics(&self, user_id: &str) -> Result<Option<UserMetrics>> {
        let conn = self.conn();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM user_metrics WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(unavailable_when_busy)?;
        match data {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }
}

/// A busy or locked database is a transient outage of the metrics source
fn unavailable_when_busy(e: rusqlite::Error) -> GamificationError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            GamificationError::MetricsSourceUnavailable(e.to_string())
        }
        _ => GamificationError::Storage(e),
    }
}

impl GamificationStore for SqliteStore {
    fn save_metrics(&self, metrics: &UserMetrics) -> Result<()> {
        upsert_metrics(&self.conn(), metrics)
    }

    fn user_ids(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT user_id FROM user_metrics ORDER BY user_id")?;
        let ids = stmt
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    fn unlocks(&self, user_id: &str) -> Result<Vec<AchievementUnlock>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, achievement_id, unlocked_at FROM achievement_unlocks
             WHERE user_id = ?1 ORDER BY unlocked_at, achievement_id",
        )?;
        let rows = stmt
            .query_map([user_id], |r| {
                Ok(AchievementUnlock {
                    user_id: r.get(0)?,
                    achievement_id: r.get(1)?,
                    unlocked_at: from_millis(r.get(2)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn transactions(&self, user_id: &str) -> Result<Vec<LedgerTransaction>> {
        let conn = self.conn();
        load_transactions(&conn, user_id)
    }

    fn append_transaction(
        &self,
        user_id: &str,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<AppendReceipt> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ledger = UserLedger::from_transactions(user_id, load_transactions(&tx, user_id)?);
        // Dropping `tx` on a rejected draft rolls back the (empty) transaction
        let receipt = append_row(&tx, &mut ledger, draft, now)?;
        tx.commit()?;
        Ok(receipt)
    }

    fn balance(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn();
        let mut ledger = UserLedger::from_transactions(user_id, load_transactions(&conn, user_id)?);
        Ok(ledger.balance())
    }

    fn tool_masteries(&self, user_id: &str) -> Result<Vec<ToolMastery>> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT data FROM tool_mastery WHERE user_id = ?1 ORDER BY tool_id")?;
        let docs = stmt
            .query_map([user_id], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        docs.iter()
            .map(|doc| serde_json::from_str::<ToolMastery>(doc).map_err(GamificationError::from))
            .collect()
    }

    fn challenges(&self, user_id: &str) -> Result<Vec<ChallengeCompletion>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, challenge_id, completed_at FROM challenge_completions
             WHERE user_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([user_id], |r| {
                Ok(ChallengeCompletion {
                    user_id: r.get(0)?,
                    challenge_id: r.get(1)?,
                    completed_at: from_millis(r.get(2)?)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn save_snapshot(
        &self,
        category: LeaderboardCategory,
        rankings: &[UserRank],
        taken_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM leaderboard_snapshots WHERE category = ?1",
            [category.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO leaderboard_snapshots (category, user_id, rank, score, tier, taken_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for r in rankings {
                stmt.execute(params![
                    category.as_str(),
                    r.user_id,
                    r.rank,
                    r.score as i64,
                    r.tier.as_str(),
                    to_millis(taken_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn latest_snapshot(&self, category: LeaderboardCategory) -> Result<Vec<UserRank>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT user_id, rank, score, tier FROM leaderboard_snapshots
             WHERE category = ?1 ORDER BY rank",
        )?;
        let rows = stmt
            .query_map([category.as_str()], |r| {
                let tier: String = r.get(3)?;
                let tier = TierName::from_str(&tier).ok_or_else(|| {
                    rusqlite::Error::FromSqlConversionFailure(
                        3,
                        Type::Text,
                        format!("unknown tier '{}'", tier).into(),
                    )
                })?;
                Ok(UserRank {
                    user_id: r.get(0)?,
                    category,
                    score: r.get::<_, i64>(2)? as u64,
                    rank: r.get(1)?,
                    tier,
                    rank_delta: 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn commit(&self, changes: &ChangeSet, now: DateTime<Utc>) -> Result<CommitReceipt> {
        let user_id = changes.user_id.as_str();
        let mut conn = self.conn();
        // Any `?` below drops `tx`, which rolls back every write made so far
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut ledger = UserLedger::from_transactions(user_id, load_transactions(&tx, user_id)?);

        let mut receipt = CommitReceipt::default();
        for draft in &changes.credits {
            receipt.receipts.push(append_row(&tx, &mut ledger, draft, now)?);
        }
        for staged in &changes.unlocks {
            if !insert_unlock(&tx, &staged.unlock)? {
                continue;
            }
            if let Some(reward) = &staged.reward {
                receipt.receipts.push(append_row(&tx, &mut ledger, reward, now)?);
            }
            receipt.unlocked.push(staged.unlock.clone());
        }
        if let Some(metrics) = &changes.metrics {
            upsert_metrics(&tx, metrics)?;
        }
        for mastery in &changes.tools {
            upsert_tool(&tx, user_id, mastery)?;
        }
        for completion in &changes.challenges {
            insert_challenge(&tx, completion)?;
        }

        tx.commit()?;
        debug!(
            "[levelup:store] Committed {} ledger rows and {} unlocks for {}",
            receipt.receipts.len(),
            receipt.unlocked.len(),
            user_id
        );
        Ok(receipt)
    }
}
