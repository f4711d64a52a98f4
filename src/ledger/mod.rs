//! Rewards ledger: append-only points economy
//!
//! The transaction log is the single source of truth. A balance is the fold
//! `Σearn + Σbonus + Σrefund − Σspend` over the log; the cached balance kept
//! next to it is only a projection and is checked against the fold on every
//! read.
//!
//! Every append is validate-then-push: a rejected draft leaves the log
//! untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{GamificationError, Result};

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Earn,
    Spend,
    Bonus,
    Refund,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Spend => "spend",
            Self::Bonus => "bonus",
            Self::Refund => "refund",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "earn" => Some(Self::Earn),
            "spend" => Some(Self::Spend),
            "bonus" => Some(Self::Bonus),
            "refund" => Some(Self::Refund),
            _ => None,
        }
    }

    /// Contribution of `amount` to the balance
    pub fn signed(&self, amount: u64) -> i64 {
        let amount = i64::try_from(amount).unwrap_or(i64::MAX);
        match self {
            Self::Spend => -amount,
            Self::Earn | Self::Bonus | Self::Refund => amount,
        }
    }
}

/// Single entry in a user's ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
    /// Spend this refund pays back
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub refund_of: Option<String>,
}

/// A transaction before validation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDraft {
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub amount: u64,
    pub reason: String,
    #[serde(default)]
    pub refund_of: Option<String>,
}

impl TransactionDraft {
    pub fn new(kind: TransactionKind, amount: u64, reason: impl Into<String>) -> Self {
        Self {
            kind,
            amount,
            reason: reason.into(),
            refund_of: None,
        }
    }

    pub fn earn(amount: u64, reason: impl Into<String>) -> Self {
        Self::new(TransactionKind::Earn, amount, reason)
    }

    pub fn spend(amount: u64, reason: impl Into<String>) -> Self {
        Self::new(TransactionKind::Spend, amount, reason)
    }

    pub fn bonus(amount: u64, reason: impl Into<String>) -> Self {
        Self::new(TransactionKind::Bonus, amount, reason)
    }

    pub fn refund(spend_id: impl Into<String>, amount: u64, reason: impl Into<String>) -> Self {
        Self {
            kind: TransactionKind::Refund,
            amount,
            reason: reason.into(),
            refund_of: Some(spend_id.into()),
        }
    }
}

/// Result of a successful append
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendReceipt {
    pub transaction: LedgerTransaction,
    pub balance_after: i64,
}

/// Totals over a ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSummary {
    pub balance: i64,
    /// Earn plus bonus
    pub total_earned: u64,
    pub total_spent: u64,
    pub total_refunded: u64,
    /// Spent minus refunded
    pub net_spent: u64,
    pub transactions: usize,
}

/// Balance as the fold over a transaction log, saturating at the i64 bounds
pub fn fold_balance(transactions: &[LedgerTransaction]) -> i64 {
    transactions
        .iter()
        .fold(0i64, |balance, t| balance.saturating_add(t.kind.signed(t.amount)))
}

/// One user's transaction log with its cached balance
#[derive(Debug, Clone)]
pub struct UserLedger {
    user_id: String,
    transactions: Vec<LedgerTransaction>,
    cached_balance: i64,
}

impl UserLedger {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            transactions: Vec::new(),
            cached_balance: 0,
        }
    }

    /// Rebuild from a stored log by replaying it
    pub fn from_transactions(user_id: impl Into<String>, transactions: Vec<LedgerTransaction>) -> Self {
        let cached_balance = fold_balance(&transactions);
        Self {
            user_id: user_id.into(),
            transactions,
            cached_balance,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn transactions(&self) -> &[LedgerTransaction] {
        &self.transactions
    }

    /// Balance from the log; a drifted cache is logged and repaired
    pub fn balance(&mut self) -> i64 {
        let folded = fold_balance(&self.transactions);
        if folded != self.cached_balance {
            warn!(
                "[levelup:ledger] Cached balance {} for {} diverged from log ({}), repairing",
                self.cached_balance, self.user_id, folded
            );
            self.cached_balance = folded;
        }
        folded
    }

    /// Points already refunded against `spend_id`
    pub fn refunded_amount(&self, spend_id: &str) -> u64 {
        self.transactions
            .iter()
            .filter(|t| t.kind == TransactionKind::Refund && t.refund_of.as_deref() == Some(spend_id))
            .fold(0u64, |sum, t| sum.saturating_add(t.amount))
    }

    /// Validate `draft` against the current log and build the transaction.
    ///
    /// Nothing is written; pair with `commit`.
    pub fn prepare(&mut self, draft: &TransactionDraft, now: DateTime<Utc>) -> Result<LedgerTransaction> {
        if draft.amount == 0 {
            return Err(GamificationError::Validation(
                "transaction amount must be positive".to_string(),
            ));
        }
        if i64::try_from(draft.amount).is_err() {
            return Err(GamificationError::Validation(format!(
                "transaction amount {} is too large",
                draft.amount
            )));
        }
        if draft.reason.trim().is_empty() {
            return Err(GamificationError::Validation(
                "transaction reason is required".to_string(),
            ));
        }

        let current = self.balance();
        if current.checked_add(draft.kind.signed(draft.amount)).is_none() {
            return Err(GamificationError::Validation(format!(
                "{} of {} would overflow the balance of {}",
                draft.kind.as_str(),
                draft.amount,
                current
            )));
        }

        match draft.kind {
            TransactionKind::Spend => {
                let available = current;
                if draft.amount as i64 > available {
                    return Err(GamificationError::InsufficientBalance {
                        requested: draft.amount,
                        available,
                    });
                }
            }
            TransactionKind::Refund => {
                let spend_id = draft.refund_of.as_deref().ok_or_else(|| {
                    GamificationError::InvalidRefund("refund must reference a spend".to_string())
                })?;
                let spend = self
                    .transactions
                    .iter()
                    .find(|t| t.id == spend_id && t.kind == TransactionKind::Spend)
                    .ok_or_else(|| {
                        GamificationError::InvalidRefund(format!(
                            "no spend '{}' for user {}",
                            spend_id, self.user_id
                        ))
                    })?;
                let refunded = self.refunded_amount(spend_id);
                if refunded.saturating_add(draft.amount) > spend.amount {
                    return Err(GamificationError::InvalidRefund(format!(
                        "spend '{}' of {} already has {} refunded, cannot refund {} more",
                        spend_id, spend.amount, refunded, draft.amount
                    )));
                }
            }
            TransactionKind::Earn | TransactionKind::Bonus => {
                if draft.refund_of.is_some() {
                    return Err(GamificationError::Validation(format!(
                        "{} transactions cannot reference a spend",
                        draft.kind.as_str()
                    )));
                }
            }
        }

        Ok(LedgerTransaction {
            id: Uuid::new_v4().to_string(),
            user_id: self.user_id.clone(),
            kind: draft.kind,
            amount: draft.amount,
            reason: draft.reason.clone(),
            timestamp: now,
            refund_of: draft.refund_of.clone(),
        })
    }

    /// Push an already prepared transaction
    pub fn commit(&mut self, transaction: LedgerTransaction) -> AppendReceipt {
        self.cached_balance = self
            .cached_balance
            .saturating_add(transaction.kind.signed(transaction.amount));
        self.transactions.push(transaction.clone());
        AppendReceipt {
            balance_after: self.balance(),
            transaction,
        }
    }

    pub fn append(&mut self, draft: &TransactionDraft, now: DateTime<Utc>) -> Result<AppendReceipt> {
        let transaction = self.prepare(draft, now)?;
        Ok(self.commit(transaction))
    }

    /// Has any transaction with this reason been recorded
    pub fn has_reason(&self, reason: &str) -> bool {
        self.transactions.iter().any(|t| t.reason == reason)
    }

    /// Newest first
    pub fn recent(&self, limit: usize) -> Vec<&LedgerTransaction> {
        self.transactions.iter().rev().take(limit).collect()
    }

    pub fn summary(&mut self) -> LedgerSummary {
        let mut summary = LedgerSummary {
            balance: self.balance(),
            transactions: self.transactions.len(),
            ..Default::default()
        };
        for t in &self.transactions {
            match t.kind {
                TransactionKind::Earn | TransactionKind::Bonus => {
                    summary.total_earned = summary.total_earned.saturating_add(t.amount)
                }
                TransactionKind::Spend => {
                    summary.total_spent = summary.total_spent.saturating_add(t.amount)
                }
                TransactionKind::Refund => {
                    summary.total_refunded = summary.total_refunded.saturating_add(t.amount)
                }
            }
        }
        summary.net_spent = summary.total_spent.saturating_sub(summary.total_refunded);
        summary
    }

    #[cfg(test)]
    pub(crate) fn corrupt_cache(&mut self, value: i64) {
        self.cached_balance = value;
    }
}

/// In-process ledger for many users
///
/// Each user's log sits behind its own mutex, so appends for one user are
/// serialized while different users proceed in parallel.
#[derive(Debug, Default)]
pub struct RewardsLedger {
    users: RwLock<HashMap<String, Arc<Mutex<UserLedger>>>>,
}

impl RewardsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn user(&self, user_id: &str) -> Arc<Mutex<UserLedger>> {
        if let Some(ledger) = self
            .users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
        {
            return Arc::clone(ledger);
        }
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            users
                .entry(user_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(UserLedger::new(user_id)))),
        )
    }

    /// Ledger of a user that has one; reads never create entries
    fn existing(&self, user_id: &str) -> Option<Arc<Mutex<UserLedger>>> {
        self.users
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(user_id)
            .map(Arc::clone)
    }

    pub fn append(&self, user_id: &str, draft: &TransactionDraft) -> Result<AppendReceipt> {
        self.append_at(user_id, draft, Utc::now())
    }

    pub fn append_at(
        &self,
        user_id: &str,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<AppendReceipt> {
        let ledger = self.user(user_id);
        let mut ledger = ledger.lock().unwrap_or_else(|e| e.into_inner());
        ledger.append(draft, now)
    }

    /// 0 for users without a ledger
    pub fn balance(&self, user_id: &str) -> i64 {
        self.existing(user_id).map_or(0, |ledger| {
            ledger.lock().unwrap_or_else(|e| e.into_inner()).balance()
        })
    }

    /// Copy of the user's full log, oldest first
    pub fn history(&self, user_id: &str) -> Vec<LedgerTransaction> {
        self.existing(user_id).map_or_else(Vec::new, |ledger| {
            ledger
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .transactions()
                .to_vec()
        })
    }

    pub fn summary(&self, user_id: &str) -> LedgerSummary {
        self.existing(user_id).map_or_else(LedgerSummary::default, |ledger| {
            ledger.lock().unwrap_or_else(|e| e.into_inner()).summary()
        })
    }

    /// Run `f` with exclusive access to one user's ledger
    pub fn with_user<T>(&self, user_id: &str, f: impl FnOnce(&mut UserLedger) -> T) -> T {
        let ledger = self.user(user_id);
        let mut ledger = ledger.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut ledger)
    }
}
