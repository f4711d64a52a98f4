//! Gamification service: the event pipeline on top of a store
//!
//! Every write for a user runs under that user's lock, so the read of
//! metrics, unlocks and balance and the appends computed from them can never
//! interleave with another write for the same user. Different users proceed
//! in parallel.
//!
//! An operation first stages all of its effects (metrics, XP, ledger credits,
//! unlocks) against copies of the stored state, then hands them to the store
//! as one `ChangeSet`. A failure anywhere before or during the commit leaves
//! the store untouched.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::achievements::{AchievementUnlock, Catalog, evaluate, newly_unlocked};
use crate::error::{GamificationError, Result};
use crate::leaderboard::{
    CompetitiveInsight, LeaderboardCategory, LeaderboardInputs, TierName, UserRank,
    competitive_insight, context_window, page, promotions, rank_against, score, tier_distribution,
};
use crate::ledger::{AppendReceipt, LedgerSummary, LedgerTransaction, TransactionDraft, UserLedger};
use crate::mastery::{ToolMastery, grant_xp};
use crate::metrics::{
    MetricsEvent, MetricsPatch, MetricsSource, StreakChange, UserMetrics, apply_event,
};
use crate::profile::{
    ChallengeCompletion, Dashboard, DashboardInput, GamificationEvent, GamificationProfile,
    WeeklyReport, build_profile, dashboard, level_up_notification, tier_upgrade,
    unlock_notifications, weekly_report,
};
use crate::store::{ChangeSet, GamificationStore, StagedUnlock};

/// Longest accepted user id
pub const MAX_USER_ID_LEN: usize = 128;

/// Ledger rows returned by `sync`
pub const SYNC_RECENT_TRANSACTIONS: usize = 20;

/// Reject empty, overlong or oddly shaped user ids
pub fn validate_user_id(user_id: &str) -> Result<()> {
    if user_id.is_empty() {
        return Err(GamificationError::Validation("userId is required".to_string()));
    }
    if user_id.len() > MAX_USER_ID_LEN {
        return Err(GamificationError::Validation(format!(
            "userId is longer than {} characters",
            MAX_USER_ID_LEN
        )));
    }
    if !user_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '@'))
    {
        return Err(GamificationError::Validation(format!(
            "userId '{}' contains invalid characters",
            user_id
        )));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn get(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map holds these, so no thread is inside or waiting
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Response to a single event
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventOutcome {
    /// False for event types outside the vocabulary
    pub event_processed: bool,
    /// Points the event itself paid
    pub points_awarded: u64,
    /// Mastery level rewards and achievement grants triggered by the event
    pub bonus_points: u64,
    pub new_achievements: Vec<String>,
    pub notifications: Vec<GamificationEvent>,
    pub gamification: GamificationProfile,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSyncRequest {
    #[serde(default)]
    pub metrics: Option<MetricsPatch>,
    #[serde(default)]
    pub events: Vec<MetricsEvent>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkSyncOutcome {
    pub metrics_applied: bool,
    pub events_received: usize,
    pub events_processed: usize,
    /// Unknown event types
    pub events_ignored: usize,
    /// Known types with malformed data
    pub events_rejected: usize,
    pub points_awarded: u64,
    pub bonus_points: u64,
    pub new_achievements: Vec<String>,
    pub gamification: GamificationProfile,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    pub gamification: GamificationProfile,
    /// Newest first
    pub recent_transactions: Vec<LedgerTransaction>,
    pub unlocks: Vec<AchievementUnlock>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerView {
    pub summary: LedgerSummary,
    pub transactions: Vec<LedgerTransaction>,
}

/// Paging and context options for a leaderboard read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardQuery {
    /// 1-based
    pub page: usize,
    pub page_size: usize,
    /// Include this user's neighbourhood and insight
    pub around: Option<String>,
    pub radius: usize,
}

impl Default for LeaderboardQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 50,
            around: None,
            radius: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardView {
    pub category: LeaderboardCategory,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub entries: Vec<UserRank>,
    pub tier_distribution: BTreeMap<TierName, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Vec<UserRank>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insight: Option<CompetitiveInsight>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotReceipt {
    pub category: LeaderboardCategory,
    pub entries: usize,
    pub taken_at: DateTime<Utc>,
    /// Users whose tier rose since the previous snapshot
    pub promotions: Vec<UserRank>,
}

/// What folding one event did
#[derive(Debug, Default)]
struct Folded {
    known: bool,
    points: u64,
    bonus: u64,
}

/// Effects of one operation, not yet written
#[derive(Debug, Clone)]
struct Staged {
    metrics: UserMetrics,
    /// Copy of the stored log; every credit is checked against it when staged
    ledger: UserLedger,
    tools: BTreeMap<String, ToolMastery>,
    touched_tools: BTreeSet<String>,
    unlocked: BTreeSet<String>,
    changes: ChangeSet,
    /// Everything but points and unlock notices, which come from the commit
    notifications: Vec<GamificationEvent>,
}

impl Staged {
    fn credit(&mut self, draft: TransactionDraft, now: DateTime<Utc>) -> Result<()> {
        self.ledger.append(&draft, now)?;
        self.changes.credits.push(draft);
        Ok(())
    }
}

/// What a committed operation reports back
#[derive(Debug)]
struct Committed {
    metrics: UserMetrics,
    achievement_points: u64,
    new_achievements: Vec<String>,
    notifications: Vec<GamificationEvent>,
}

pub struct GamificationService {
    store: Arc<dyn GamificationStore>,
    catalog: Arc<Catalog>,
    locks: UserLocks,
}

impl GamificationService {
    pub fn new(store: Arc<dyn GamificationStore>, catalog: Arc<Catalog>) -> Self {
        Self {
            store,
            catalog,
            locks: UserLocks::default(),
        }
    }

    /// Service over `store` with the built-in catalog
    pub fn with_builtin_catalog(store: Arc<dyn GamificationStore>) -> Self {
        Self::new(store, Arc::new(Catalog::builtin().clone()))
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<dyn GamificationStore> {
        &self.store
    }

    fn load_or_create(&self, user_id: &str, now: DateTime<Utc>) -> Result<(UserMetrics, bool)> {
        match self.store.metrics(user_id)? {
            Some(metrics) => Ok((metrics, false)),
            None => Ok((UserMetrics::new(user_id, now), true)),
        }
    }

    fn snapshot(&self, metrics: UserMetrics) -> Result<GamificationProfile> {
        let user_id = metrics.user_id.clone();
        let unlocks = self.store.unlocks(&user_id)?;
        let tools = self.store.tool_masteries(&user_id)?;
        let balance = self.store.balance(&user_id)?;
        Ok(build_profile(&self.catalog, metrics, &unlocks, tools, balance))
    }

    /// Profile for `user_id`, created and stored on first access
    pub fn profile(&self, user_id: &str) -> Result<GamificationProfile> {
        self.profile_at(user_id, Utc::now())
    }

    pub fn profile_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<GamificationProfile> {
        validate_user_id(user_id)?;
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let (metrics, created) = self.load_or_create(user_id, now)?;
        if created {
            self.store.save_metrics(&metrics)?;
            info!("[levelup:service] Created profile for {}", user_id);
        }
        self.snapshot(metrics)
    }

    /// Merge a partial metrics update, then pay for any unlocks it caused
    pub fn patch_metrics(&self, user_id: &str, patch: &MetricsPatch) -> Result<EventOutcome> {
        self.patch_metrics_at(user_id, patch, Utc::now())
    }

    pub fn patch_metrics_at(
        &self,
        user_id: &str,
        patch: &MetricsPatch,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        validate_user_id(user_id)?;
        patch.validate()?;
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut staged = self.stage(user_id, now)?;
        let before = staged.metrics.total_points();
        patch.apply(&mut staged.metrics, now);
        push_tier_upgrade(&mut staged.notifications, before, staged.metrics.total_points());
        self.stage_achievements(&mut staged, now)?;
        let committed = self.commit(staged, now)?;

        Ok(EventOutcome {
            event_processed: true,
            points_awarded: 0,
            bonus_points: committed.achievement_points,
            new_achievements: committed.new_achievements,
            notifications: committed.notifications,
            gamification: self.snapshot(committed.metrics)?,
        })
    }

    pub fn process_event(&self, user_id: &str, event: &MetricsEvent) -> Result<EventOutcome> {
        self.process_event_at(user_id, event, Utc::now())
    }

    /// Fold one event into the user's state.
    ///
    /// Unknown event types are acknowledged with zero points. Malformed data
    /// on a known type is a validation error and changes nothing.
    pub fn process_event_at(
        &self,
        user_id: &str,
        event: &MetricsEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome> {
        validate_user_id(user_id)?;
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut staged = self.stage(user_id, now)?;
        let folded = self.fold_event(&mut staged, event, now)?;
        self.stage_achievements(&mut staged, now)?;
        let committed = self.commit(staged, now)?;

        Ok(EventOutcome {
            event_processed: folded.known,
            points_awarded: folded.points,
            bonus_points: folded.bonus.saturating_add(committed.achievement_points),
            new_achievements: committed.new_achievements,
            notifications: committed.notifications,
            gamification: self.snapshot(committed.metrics)?,
        })
    }

    /// Apply an optional metrics patch, then fold events in array order.
    ///
    /// Events with malformed data are skipped and counted; they do not abort
    /// the batch and leave no trace. Any other failure writes nothing.
    pub fn bulk_sync(&self, user_id: &str, request: &BulkSyncRequest) -> Result<BulkSyncOutcome> {
        self.bulk_sync_at(user_id, request, Utc::now())
    }

    pub fn bulk_sync_at(
        &self,
        user_id: &str,
        request: &BulkSyncRequest,
        now: DateTime<Utc>,
    ) -> Result<BulkSyncOutcome> {
        validate_user_id(user_id)?;
        if let Some(patch) = &request.metrics {
            patch.validate()?;
        }
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let mut staged = self.stage(user_id, now)?;
        let mut metrics_applied = false;
        if let Some(patch) = request.metrics.as_ref().filter(|p| !p.is_empty()) {
            let before = staged.metrics.total_points();
            patch.apply(&mut staged.metrics, now);
            push_tier_upgrade(&mut staged.notifications, before, staged.metrics.total_points());
            metrics_applied = true;
        }

        let mut events_processed = 0;
        let mut events_ignored = 0;
        let mut events_rejected = 0;
        let mut points_awarded = 0u64;
        let mut bonus_points = 0u64;
        for event in &request.events {
            match self.fold_event(&mut staged, event, now) {
                Ok(folded) if folded.known => {
                    events_processed += 1;
                    points_awarded = points_awarded.saturating_add(folded.points);
                    bonus_points = bonus_points.saturating_add(folded.bonus);
                }
                Ok(_) => events_ignored += 1,
                Err(GamificationError::Validation(reason)) => {
                    warn!(
                        "[levelup:service] Skipping {} event for {}: {}",
                        event.event_type, user_id, reason
                    );
                    events_rejected += 1;
                }
                Err(e) => return Err(e),
            }
        }
        self.stage_achievements(&mut staged, now)?;
        let committed = self.commit(staged, now)?;
        info!(
            "[levelup:service] Bulk sync for {}: {} processed, {} ignored, {} rejected",
            user_id, events_processed, events_ignored, events_rejected
        );

        Ok(BulkSyncOutcome {
            metrics_applied,
            events_received: request.events.len(),
            events_processed,
            events_ignored,
            events_rejected,
            points_awarded,
            bonus_points: bonus_points.saturating_add(committed.achievement_points),
            new_achievements: committed.new_achievements,
            gamification: self.snapshot(committed.metrics)?,
        })
    }

    /// Profile plus recent ledger rows and all unlocks
    pub fn sync(&self, user_id: &str) -> Result<SyncPayload> {
        let gamification = self.profile(user_id)?;
        let ledger = UserLedger::from_transactions(user_id, self.store.transactions(user_id)?);
        Ok(SyncPayload {
            gamification,
            recent_transactions: ledger
                .recent(SYNC_RECENT_TRANSACTIONS)
                .into_iter()
                .cloned()
                .collect(),
            unlocks: self.store.unlocks(user_id)?,
        })
    }

    /// Manual ledger entry (earn, spend, bonus or refund)
    pub fn append_transaction(&self, user_id: &str, draft: &TransactionDraft) -> Result<AppendReceipt> {
        self.append_transaction_at(user_id, draft, Utc::now())
    }

    pub fn append_transaction_at(
        &self,
        user_id: &str,
        draft: &TransactionDraft,
        now: DateTime<Utc>,
    ) -> Result<AppendReceipt> {
        validate_user_id(user_id)?;
        let lock = self.locks.get(user_id);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let receipt = self.store.append_transaction(user_id, draft, now)?;
        info!(
            "[levelup:ledger] {} {} for {} ({}), balance {}",
            receipt.transaction.kind.as_str(),
            receipt.transaction.amount,
            user_id,
            receipt.transaction.reason,
            receipt.balance_after
        );
        Ok(receipt)
    }

    /// Totals plus the full log, newest first
    pub fn ledger(&self, user_id: &str) -> Result<LedgerView> {
        validate_user_id(user_id)?;
        let mut ledger = UserLedger::from_transactions(user_id, self.store.transactions(user_id)?);
        Ok(LedgerView {
            summary: ledger.summary(),
            transactions: ledger
                .recent(ledger.transactions().len())
                .into_iter()
                .cloned()
                .collect(),
        })
    }

    pub fn dashboard(&self, user_id: &str) -> Result<Dashboard> {
        let profile = self.profile(user_id)?;
        let unlocks = self.store.unlocks(user_id)?;
        let rankings = self.rankings(LeaderboardCategory::TotalPoints)?;
        let rank = rankings.iter().find(|r| r.user_id == user_id);

        Ok(dashboard(DashboardInput {
            metrics: &profile.metrics,
            unlocks: &unlocks,
            tools: &profile.tools,
            balance: profile.balance,
            rank,
        }))
    }

    pub fn weekly_report(&self, user_id: &str) -> Result<WeeklyReport> {
        self.weekly_report_at(user_id, Utc::now())
    }

    pub fn weekly_report_at(&self, user_id: &str, now: DateTime<Utc>) -> Result<WeeklyReport> {
        validate_user_id(user_id)?;
        Ok(weekly_report(
            &self.store.transactions(user_id)?,
            &self.store.challenges(user_id)?,
            &self.store.unlocks(user_id)?,
            now,
        ))
    }

    fn leaderboard_inputs(&self, metrics: &UserMetrics) -> Result<LeaderboardInputs> {
        let unlocked = self.store.unlocks(&metrics.user_id)?.len() as u64;
        let mastered = self
            .store
            .tool_masteries(&metrics.user_id)?
            .iter()
            .filter(|t| t.is_mastered())
            .count() as u64;
        Ok(LeaderboardInputs {
            total_points: metrics.total_points(),
            unlocked_achievements: unlocked,
            current_streak: metrics.current_streak,
            average_quality: metrics.average_quality(),
            mastered_tools: mastered,
        })
    }

    /// Full ranking of `category`, deltas against the last snapshot.
    ///
    /// Read-only; a failed run can simply be repeated.
    pub fn rankings(&self, category: LeaderboardCategory) -> Result<Vec<UserRank>> {
        let mut scores = Vec::new();
        for user_id in self.store.user_ids()? {
            let Some(metrics) = self.store.metrics(&user_id)? else {
                continue;
            };
            let inputs = self.leaderboard_inputs(&metrics)?;
            scores.push((user_id, score(category, &inputs)));
        }

        let previous: HashMap<String, u32> = self
            .store
            .latest_snapshot(category)?
            .into_iter()
            .map(|r| (r.user_id, r.rank))
            .collect();
        debug!(
            "[levelup:leaderboard] Ranked {} users in {}",
            scores.len(),
            category.as_str()
        );
        Ok(rank_against(category, &scores, &previous))
    }

    pub fn leaderboard(
        &self,
        category: LeaderboardCategory,
        query: &LeaderboardQuery,
    ) -> Result<LeaderboardView> {
        let rankings = self.rankings(category)?;
        let (context, insight) = match &query.around {
            Some(user_id) => {
                let context = context_window(&rankings, user_id, query.radius).to_vec();
                let insight = rankings
                    .iter()
                    .find(|r| &r.user_id == user_id)
                    .map(|user| competitive_insight(user, &rankings));
                (Some(context), insight)
            }
            None => (None, None),
        };

        Ok(LeaderboardView {
            category,
            total: rankings.len(),
            page: query.page,
            page_size: query.page_size,
            entries: page(&rankings, query.page, query.page_size).to_vec(),
            tier_distribution: tier_distribution(rankings.iter().map(|r| &r.tier)),
            context,
            insight,
        })
    }

    /// Store the current ranking as the baseline for future rank deltas
    pub fn record_snapshot(&self, category: LeaderboardCategory) -> Result<SnapshotReceipt> {
        self.record_snapshot_at(category, Utc::now())
    }

    pub fn record_snapshot_at(
        &self,
        category: LeaderboardCategory,
        now: DateTime<Utc>,
    ) -> Result<SnapshotReceipt> {
        let previous = self.store.latest_snapshot(category)?;
        let current = self.rankings(category)?;
        let promoted: Vec<UserRank> = promotions(&previous, &current, 1)
            .into_iter()
            .cloned()
            .collect();
        self.store.save_snapshot(category, &current, now)?;
        info!(
            "[levelup:leaderboard] Snapshot of {}: {} entries, {} promotions",
            category.as_str(),
            current.len(),
            promoted.len()
        );

        Ok(SnapshotReceipt {
            category,
            entries: current.len(),
            taken_at: now,
            promotions: promoted,
        })
    }

    /// Current stored state of `user_id`, ready to stage changes on
    fn stage(&self, user_id: &str, now: DateTime<Utc>) -> Result<Staged> {
        let (metrics, _) = self.load_or_create(user_id, now)?;
        Ok(Staged {
            metrics,
            ledger: UserLedger::from_transactions(user_id, self.store.transactions(user_id)?),
            tools: self
                .store
                .tool_masteries(user_id)?
                .into_iter()
                .map(|t| (t.tool_id.clone(), t))
                .collect(),
            touched_tools: BTreeSet::new(),
            unlocked: self
                .store
                .unlocks(user_id)?
                .into_iter()
                .map(|u| u.achievement_id)
                .collect(),
            changes: ChangeSet::new(user_id),
            notifications: Vec::new(),
        })
    }

    /// Stage one event. On error `staged` is left as it was.
    fn fold_event(
        &self,
        staged: &mut Staged,
        event: &MetricsEvent,
        now: DateTime<Utc>,
    ) -> Result<Folded> {
        let mut next = staged.clone();
        let user_id = next.metrics.user_id.clone();
        let before = next.metrics.total_points();

        let effect = apply_event(&mut next.metrics, event, now)?;
        let Some(kind) = effect.kind else {
            debug!(
                "[levelup:service] Ignoring unknown event type '{}' for {}",
                event.event_type, user_id
            );
            return Ok(Folded::default());
        };

        let mut points = effect.points;
        if kind.once_per_user() && next.ledger.has_reason(kind.as_str()) {
            debug!(
                "[levelup:service] {} already paid for {}",
                kind.as_str(),
                user_id
            );
            points = 0;
        }

        let mut folded = Folded {
            known: true,
            points,
            bonus: 0,
        };
        if points > 0 {
            next.credit(TransactionDraft::earn(points, kind.as_str()), now)?;
        }

        if let Some(interaction) = &effect.interaction {
            let mastery = next
                .tools
                .entry(interaction.tool.clone())
                .or_insert_with(|| ToolMastery::new(interaction.tool.clone()));
            let grant = grant_xp(mastery, interaction)?;
            next.touched_tools.insert(grant.tool_id.clone());

            for level in &grant.levels_reached {
                let reward = level.reward_points();
                if reward > 0 {
                    let reason = format!("mastery:{}:{}", grant.tool_id, level.as_str());
                    next.credit(TransactionDraft::bonus(reward, reason), now)?;
                    folded.bonus = folded.bonus.saturating_add(reward);
                }
            }
            if let Some(note) = level_up_notification(&grant) {
                info!(
                    "[levelup:mastery] {} reached {} with {}",
                    user_id,
                    grant.new_level.as_str(),
                    grant.tool_id
                );
                next.notifications.push(note);
            }
        }

        if let Some(challenge_id) = effect.challenge_id {
            next.changes.challenges.push(ChallengeCompletion {
                user_id: user_id.clone(),
                challenge_id,
                completed_at: event.timestamp.unwrap_or(now),
            });
        }

        if let Some(StreakChange::Extended(count)) = effect.streak {
            next.notifications.push(GamificationEvent::StreakExtended { count });
        }
        let after = next.metrics.total_points();
        push_tier_upgrade(&mut next.notifications, before, after);

        *staged = next;
        Ok(folded)
    }

    /// Stage every achievement that is unlocked now but was not before,
    /// with its rarity-scaled points.
    ///
    /// Repeats until nothing new unlocks, since unlocks can feed the
    /// unlocked-achievements requirement.
    fn stage_achievements(&self, staged: &mut Staged, now: DateTime<Utc>) -> Result<()> {
        let mut fresh_ids = Vec::new();
        loop {
            let results = evaluate(&self.catalog, &staged.metrics, &staged.unlocked);
            let fresh: Vec<String> = newly_unlocked(&results, &staged.unlocked)
                .into_iter()
                .map(|r| r.id.clone())
                .collect();
            if fresh.is_empty() {
                break;
            }
            staged.unlocked.extend(fresh.iter().cloned());
            fresh_ids.extend(fresh);
        }

        for id in fresh_ids {
            let reward = self
                .catalog
                .get(&id)
                .map(|def| def.reward_points())
                .filter(|amount| *amount > 0)
                .map(|amount| TransactionDraft::bonus(amount, id.clone()));
            if let Some(draft) = &reward {
                staged.ledger.append(draft, now)?;
            }
            staged.changes.unlocks.push(StagedUnlock {
                unlock: AchievementUnlock {
                    user_id: staged.metrics.user_id.clone(),
                    achievement_id: id,
                    unlocked_at: now,
                },
                reward,
            });
        }
        Ok(())
    }

    /// Write everything `staged` holds in one store commit
    fn commit(&self, staged: Staged, now: DateTime<Utc>) -> Result<Committed> {
        let Staged {
            metrics,
            tools,
            touched_tools,
            mut changes,
            notifications: staged_notes,
            ..
        } = staged;
        changes.metrics = Some(metrics.clone());
        changes.tools = touched_tools
            .iter()
            .filter_map(|id| tools.get(id).cloned())
            .collect();

        let receipt = self.store.commit(&changes, now)?;

        let mut notifications: Vec<GamificationEvent> = receipt
            .receipts
            .iter()
            .map(|r| GamificationEvent::PointsAwarded {
                amount: r.transaction.amount,
                reason: r.transaction.reason.clone(),
                balance_after: r.balance_after,
            })
            .collect();
        notifications.extend(staged_notes);

        let mut achievement_points = 0u64;
        for unlock in &receipt.unlocked {
            let Some(def) = self.catalog.get(&unlock.achievement_id) else {
                continue;
            };
            info!(
                "[levelup:achievements] {} unlocked {} ({})",
                metrics.user_id,
                def.id,
                def.rarity.as_str()
            );
            achievement_points = achievement_points.saturating_add(def.reward_points());
        }
        notifications.extend(unlock_notifications(&self.catalog, &receipt.unlocked));

        Ok(Committed {
            metrics,
            achievement_points,
            new_achievements: receipt
                .unlocked
                .into_iter()
                .map(|u| u.achievement_id)
                .collect(),
            notifications,
        })
    }
}

fn push_tier_upgrade(notifications: &mut Vec<GamificationEvent>, before: u64, after: u64) {
    let change = tier_upgrade(before, after);
    if change.upgraded {
        notifications.push(GamificationEvent::TierUpgraded {
            previous_tier: change.previous_tier,
            new_tier: change.new_tier,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use serde_json::json;

    fn service() -> GamificationService {
        GamificationService::with_builtin_catalog(Arc::new(MemoryStore::new()))
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_validate_user_id() {
        assert!(validate_user_id("user_42@example.com").is_ok());
        assert!(validate_user_id("").is_err());
        assert!(validate_user_id("a b").is_err());
        assert!(validate_user_id("../etc").is_err());
        assert!(validate_user_id(&"x".repeat(MAX_USER_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_first_message_pays_and_unlocks() {
        let svc = service();
        let event = MetricsEvent::new("message-sent", json!({"agentId": "einstein"}));
        let outcome = svc.process_event_at("u1", &event, at(3, 10)).unwrap();

        assert!(outcome.event_processed);
        assert_eq!(outcome.points_awarded, 10);
        assert!(outcome.new_achievements.contains(&"first-agent".to_string()));
        let first_agent = svc.catalog().get("first-agent").unwrap().reward_points();
        assert!(outcome.bonus_points >= first_agent);
        assert_eq!(
            outcome.gamification.balance,
            (outcome.points_awarded + outcome.bonus_points) as i64
        );
        assert_eq!(outcome.gamification.tools.len(), 1);
        assert_eq!(outcome.gamification.tools[0].total_xp, 10);
    }

    #[test]
    fn test_unknown_event_is_a_no_op() {
        let svc = service();
        let outcome = svc
            .process_event_at("u1", &MetricsEvent::new("confetti", json!({})), at(3, 10))
            .unwrap();
        assert!(!outcome.event_processed);
        assert_eq!(outcome.points_awarded, 0);
        assert_eq!(outcome.gamification.balance, 0);
        assert_eq!(outcome.gamification.metrics.total_messages, 0);
    }

    #[test]
    fn test_malformed_event_changes_nothing() {
        let svc = service();
        let bad = MetricsEvent::new("streak-update", json!({"streak": "lots"}));
        let err = svc.process_event_at("u1", &bad, at(3, 10)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_eq!(svc.store().balance("u1").unwrap(), 0);
    }

    #[test]
    fn test_first_login_pays_once() {
        let svc = service();
        let login = MetricsEvent::new("first-login", json!({}));
        let first = svc.process_event_at("u1", &login, at(3, 10)).unwrap();
        let second = svc.process_event_at("u1", &login, at(4, 10)).unwrap();
        assert_eq!(first.points_awarded, 25);
        assert_eq!(second.points_awarded, 0);
        assert!(second.event_processed);
    }

    #[test]
    fn test_achievements_are_paid_once() {
        let svc = service();
        let event = MetricsEvent::new("message-sent", json!({}));
        let first = svc.process_event_at("u1", &event, at(3, 10)).unwrap();
        let second = svc.process_event_at("u1", &event, at(3, 11)).unwrap();
        assert!(!first.new_achievements.is_empty());
        assert!(second
            .new_achievements
            .iter()
            .all(|id| !first.new_achievements.contains(id)));
        assert_eq!(
            svc.store().unlocks("u1").unwrap().len(),
            first.new_achievements.len() + second.new_achievements.len()
        );
    }

    #[test]
    fn test_bulk_sync_counts() {
        let svc = service();
        let request: BulkSyncRequest = serde_json::from_value(json!({
            "metrics": {"currentStreak": 3},
            "events": [
                {"type": "message-sent", "data": {"agentId": "einstein"}},
                {"type": "warp-drive", "data": {}},
                {"type": "streak-update", "data": {}},
                {"type": "challenge-completed", "data": {"points": 40}}
            ]
        }))
        .unwrap();
        let outcome = svc.bulk_sync_at("u1", &request, at(3, 10)).unwrap();

        assert!(outcome.metrics_applied);
        assert_eq!(outcome.events_received, 4);
        assert_eq!(outcome.events_processed, 2);
        assert_eq!(outcome.events_ignored, 1);
        assert_eq!(outcome.events_rejected, 1);
        assert_eq!(outcome.points_awarded, 50);
        assert_eq!(outcome.gamification.metrics.completed_challenges_count, 1);
        assert_eq!(svc.store().challenges("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_rankings_and_snapshot_deltas() {
        let svc = service();
        let msg = MetricsEvent::new("message-sent", json!({}));
        for _ in 0..3 {
            svc.process_event_at("alice", &msg, at(3, 10)).unwrap();
        }
        svc.process_event_at("bob", &msg, at(3, 10)).unwrap();

        let before = svc.rankings(LeaderboardCategory::TotalPoints).unwrap();
        assert_eq!(before[0].user_id, "alice");
        assert!(before.iter().all(|r| r.rank_delta == 0));
        svc.record_snapshot_at(LeaderboardCategory::TotalPoints, at(3, 12))
            .unwrap();

        for _ in 0..5 {
            svc.process_event_at("bob", &msg, at(3, 13)).unwrap();
        }
        let after = svc.rankings(LeaderboardCategory::TotalPoints).unwrap();
        assert_eq!(after[0].user_id, "bob");
        assert_eq!(after[0].rank_delta, 1);
        assert_eq!(after[1].rank_delta, -1);
    }

    fn assert_untouched(svc: &GamificationService, user_id: &str, rows: usize, balance: i64) {
        let store = svc.store();
        assert_eq!(store.transactions(user_id).unwrap().len(), rows);
        assert_eq!(store.balance(user_id).unwrap(), balance);
        assert_eq!(store.metrics(user_id).unwrap(), None);
        assert!(store.tool_masteries(user_id).unwrap().is_empty());
        assert!(store.unlocks(user_id).unwrap().is_empty());
        assert!(store.challenges(user_id).unwrap().is_empty());
    }

    #[test]
    fn test_oversized_conversation_is_rejected_before_any_write() {
        let svc = service();
        let event = MetricsEvent::new(
            "message-sent",
            json!({"agentId": "einstein", "conversationLength": 2_305_843_009_213_693_957u64}),
        );
        let err = svc.process_event_at("u1", &event, at(3, 10)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_untouched(&svc, "u1", 0, 0);
    }

    #[test]
    fn test_late_failure_rolls_back_earlier_effects() {
        let svc = service();
        let seed = i64::MAX as u64 - 10;
        svc.append_transaction_at("u1", &TransactionDraft::earn(seed, "import"), at(3, 9))
            .unwrap();

        // the 10-point earn still fits, the first-agent reward does not
        let event = MetricsEvent::new("message-sent", json!({"agentId": "einstein"}));
        let err = svc.process_event_at("u1", &event, at(3, 10)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_untouched(&svc, "u1", 1, seed as i64);

        let request = BulkSyncRequest {
            metrics: None,
            events: vec![event],
        };
        assert!(svc.bulk_sync_at("u1", &request, at(3, 11)).is_err());
        assert_untouched(&svc, "u1", 1, seed as i64);

        let err = svc
            .append_transaction_at("u1", &TransactionDraft::earn(11, "top-up"), at(3, 12))
            .unwrap_err();
        assert_eq!(err.code(), "validation_error");
        assert_untouched(&svc, "u1", 1, seed as i64);
    }

    #[test]
    fn test_rejected_bulk_events_leave_no_trace() {
        let svc = service();
        let request: BulkSyncRequest = serde_json::from_value(json!({
            "events": [
                {"type": "message-sent", "data": {"agentId": "einstein"}},
                {"type": "message-sent", "data": {"agentId": "poet", "conversationLength": 2_305_843_009_213_693_957u64}},
                {"type": "challenge-completed", "data": {"challengeId": "daily", "points": crate::metrics::MAX_COUNTER + 1}}
            ]
        }))
        .unwrap();
        let outcome = svc.bulk_sync_at("u1", &request, at(3, 10)).unwrap();

        assert_eq!(outcome.events_processed, 1);
        assert_eq!(outcome.events_rejected, 2);
        let profile = &outcome.gamification;
        assert_eq!(profile.metrics.total_messages, 1);
        assert_eq!(profile.metrics.completed_challenges_count, 0);
        assert_eq!(profile.tools.len(), 1);
        assert_eq!(profile.tools[0].tool_id, "einstein");
        assert!(svc.store().challenges("u1").unwrap().is_empty());
        assert_eq!(
            profile.balance,
            (outcome.points_awarded + outcome.bonus_points) as i64
        );
    }

    #[test]
    fn test_oversized_patch_is_rejected_and_bounded_patch_is_safe() {
        let svc = service();
        let patch: MetricsPatch =
            serde_json::from_value(json!({"totalMessages": u64::MAX})).unwrap();
        let err = svc.patch_metrics_at("u1", &patch, at(3, 10)).unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert_untouched(&svc, "u1", 0, 0);

        let max = crate::metrics::MAX_COUNTER;
        let patch: MetricsPatch = serde_json::from_value(json!({
            "totalMessages": max,
            "perfectResponseCount": max,
            "highScoreCount": max,
            "completedChallengesCount": max,
            "currentStreak": max
        }))
        .unwrap();
        let outcome = svc.patch_metrics_at("u1", &patch, at(3, 10)).unwrap();
        assert_eq!(outcome.gamification.metrics.total_points(), max * 185);
        assert_eq!(
            outcome.gamification.balance,
            outcome.bonus_points as i64
        );
        let board = svc.rankings(LeaderboardCategory::StreakDays).unwrap();
        assert_eq!(board[0].user_id, "u1");
    }

    #[test]
    fn test_idle_user_locks_are_dropped() {
        let svc = service();
        for i in 0..50 {
            svc.profile_at(&format!("user{}", i), at(3, 10)).unwrap();
        }
        assert_eq!(svc.locks.len(), 1);
    }

    #[test]
    fn test_manual_spend_respects_balance() {
        let svc = service();
        svc.append_transaction_at("u1", &TransactionDraft::earn(500, "grant"), at(3, 9))
            .unwrap();
        let err = svc
            .append_transaction_at("u1", &TransactionDraft::spend(600, "shop"), at(3, 10))
            .unwrap_err();
        assert_eq!(err.status_code(), 409);
        assert_eq!(svc.store().balance("u1").unwrap(), 500);
    }
}
