//! Trigger scheduler: the tick loop's brain.
//!
//! `tick(now)` claims every due pending trigger and runs it through the
//! detector -> scoring -> decision -> notifier pipeline. Claiming is a
//! guarded state transition (pending -> fired), which makes firing
//! at-most-once even when a tick races a webhook update or a second tick.
//! Store hiccups are retried with exponential backoff; a trigger whose
//! transition never succeeds stays pending and is retried on the next tick
//! rather than silently dropped.
//!
//! The clock is injected so ticks can be simulated deterministically in
//! tests instead of waiting on wall time.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use rand::Rng;

use crate::config::Config;
use crate::context::ContextProvider;
use crate::decision::{Action, Decision, DecisionEngine, DecisionInput, FactorSnapshot};
use crate::delegation::Roster;
use crate::error::StoreError;
use crate::item::{ItemId, ItemKind, ItemStatus, UserId};
use crate::notifier::{DecisionNotice, Notifier};
use crate::scoring::{ScoreBreakdown, ScoringEngine};
use crate::triggers::{
    detector, ScheduledTrigger, TriggerId, TriggerState, TriggerStore,
};

/// Injectable time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().expect("clock lock") = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("clock lock");
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().expect("clock lock")
    }
}

/// Outcome counts for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Triggers that were due at tick time
    pub due: usize,
    /// Triggers claimed and evaluated
    pub fired: usize,
    /// Triggers another writer claimed first
    pub skipped: usize,
    /// Triggers whose state transition kept failing; still pending
    pub failed: usize,
}

/// Owns the pending trigger set and drives evaluations.
pub struct TriggerScheduler<S, C, N, R>
where
    S: TriggerStore,
    C: ContextProvider,
    N: Notifier,
    R: Roster,
{
    store: S,
    context: C,
    notifier: N,
    scoring: ScoringEngine,
    engine: DecisionEngine<R>,
    clock: Arc<dyn Clock>,
    settings: crate::config::SchedulerSettings,
    opted_in_owners: Vec<String>,
}

impl<S, C, N, R> TriggerScheduler<S, C, N, R>
where
    S: TriggerStore,
    C: ContextProvider,
    N: Notifier,
    R: Roster,
{
    pub fn new(
        config: &Config,
        store: S,
        context: C,
        notifier: N,
        roster: R,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            context,
            notifier,
            scoring: ScoringEngine::with_weights(config.scoring.clone()),
            engine: DecisionEngine::new(
                config.rules.clone(),
                config.guardrails.clone(),
                roster,
            ),
            clock,
            settings: config.scheduler.clone(),
            opted_in_owners: config.guardrails.opted_in_owners.clone(),
        }
    }

    /// The underlying store, for listings.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The scheduler's current time, from the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Configured tick interval.
    pub fn tick_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.settings.tick_interval_minutes * 60)
    }

    /// Schedule (upsert) a re-evaluation of `item_ref` for `user` at `at`.
    pub fn schedule(
        &self,
        item_ref: ItemId,
        at: DateTime<Utc>,
        user: UserId,
    ) -> Result<TriggerId, StoreError> {
        let trigger = ScheduledTrigger::new(item_ref, user, at, self.clock.now());
        let stored = self.store.upsert(trigger)?;
        tracing::info!(
            trigger = %stored.id,
            item = %stored.item_ref,
            user = %stored.user,
            at = %stored.scheduled_at,
            "trigger scheduled"
        );
        Ok(stored.id)
    }

    /// Cancel a pending trigger. No-op (returns false) when the trigger has
    /// already fired or been cancelled.
    pub fn cancel(&self, id: &str) -> Result<bool, StoreError> {
        let cancelled = self.store.transition(
            id,
            TriggerState::Pending,
            TriggerState::Cancelled,
            self.clock.now(),
        )?;
        if cancelled {
            tracing::info!(trigger = %id, "trigger cancelled");
        }
        Ok(cancelled)
    }

    /// Run one tick at the clock's current time.
    pub fn tick(&self) -> Result<TickSummary, StoreError> {
        self.tick_at(self.clock.now())
    }

    /// Run one tick at an explicit time.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Result<TickSummary, StoreError> {
        let due = self.store.due(now)?;
        let mut summary = TickSummary {
            due: due.len(),
            ..Default::default()
        };

        for trigger in due {
            // Claim before evaluating: once fired, re-entrant ticks and
            // racing webhook writers see a terminal state and back off.
            match self.claim(&trigger.id, now) {
                ClaimResult::Claimed => {
                    self.evaluate(&trigger, now);
                    summary.fired += 1;
                }
                ClaimResult::Lost => summary.skipped += 1,
                ClaimResult::StoreDown => summary.failed += 1,
            }
        }

        tracing::debug!(
            due = summary.due,
            fired = summary.fired,
            skipped = summary.skipped,
            failed = summary.failed,
            "tick complete"
        );
        Ok(summary)
    }

    /// Guarded pending -> fired transition with bounded backoff.
    fn claim(&self, id: &str, now: DateTime<Utc>) -> ClaimResult {
        let mut attempt = 0;
        loop {
            match self
                .store
                .transition(id, TriggerState::Pending, TriggerState::Fired, now)
            {
                Ok(true) => return ClaimResult::Claimed,
                Ok(false) => return ClaimResult::Lost,
                Err(StoreError::UnknownTrigger(_)) => return ClaimResult::Lost,
                Err(e) => {
                    attempt += 1;
                    if attempt >= self.settings.store_retry_max {
                        tracing::error!(trigger = %id, error = %e, "giving up on state transition; trigger stays pending");
                        return ClaimResult::StoreDown;
                    }
                    let base = self.settings.store_retry_base_ms << (attempt - 1);
                    let jitter = rand::thread_rng().gen_range(0..=base / 2);
                    tracing::warn!(trigger = %id, error = %e, attempt, "state transition failed, retrying");
                    std::thread::sleep(std::time::Duration::from_millis(base + jitter));
                }
            }
        }
    }

    /// Detector -> scoring -> decision -> notifier for one claimed trigger.
    fn evaluate(&self, trigger: &ScheduledTrigger, now: DateTime<Utc>) {
        let half_window = Duration::minutes(self.settings.conflict_window_minutes);
        let context = match self.context.fetch(
            &trigger.item_ref,
            &trigger.user,
            trigger.scheduled_at - half_window,
            trigger.scheduled_at + half_window,
        ) {
            Ok(context) => Some(context),
            Err(e) => {
                tracing::warn!(trigger = %trigger.id, error = %e, "context fetch failed, proceeding as unknown");
                None
            }
        };

        let mismatch = detector::detect(
            trigger,
            context.as_ref(),
            now,
            self.settings.overdue_grace_minutes,
            self.settings.conflict_window_minutes,
        );

        let live_item = context.as_ref().and_then(|c| c.item.clone());
        let (decision, delegation) = match (&context, &live_item) {
            (Some(ctx), Some(item)) => {
                let scores = self.scoring.score(item, now);
                let input = DecisionInput {
                    item,
                    scores: &scores,
                    user_available: ctx.user_available.unwrap_or(false),
                    availability_known: ctx.user_available.is_some(),
                    automation_opted_in: self.opted_in_owners.contains(&item.owner),
                    next_free_window: ctx.next_free_window,
                    now,
                };
                let outcome = self.engine.decide(&input);
                (outcome.decision, outcome.delegation)
            }
            _ => (self.unknown_item_decision(trigger), None),
        };

        if let Some(record) = delegation {
            if let Err(e) = self.store.append_delegation(&record) {
                tracing::error!(trigger = %trigger.id, error = %e, "failed to append delegation record");
            }
        }

        let reschedule_to = decision.rescheduled_for;
        let notice = DecisionNotice {
            trigger_id: trigger.id.clone(),
            item_ref: trigger.item_ref.clone(),
            user: trigger.user.clone(),
            decision,
            mismatch,
            decided_at: now,
        };
        if let Err(e) = self.notifier.deliver(&notice) {
            tracing::error!(trigger = %trigger.id, error = %e, "notification delivery failed");
        }

        if let Some(window) = reschedule_to {
            // The fired trigger is terminal; plan a fresh one in the free
            // window, carrying the original plan snapshot forward.
            let mut replacement = ScheduledTrigger::new(
                trigger.item_ref.clone(),
                trigger.user.clone(),
                window,
                now,
            );
            replacement.planned = trigger.planned.clone();
            match self.store.upsert(replacement) {
                Ok(stored) => {
                    tracing::info!(trigger = %stored.id, at = %window, "rescheduled into next free window");
                }
                Err(e) => {
                    tracing::error!(trigger = %trigger.id, error = %e, "failed to reschedule");
                }
            }
        }
    }

    /// Conservative decision when the live item snapshot is unavailable:
    /// notify, never act.
    fn unknown_item_decision(&self, trigger: &ScheduledTrigger) -> Decision {
        Decision {
            action: Action::Notify,
            criticality: 0.0,
            feasibility: 0.0,
            reasoning: "Live work-item state unavailable. Notify instead of acting.".to_string(),
            matched_rule: "unknown-context".to_string(),
            factors: FactorSnapshot {
                item_id: trigger.item_ref.clone(),
                item_kind: ItemKind::Task,
                priority: trigger
                    .planned
                    .as_ref()
                    .map(|p| p.priority)
                    .unwrap_or_default(),
                status: ItemStatus::Open,
                criticality: 0.0,
                feasibility: 0.0,
                user_available: false,
                availability_known: false,
                automation_opted_in: false,
                breakdown: ScoreBreakdown::default(),
            },
            guardrails: Vec::new(),
            delegate: None,
            rescheduled_for: None,
        }
    }
}

enum ClaimResult {
    Claimed,
    Lost,
    StoreDown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::context::{LiveContext, StaticContextProvider, UnavailableContextProvider};
    use crate::delegation::{ConfigRoster, Teammate};
    use crate::item::{CiState, Priority, WorkItem};
    use crate::notifier::RecordingNotifier;
    use crate::triggers::detector::MismatchReason;
    use crate::triggers::MemoryTriggerStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap()
    }

    fn make_item(cs_profile: Priority, due_soon: bool) -> WorkItem {
        let now = start_time();
        WorkItem {
            id: "pr-1".to_string(),
            kind: ItemKind::ReviewRequest,
            title: "Pipeline fix".to_string(),
            priority: cs_profile,
            due_at: due_soon.then(|| now + Duration::hours(6)),
            created_at: now,
            size: 50,
            labels: vec![],
            status: ItemStatus::Open,
            ci: CiState::Passing,
            approvals: 1,
            blocked: false,
            mergeable: true,
            owner: "alice".to_string(),
            paths: vec![],
            component: Some("pipeline".to_string()),
        }
    }

    fn make_roster() -> ConfigRoster {
        ConfigRoster::from_teammates(vec![Teammate {
            id: "bob".to_string(),
            name: "Bob".to_string(),
            path_prefixes: vec![],
            components: vec!["pipeline".to_string()],
            workload: 20,
            availability: 80,
            tz_offset_minutes: 0,
        }])
    }

    type TestScheduler<C> =
        TriggerScheduler<MemoryTriggerStore, C, RecordingNotifier, ConfigRoster>;

    fn make_scheduler<C: ContextProvider>(
        context: C,
        clock: Arc<ManualClock>,
    ) -> TestScheduler<C> {
        let mut config = Config::default();
        config.scheduler.store_retry_base_ms = 1;
        TriggerScheduler::new(
            &config,
            MemoryTriggerStore::new(),
            context,
            RecordingNotifier::new(),
            make_roster(),
            clock,
        )
    }

    fn context_with_item(item: WorkItem, available: bool) -> StaticContextProvider {
        StaticContextProvider::new(LiveContext {
            item: Some(item),
            calendar: vec![],
            user_available: Some(available),
            next_free_window: None,
        })
    }

    #[test]
    fn test_schedule_upserts_per_pair() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = make_scheduler(
            context_with_item(make_item(Priority::Urgent, false), true),
            clock.clone(),
        );

        let first = scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        let second = scheduler
            .schedule(
                "pr-1".to_string(),
                start_time() + Duration::hours(2),
                "alice".to_string(),
            )
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(scheduler.store().all().unwrap().len(), 1);
    }

    #[test]
    fn test_tick_fires_due_trigger_once() {
        let clock = Arc::new(ManualClock::new(start_time()));
        // urgent + due soon -> CS 65; user available but CS <= 80, afs 100 but
        // not opted in -> Notify. The action is incidental here; the firing
        // discipline is what's under test.
        let scheduler = make_scheduler(
            context_with_item(make_item(Priority::Urgent, true), true),
            clock.clone(),
        );

        let id = scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();

        let summary = scheduler.tick().unwrap();
        assert_eq!(summary.due, 1);
        assert_eq!(summary.fired, 1);
        assert_eq!(scheduler.notifier.sent().len(), 1);

        let stored = scheduler.store().get(&id).unwrap().unwrap();
        assert_eq!(stored.state, TriggerState::Fired);
        assert_eq!(stored.last_evaluated_at, Some(start_time()));

        // re-entrant tick: nothing due, nothing re-fired
        let summary = scheduler.tick().unwrap();
        assert_eq!(summary.due, 0);
        assert_eq!(scheduler.notifier.sent().len(), 1);
    }

    #[test]
    fn test_future_trigger_waits_for_clock() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = make_scheduler(
            context_with_item(make_item(Priority::Urgent, true), true),
            clock.clone(),
        );

        scheduler
            .schedule(
                "pr-1".to_string(),
                start_time() + Duration::minutes(30),
                "alice".to_string(),
            )
            .unwrap();

        assert_eq!(scheduler.tick().unwrap().due, 0);

        clock.advance(Duration::minutes(31));
        let summary = scheduler.tick().unwrap();
        assert_eq!(summary.fired, 1);
    }

    #[test]
    fn test_unavailable_context_notifies_conservatively() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = make_scheduler(UnavailableContextProvider, clock.clone());

        scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        scheduler.tick().unwrap();

        let sent = scheduler.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].decision.action, Action::Notify);
        assert_eq!(sent[0].mismatch, Some(MismatchReason::UnknownContext));
        assert_eq!(sent[0].decision.matched_rule, "unknown-context");
    }

    #[test]
    fn test_delegation_path_appends_audit_record() {
        let clock = Arc::new(ManualClock::new(start_time()));
        // urgent + due soon -> CS 65 > 60, user unavailable -> Delegate to bob
        let scheduler = make_scheduler(
            context_with_item(make_item(Priority::Urgent, true), false),
            clock.clone(),
        );

        scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        scheduler.tick().unwrap();

        let sent = scheduler.notifier.sent();
        assert_eq!(sent[0].decision.action, Action::Delegate);
        assert_eq!(sent[0].decision.delegate.as_deref(), Some("bob"));

        let records = scheduler.store().delegations();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].teammate, "bob");
        assert_eq!(records[0].item_ref, "pr-1");
    }

    #[test]
    fn test_reschedule_plans_replacement_trigger() {
        let clock = Arc::new(ManualClock::new(start_time()));
        // high priority + due soon -> CS 53 in [40, 60], unavailable, with a
        // known free window -> Reschedule
        let window = start_time() + Duration::hours(3);
        let provider = StaticContextProvider::new(LiveContext {
            item: Some(make_item(Priority::High, true)),
            calendar: vec![],
            user_available: Some(false),
            next_free_window: Some(window),
        });
        let scheduler = make_scheduler(provider, clock.clone());

        let id = scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        scheduler.tick().unwrap();

        let sent = scheduler.notifier.sent();
        assert_eq!(sent[0].decision.action, Action::Reschedule);

        let all = scheduler.store().all().unwrap();
        assert_eq!(all.len(), 2);
        let replacement = all.iter().find(|t| t.id != id).unwrap();
        assert_eq!(replacement.state, TriggerState::Pending);
        assert_eq!(replacement.scheduled_at, window);
    }

    #[test]
    fn test_cancel_is_noop_after_firing() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = make_scheduler(
            context_with_item(make_item(Priority::Urgent, true), true),
            clock.clone(),
        );

        let id = scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        scheduler.tick().unwrap();

        assert!(!scheduler.cancel(&id).unwrap());
        assert_eq!(
            scheduler.store().get(&id).unwrap().unwrap().state,
            TriggerState::Fired
        );
    }

    #[test]
    fn test_cancel_pending_trigger() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let scheduler = make_scheduler(
            context_with_item(make_item(Priority::Urgent, true), true),
            clock.clone(),
        );

        let id = scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        assert!(scheduler.cancel(&id).unwrap());

        // cancelled triggers never fire
        let summary = scheduler.tick().unwrap();
        assert_eq!(summary.due, 0);
        assert!(scheduler.notifier.sent().is_empty());
    }

    /// Store wrapper whose transitions fail a set number of times.
    struct FlakyStore {
        inner: MemoryTriggerStore,
        failures_left: AtomicU32,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: MemoryTriggerStore::new(),
                failures_left: AtomicU32::new(failures),
            }
        }
    }

    impl TriggerStore for FlakyStore {
        fn upsert(&self, trigger: ScheduledTrigger) -> Result<ScheduledTrigger, StoreError> {
            self.inner.upsert(trigger)
        }
        fn get(&self, id: &str) -> Result<Option<ScheduledTrigger>, StoreError> {
            self.inner.get(id)
        }
        fn pending_for(
            &self,
            item_ref: &str,
            user: &str,
        ) -> Result<Option<ScheduledTrigger>, StoreError> {
            self.inner.pending_for(item_ref, user)
        }
        fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTrigger>, StoreError> {
            self.inner.due(now)
        }
        fn all(&self) -> Result<Vec<ScheduledTrigger>, StoreError> {
            self.inner.all()
        }
        fn transition(
            &self,
            id: &str,
            from: TriggerState,
            to: TriggerState,
            at: DateTime<Utc>,
        ) -> Result<bool, StoreError> {
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(StoreError::Unavailable("injected failure".into()));
            }
            self.inner.transition(id, from, to, at)
        }
        fn record_event(
            &self,
            key: &str,
            trigger_id: &str,
            at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            self.inner.record_event(key, trigger_id, at)
        }
        fn event_trigger(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.event_trigger(key)
        }
        fn append_delegation(&self, record: &DelegationRecord) -> Result<(), StoreError> {
            self.inner.append_delegation(record)
        }
    }

    use crate::delegation::DelegationRecord;

    #[test]
    fn test_transient_store_failure_is_retried() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let mut config = Config::default();
        config.scheduler.store_retry_base_ms = 1;
        config.scheduler.store_retry_max = 3;

        let scheduler = TriggerScheduler::new(
            &config,
            FlakyStore::new(1),
            context_with_item(make_item(Priority::Urgent, true), true),
            RecordingNotifier::new(),
            make_roster(),
            clock,
        );

        scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        let summary = scheduler.tick().unwrap();
        assert_eq!(summary.fired, 1);
        assert_eq!(summary.failed, 0);
    }

    #[test]
    fn test_persistent_store_failure_leaves_trigger_pending() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let mut config = Config::default();
        config.scheduler.store_retry_base_ms = 1;
        config.scheduler.store_retry_max = 3;

        let scheduler = TriggerScheduler::new(
            &config,
            FlakyStore::new(100),
            context_with_item(make_item(Priority::Urgent, true), true),
            RecordingNotifier::new(),
            make_roster(),
            clock,
        );

        let id = scheduler
            .schedule("pr-1".to_string(), start_time(), "alice".to_string())
            .unwrap();
        let summary = scheduler.tick().unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.fired, 0);
        // no notification, and the trigger survives for the next tick
        assert!(scheduler.notifier.sent().is_empty());
        assert_eq!(
            scheduler.store().get(&id).unwrap().unwrap().state,
            TriggerState::Pending
        );
    }
}
