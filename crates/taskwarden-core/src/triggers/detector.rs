//! Context mismatch detection.
//!
//! Before a due trigger is acted on, the detector compares the plan against
//! current reality. Checks run in a fixed order and the first applicable
//! reason wins:
//!
//! 1. calendar conflict overlapping the scheduled window -> `Busy`
//! 2. scheduled time past the grace period and not yet fired -> `Overdue`
//! 3. material priority/label change since planning -> `PriorityChanged`
//! 4. due date moved since planning -> `DueDateChanged`
//!
//! When live context cannot be obtained at all, the detector reports
//! `UnknownContext` and the pipeline proceeds conservatively (a safe
//! Notify/Reschedule outcome) instead of silently doing nothing.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::context::LiveContext;
use crate::item::urgent_label_subset;
use crate::triggers::ScheduledTrigger;

/// Why a planned trigger no longer matches reality.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum MismatchReason {
    /// The owning user has a calendar conflict in the scheduled window
    Busy,
    /// The trigger sat unfired past the grace period
    Overdue,
    /// The item's priority or urgent labels changed materially
    PriorityChanged,
    /// The item's due date moved
    DueDateChanged,
    /// Live context could not be obtained; assumed mismatched
    UnknownContext,
}

/// How urgently a mismatch should be surfaced.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

impl MismatchReason {
    /// Stable string form, used in logs and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            MismatchReason::Busy => "busy",
            MismatchReason::Overdue => "overdue",
            MismatchReason::PriorityChanged => "priority-changed",
            MismatchReason::DueDateChanged => "due-date-changed",
            MismatchReason::UnknownContext => "unknown-context",
        }
    }

    /// Surfacing severity for the notifier.
    pub fn severity(&self) -> Severity {
        match self {
            MismatchReason::Busy | MismatchReason::Overdue => Severity::High,
            MismatchReason::PriorityChanged | MismatchReason::DueDateChanged => Severity::Medium,
            MismatchReason::UnknownContext => Severity::Low,
        }
    }
}

impl std::fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Detect whether the plan behind `trigger` still holds.
///
/// `context` is `None` when the fetch failed or timed out. The item-diff
/// checks only run when both a plan snapshot and a live item snapshot are
/// present.
pub fn detect(
    trigger: &ScheduledTrigger,
    context: Option<&LiveContext>,
    now: DateTime<Utc>,
    grace_minutes: i64,
    conflict_window_minutes: i64,
) -> Option<MismatchReason> {
    let Some(context) = context else {
        return Some(MismatchReason::UnknownContext);
    };

    let half_window = Duration::minutes(conflict_window_minutes);
    if context.has_conflict(trigger.scheduled_at - half_window, trigger.scheduled_at + half_window)
    {
        return Some(MismatchReason::Busy);
    }

    if now - trigger.scheduled_at > Duration::minutes(grace_minutes) {
        return Some(MismatchReason::Overdue);
    }

    if let (Some(planned), Some(item)) = (&trigger.planned, &context.item) {
        if item.priority != planned.priority
            || urgent_label_subset(&item.labels) != planned.urgent_labels
        {
            return Some(MismatchReason::PriorityChanged);
        }
        if item.due_at != planned.due_at {
            return Some(MismatchReason::DueDateChanged);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CalendarEvent;
    use crate::item::{CiState, ItemKind, ItemStatus, Priority, WorkItem};
    use crate::triggers::{PlanSnapshot, ScheduledTrigger};

    const GRACE: i64 = 60;
    const WINDOW: i64 = 30;

    fn make_item(priority: Priority, labels: Vec<&str>) -> WorkItem {
        WorkItem {
            id: "pr-1".to_string(),
            kind: ItemKind::ReviewRequest,
            title: "Item".to_string(),
            priority,
            due_at: None,
            created_at: Utc::now(),
            size: 10,
            labels: labels.into_iter().map(String::from).collect(),
            status: ItemStatus::Open,
            ci: CiState::Unknown,
            approvals: 0,
            blocked: false,
            mergeable: false,
            owner: "alice".to_string(),
            paths: vec![],
            component: None,
        }
    }

    fn make_trigger(scheduled_at: DateTime<Utc>) -> ScheduledTrigger {
        ScheduledTrigger::new(
            "pr-1".to_string(),
            "alice".to_string(),
            scheduled_at,
            scheduled_at - Duration::hours(1),
        )
    }

    fn plan(priority: Priority, urgent_labels: Vec<&str>) -> PlanSnapshot {
        PlanSnapshot {
            priority,
            urgent_labels: urgent_labels.into_iter().map(String::from).collect(),
            due_at: None,
        }
    }

    #[test]
    fn test_no_context_is_unknown() {
        let now = Utc::now();
        let trigger = make_trigger(now);
        assert_eq!(
            detect(&trigger, None, now, GRACE, WINDOW),
            Some(MismatchReason::UnknownContext)
        );
    }

    #[test]
    fn test_calendar_conflict_is_busy() {
        let now = Utc::now();
        let trigger = make_trigger(now);
        let context = LiveContext {
            calendar: vec![CalendarEvent::new(
                "ev".to_string(),
                "Design review".to_string(),
                now - Duration::minutes(10),
                now + Duration::minutes(20),
            )],
            ..Default::default()
        };
        assert_eq!(
            detect(&trigger, Some(&context), now, GRACE, WINDOW),
            Some(MismatchReason::Busy)
        );
    }

    #[test]
    fn test_past_grace_is_overdue() {
        let now = Utc::now();
        let trigger = make_trigger(now - Duration::minutes(90));
        let context = LiveContext::default();
        assert_eq!(
            detect(&trigger, Some(&context), now, GRACE, WINDOW),
            Some(MismatchReason::Overdue)
        );

        // inside grace: fine
        let trigger = make_trigger(now - Duration::minutes(30));
        assert_eq!(detect(&trigger, Some(&context), now, GRACE, WINDOW), None);
    }

    #[test]
    fn test_busy_wins_over_overdue() {
        let now = Utc::now();
        let scheduled = now - Duration::minutes(90);
        let trigger = make_trigger(scheduled);
        let context = LiveContext {
            calendar: vec![CalendarEvent::new(
                "ev".to_string(),
                "Offsite".to_string(),
                scheduled - Duration::minutes(5),
                scheduled + Duration::minutes(25),
            )],
            ..Default::default()
        };
        assert_eq!(
            detect(&trigger, Some(&context), now, GRACE, WINDOW),
            Some(MismatchReason::Busy)
        );
    }

    #[test]
    fn test_material_priority_change() {
        let now = Utc::now();
        let trigger = make_trigger(now).with_plan(plan(Priority::Medium, vec![]));
        let context = LiveContext {
            item: Some(make_item(Priority::Urgent, vec![])),
            ..Default::default()
        };
        assert_eq!(
            detect(&trigger, Some(&context), now, GRACE, WINDOW),
            Some(MismatchReason::PriorityChanged)
        );
    }

    #[test]
    fn test_urgent_label_added_is_material() {
        let now = Utc::now();
        let trigger = make_trigger(now).with_plan(plan(Priority::Medium, vec![]));
        let context = LiveContext {
            item: Some(make_item(Priority::Medium, vec!["blocker", "docs"])),
            ..Default::default()
        };
        assert_eq!(
            detect(&trigger, Some(&context), now, GRACE, WINDOW),
            Some(MismatchReason::PriorityChanged)
        );
    }

    #[test]
    fn test_cosmetic_label_churn_is_not_material() {
        let now = Utc::now();
        let trigger = make_trigger(now).with_plan(plan(Priority::Medium, vec![]));
        let context = LiveContext {
            item: Some(make_item(Priority::Medium, vec!["docs", "ci-skip"])),
            ..Default::default()
        };
        assert_eq!(detect(&trigger, Some(&context), now, GRACE, WINDOW), None);
    }

    #[test]
    fn test_due_date_moved() {
        let now = Utc::now();
        let mut snapshot = plan(Priority::Medium, vec![]);
        snapshot.due_at = Some(now + Duration::days(2));
        let trigger = make_trigger(now).with_plan(snapshot);

        let mut item = make_item(Priority::Medium, vec![]);
        item.due_at = Some(now + Duration::days(1));
        let context = LiveContext {
            item: Some(item),
            ..Default::default()
        };
        assert_eq!(
            detect(&trigger, Some(&context), now, GRACE, WINDOW),
            Some(MismatchReason::DueDateChanged)
        );
    }

    #[test]
    fn test_no_plan_snapshot_skips_item_diffs() {
        let now = Utc::now();
        let trigger = make_trigger(now);
        let context = LiveContext {
            item: Some(make_item(Priority::Urgent, vec!["blocker"])),
            ..Default::default()
        };
        assert_eq!(detect(&trigger, Some(&context), now, GRACE, WINDOW), None);
    }

    #[test]
    fn test_severities() {
        assert_eq!(MismatchReason::Busy.severity(), Severity::High);
        assert_eq!(MismatchReason::Overdue.severity(), Severity::High);
        assert_eq!(MismatchReason::PriorityChanged.severity(), Severity::Medium);
        assert_eq!(MismatchReason::DueDateChanged.severity(), Severity::Medium);
        assert_eq!(MismatchReason::UnknownContext.severity(), Severity::Low);
    }
}
