//! Scheduled triggers: the re-evaluation backbone.
//!
//! A [`ScheduledTrigger`] is a point in time at which a work item gets
//! re-evaluated for its owning user. Triggers are created by the scheduling
//! API or by the webhook normalizer, consulted and fired by the scheduler's
//! tick, and cancelled when the underlying item is resolved early.
//!
//! Invariant: at most one Pending trigger exists per (work item, user) pair.
//! Creating a second one upserts the existing trigger instead.

pub mod detector;
pub mod scheduler;
pub mod store;
pub mod webhook;

pub use detector::{detect, MismatchReason, Severity};
pub use scheduler::{Clock, ManualClock, SystemClock, TickSummary, TriggerScheduler};
pub use store::{MemoryTriggerStore, SqliteTriggerStore, TriggerStore};
pub use webhook::{apply_event, normalize, ApplyOutcome, ChangeEvent, ChangeKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::item::{ItemId, Priority, UserId};

/// Unique identifier for a scheduled trigger.
pub type TriggerId = String;

/// Trigger lifecycle state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TriggerState {
    /// Waiting for its scheduled time
    Pending,
    /// Evaluated exactly once; terminal
    Fired,
    /// Explicitly cancelled before firing; terminal
    Cancelled,
}

impl TriggerState {
    /// Whether the state admits no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TriggerState::Fired | TriggerState::Cancelled)
    }
}

/// Plan-time snapshot of the attributes the mismatch detector watches.
///
/// Absent when the trigger was scheduled without item data (plain
/// scheduling-API calls); the detector then skips its item-diff checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSnapshot {
    /// Priority at plan time
    pub priority: Priority,
    /// Urgent/blocker label subset at plan time, lowercased and sorted
    pub urgent_labels: Vec<String>,
    /// Due date at plan time
    pub due_at: Option<DateTime<Utc>>,
}

/// A scheduled re-evaluation of one work item for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTrigger {
    pub id: TriggerId,
    /// The work item to re-evaluate
    pub item_ref: ItemId,
    /// The user on whose behalf the evaluation runs
    pub user: UserId,
    /// When the evaluation is due
    pub scheduled_at: DateTime<Utc>,
    pub state: TriggerState,
    pub created_at: DateTime<Utc>,
    /// Set when the trigger fires
    pub last_evaluated_at: Option<DateTime<Utc>>,
    /// De-duplication key of the last external event applied to this
    /// trigger, namespaced as "source:event_id"
    pub external_event_id: Option<String>,
    /// Plan-time attribute snapshot for mismatch detection
    pub planned: Option<PlanSnapshot>,
}

impl ScheduledTrigger {
    /// Create a new pending trigger.
    pub fn new(
        item_ref: ItemId,
        user: UserId,
        scheduled_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            item_ref,
            user,
            scheduled_at,
            state: TriggerState::Pending,
            created_at: now,
            last_evaluated_at: None,
            external_event_id: None,
            planned: None,
        }
    }

    /// Attach a plan-time snapshot.
    pub fn with_plan(mut self, planned: PlanSnapshot) -> Self {
        self.planned = Some(planned);
        self
    }
}
