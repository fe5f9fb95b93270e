//! Work-item snapshot model.
//!
//! A [`WorkItem`] is an immutable per-evaluation snapshot of a tracked unit
//! of work (an issue-tracker task or a code-review request). It is assembled
//! by an external API client before each evaluation; the core never mutates
//! or refreshes it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a work item.
pub type ItemId = String;

/// Unique identifier for a user.
pub type UserId = String;

/// Kind of tracked work item.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Issue-tracker task.
    Task,
    /// Code-review request (pull request).
    ReviewRequest,
}

/// Work-item priority.
///
/// Ordered so that `Urgent > High > Medium > Low` compares naturally.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

impl Priority {
    /// Parse a priority from the loose strings external trackers emit.
    pub fn parse(s: &str) -> Option<Priority> {
        match s.to_ascii_lowercase().as_str() {
            "urgent" | "highest" | "p0" => Some(Priority::Urgent),
            "high" | "p1" => Some(Priority::High),
            "medium" | "normal" | "p2" => Some(Priority::Medium),
            "low" | "lowest" | "p3" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// Work-item status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Open,
    InProgress,
    Blocked,
    Resolved,
}

impl Default for ItemStatus {
    fn default() -> Self {
        ItemStatus::Open
    }
}

/// Continuous-integration state for review requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CiState {
    Passing,
    Failing,
    Unknown,
}

impl Default for CiState {
    fn default() -> Self {
        CiState::Unknown
    }
}

/// Labels that mark an item as urgent regardless of its priority field.
pub const URGENT_LABELS: &[&str] = &["urgent", "critical", "blocker", "hotfix", "p0", "p1"];

/// Immutable snapshot of a work item at evaluation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier (issue key or review-request number)
    pub id: ItemId,
    /// Kind of work item
    pub kind: ItemKind,
    /// Short human-readable title
    pub title: String,
    /// Priority as reported by the tracker
    pub priority: Priority,
    /// Due date, if the tracker has one
    pub due_at: Option<DateTime<Utc>>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Size metric: lines changed for reviews, story points for tasks
    pub size: u32,
    /// Label set
    pub labels: Vec<String>,
    /// Status
    pub status: ItemStatus,
    /// CI state (reviews; `Unknown` for plain tasks)
    pub ci: CiState,
    /// Number of approvals received
    pub approvals: u32,
    /// Whether the item is blocked on something else
    pub blocked: bool,
    /// Whether the review request is mergeable
    pub mergeable: bool,
    /// Owning user
    pub owner: UserId,
    /// Touched file paths (ownership signal for delegation)
    pub paths: Vec<String>,
    /// Component the item belongs to (ownership signal for delegation)
    pub component: Option<String>,
}

impl WorkItem {
    /// Age of the item in fractional days at `now`.
    pub fn age_days(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 86_400.0
    }

    /// Whether the item is past its due date at `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_at.is_some_and(|due| due < now)
    }

    /// Whether the item is due within the next `hours` hours (and not overdue).
    pub fn due_within_hours(&self, now: DateTime<Utc>, hours: i64) -> bool {
        self.due_at
            .is_some_and(|due| due >= now && due <= now + chrono::Duration::hours(hours))
    }

    /// Whether any label marks the item as urgent (see [`URGENT_LABELS`]).
    pub fn has_urgent_label(&self) -> bool {
        self.labels
            .iter()
            .any(|l| URGENT_LABELS.iter().any(|u| l.eq_ignore_ascii_case(u)))
    }

    /// Whether any label matches `name` case-insensitively.
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|l| l.eq_ignore_ascii_case(name))
    }

    /// The urgent/blocker subset of the item's labels, lowercased and sorted.
    ///
    /// Used by the mismatch detector to decide whether a label change is
    /// material rather than cosmetic.
    pub fn urgent_label_set(&self) -> Vec<String> {
        let mut set: Vec<String> = self
            .labels
            .iter()
            .filter(|l| URGENT_LABELS.iter().any(|u| l.eq_ignore_ascii_case(u)))
            .map(|l| l.to_ascii_lowercase())
            .collect();
        set.sort();
        set.dedup();
        set
    }
}

/// The urgent/blocker subset of an arbitrary label list, lowercased and sorted.
pub fn urgent_label_subset(labels: &[String]) -> Vec<String> {
    let mut set: Vec<String> = labels
        .iter()
        .filter(|l| URGENT_LABELS.iter().any(|u| l.eq_ignore_ascii_case(u)))
        .map(|l| l.to_ascii_lowercase())
        .collect();
    set.sort();
    set.dedup();
    set
}
