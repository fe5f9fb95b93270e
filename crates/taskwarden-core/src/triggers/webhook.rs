//! Webhook normalization.
//!
//! Inbound change events from external services are normalized into
//! [`ChangeEvent`]s and applied to the trigger store. Three payload dialects
//! are understood:
//!
//! - the canonical flat shape `{event, event_id, item, user, ...}`
//! - GitHub pull-request payloads (`action` + `pull_request`)
//! - Jira issue payloads (`webhookEvent` + `issue`)
//!
//! Applying an event is idempotent on `(source, event_id)`: replays of an
//! already-processed event leave the store untouched and report the trigger
//! the original delivery produced. Malformed payloads are rejected with a
//! typed error and never create or mutate a trigger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;
use crate::item::{urgent_label_subset, ItemId, Priority, UserId};
use crate::triggers::{PlanSnapshot, ScheduledTrigger, TriggerId, TriggerStore};

/// Kind of external change event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    ItemCreated,
    ItemUpdated,
    ItemAssigned,
    ReviewOpened,
    ReviewSynchronized,
    ReviewLabeled,
}

impl ChangeKind {
    /// Map a source-specific event name onto a kind.
    pub fn parse(source: &str, kind: &str) -> Option<ChangeKind> {
        // canonical names work for every source
        match kind {
            "item_created" => return Some(ChangeKind::ItemCreated),
            "item_updated" => return Some(ChangeKind::ItemUpdated),
            "item_assigned" => return Some(ChangeKind::ItemAssigned),
            "review_opened" => return Some(ChangeKind::ReviewOpened),
            "review_synchronized" => return Some(ChangeKind::ReviewSynchronized),
            "review_labeled" => return Some(ChangeKind::ReviewLabeled),
            _ => {}
        }
        match source {
            "github" => match kind {
                "opened" | "reopened" | "ready_for_review" => Some(ChangeKind::ReviewOpened),
                "synchronize" => Some(ChangeKind::ReviewSynchronized),
                "labeled" | "unlabeled" => Some(ChangeKind::ReviewLabeled),
                _ => None,
            },
            _ => match kind {
                "created" | "jira:issue_created" => Some(ChangeKind::ItemCreated),
                "updated" | "jira:issue_updated" => Some(ChangeKind::ItemUpdated),
                "assigned" | "jira:issue_assigned" => Some(ChangeKind::ItemAssigned),
                _ => None,
            },
        }
    }
}

/// A normalized external change event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub source: String,
    /// External delivery id, the idempotency key within `source`
    pub external_id: String,
    pub kind: ChangeKind,
    pub item_ref: ItemId,
    pub user: UserId,
    /// Changed priority, when the payload carried one
    pub priority: Option<Priority>,
    /// Changed label set, when the payload carried one
    pub labels: Option<Vec<String>>,
    /// Changed due date, when the payload carried one
    pub due_at: Option<DateTime<Utc>>,
}

impl ChangeEvent {
    /// The durable de-duplication key.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.source, self.external_id)
    }
}

/// Result of applying a normalized event to the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "trigger_id")]
pub enum ApplyOutcome {
    /// A new trigger was scheduled
    Created(TriggerId),
    /// An existing pending trigger was re-planned
    Updated(TriggerId),
    /// The event was already processed; nothing changed
    Duplicate(TriggerId),
}

impl ApplyOutcome {
    pub fn trigger_id(&self) -> &str {
        match self {
            ApplyOutcome::Created(id)
            | ApplyOutcome::Updated(id)
            | ApplyOutcome::Duplicate(id) => id,
        }
    }
}

/// Normalize a raw webhook payload from `source`.
pub fn normalize(source: &str, payload: &Value) -> Result<ChangeEvent, ValidationError> {
    if source == "github" {
        if let Some(pr) = payload.get("pull_request") {
            return normalize_github(payload, pr);
        }
    }
    if let Some(issue) = payload.get("issue") {
        if payload.get("webhookEvent").is_some() {
            return normalize_jira(source, payload, issue);
        }
    }
    normalize_canonical(source, payload)
}

/// The canonical flat shape used by first-party integrations.
fn normalize_canonical(source: &str, payload: &Value) -> Result<ChangeEvent, ValidationError> {
    let kind_str = str_field(payload, "event")?;
    let kind = ChangeKind::parse(source, kind_str).ok_or_else(|| {
        ValidationError::UnsupportedEvent {
            event_source: source.to_string(),
            kind: kind_str.to_string(),
        }
    })?;

    Ok(ChangeEvent {
        source: source.to_string(),
        external_id: str_field(payload, "event_id")?.to_string(),
        kind,
        item_ref: str_field(payload, "item")?.to_string(),
        user: str_field(payload, "user")?.to_string(),
        priority: payload
            .get("priority")
            .and_then(Value::as_str)
            .and_then(Priority::parse),
        labels: payload.get("labels").map(string_list),
        due_at: payload
            .get("due_at")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339),
    })
}

/// GitHub pull-request payloads: `action` plus a `pull_request` object.
fn normalize_github(payload: &Value, pr: &Value) -> Result<ChangeEvent, ValidationError> {
    let action = str_field(payload, "action")?;
    let kind =
        ChangeKind::parse("github", action).ok_or_else(|| ValidationError::UnsupportedEvent {
            event_source: "github".to_string(),
            kind: action.to_string(),
        })?;

    let number = pr
        .get("number")
        .and_then(Value::as_u64)
        .ok_or(ValidationError::MissingField("pull_request.number"))?;
    let user = pr
        .get("user")
        .and_then(|u| u.get("login"))
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField("pull_request.user.login"))?;
    let external_id = payload
        .get("event_id")
        .or_else(|| payload.get("delivery"))
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField("event_id"))?;

    // GitHub labels arrive as [{name: ...}]
    let labels = pr.get("labels").map(|raw| {
        raw.as_array()
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|l| l.get("name").and_then(Value::as_str))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    });

    Ok(ChangeEvent {
        source: "github".to_string(),
        external_id: external_id.to_string(),
        kind,
        item_ref: format!("pr-{number}"),
        user: user.to_string(),
        priority: None,
        labels,
        due_at: None,
    })
}

/// Jira issue payloads: `webhookEvent` plus an `issue` object.
fn normalize_jira(
    source: &str,
    payload: &Value,
    issue: &Value,
) -> Result<ChangeEvent, ValidationError> {
    let event = str_field(payload, "webhookEvent")?;
    let kind = ChangeKind::parse(source, event).ok_or_else(|| {
        ValidationError::UnsupportedEvent {
            event_source: source.to_string(),
            kind: event.to_string(),
        }
    })?;

    let key = issue
        .get("key")
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField("issue.key"))?;
    let external_id = payload
        .get("event_id")
        .or_else(|| payload.get("timestamp"))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .ok_or(ValidationError::MissingField("event_id"))?;

    let fields = issue.get("fields").cloned().unwrap_or(Value::Null);
    let user = fields
        .get("assignee")
        .and_then(|a| a.get("accountId").or_else(|| a.get("name")))
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField("issue.fields.assignee"))?
        .to_string();

    Ok(ChangeEvent {
        source: source.to_string(),
        external_id,
        kind,
        item_ref: key.to_string(),
        user,
        priority: fields
            .get("priority")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str)
            .and_then(Priority::parse),
        labels: fields.get("labels").map(string_list),
        due_at: fields
            .get("duedate")
            .and_then(Value::as_str)
            .and_then(parse_rfc3339),
    })
}

/// Apply a normalized event: create or re-plan the trigger for its
/// (item, user) pair, idempotently keyed by the event's dedup key.
///
/// New and updated triggers are scheduled at `now` -- external changes are
/// evaluated immediately rather than waiting for the next planned window.
pub fn apply_event<S: TriggerStore>(
    store: &S,
    event: &ChangeEvent,
    now: DateTime<Utc>,
) -> Result<ApplyOutcome, crate::error::StoreError> {
    let key = event.dedup_key();
    if let Some(trigger_id) = store.event_trigger(&key)? {
        tracing::debug!(key = %key, trigger = %trigger_id, "replayed event ignored");
        return Ok(ApplyOutcome::Duplicate(trigger_id));
    }

    let plan = |existing: Option<&PlanSnapshot>| PlanSnapshot {
        priority: event
            .priority
            .or(existing.map(|p| p.priority))
            .unwrap_or_default(),
        urgent_labels: event
            .labels
            .as_deref()
            .map(urgent_label_subset)
            .or_else(|| existing.map(|p| p.urgent_labels.clone()))
            .unwrap_or_default(),
        due_at: event.due_at.or(existing.and_then(|p| p.due_at)),
    };

    let existing = store.pending_for(&event.item_ref, &event.user)?;
    let outcome = match existing {
        Some(mut trigger) => {
            trigger.scheduled_at = now;
            trigger.planned = Some(plan(trigger.planned.as_ref()));
            trigger.external_event_id = Some(key.clone());
            let stored = store.upsert(trigger)?;
            ApplyOutcome::Updated(stored.id)
        }
        None => {
            let mut trigger =
                ScheduledTrigger::new(event.item_ref.clone(), event.user.clone(), now, now)
                    .with_plan(plan(None));
            trigger.external_event_id = Some(key.clone());
            let stored = store.upsert(trigger)?;
            ApplyOutcome::Created(stored.id)
        }
    };

    store.record_event(&key, outcome.trigger_id(), now)?;
    Ok(outcome)
}

fn str_field<'a>(payload: &'a Value, field: &'static str) -> Result<&'a str, ValidationError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .ok_or(ValidationError::MissingField(field))
}

fn string_list(raw: &Value) -> Vec<String> {
    raw.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_rfc3339(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
