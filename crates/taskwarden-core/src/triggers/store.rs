//! Trigger persistence.
//!
//! [`TriggerStore`] is the single mutation point for scheduled triggers.
//! Implementations serialize access per store, which is what makes the
//! scheduler's compare-and-set firing at-most-once even when a tick and a
//! webhook update race on the same trigger.
//!
//! Two implementations ship: [`SqliteTriggerStore`] for production and
//! [`MemoryTriggerStore`] for tests and the CLI's dry-run mode.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::delegation::DelegationRecord;
use crate::delegation::SelectionScore;
use crate::error::StoreError;
use crate::item::Priority;
use crate::triggers::{PlanSnapshot, ScheduledTrigger, TriggerState};

/// Storage for scheduled triggers, processed webhook events, and the
/// delegation audit log.
pub trait TriggerStore: Send + Sync {
    /// Insert or update a trigger.
    ///
    /// Enforces the one-pending-trigger-per-(item, user) invariant: when a
    /// Pending trigger already exists for the pair (and the incoming trigger
    /// is not that row), the existing row is updated in place -- keeping its
    /// id and creation time -- and returned.
    fn upsert(&self, trigger: ScheduledTrigger) -> Result<ScheduledTrigger, StoreError>;

    /// Fetch a trigger by id.
    fn get(&self, id: &str) -> Result<Option<ScheduledTrigger>, StoreError>;

    /// The Pending trigger for an (item, user) pair, if one exists.
    fn pending_for(
        &self,
        item_ref: &str,
        user: &str,
    ) -> Result<Option<ScheduledTrigger>, StoreError>;

    /// Pending triggers with `scheduled_at <= now`, soonest first.
    fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTrigger>, StoreError>;

    /// Every stored trigger, for listings.
    fn all(&self) -> Result<Vec<ScheduledTrigger>, StoreError>;

    /// Guarded state transition: moves `id` from `from` to `to` and stamps
    /// `last_evaluated_at = at` when `to` is Fired. Returns false without
    /// mutating when the current state is not `from`.
    fn transition(
        &self,
        id: &str,
        from: TriggerState,
        to: TriggerState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Record that an external event key ("source:event_id") was applied to
    /// a trigger.
    fn record_event(&self, key: &str, trigger_id: &str, at: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// The trigger a previously processed external event applied to, if any.
    fn event_trigger(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Append a delegation audit record.
    fn append_delegation(&self, record: &DelegationRecord) -> Result<(), StoreError>;
}

impl<T: TriggerStore + ?Sized> TriggerStore for std::sync::Arc<T> {
    fn upsert(&self, trigger: ScheduledTrigger) -> Result<ScheduledTrigger, StoreError> {
        (**self).upsert(trigger)
    }
    fn get(&self, id: &str) -> Result<Option<ScheduledTrigger>, StoreError> {
        (**self).get(id)
    }
    fn pending_for(
        &self,
        item_ref: &str,
        user: &str,
    ) -> Result<Option<ScheduledTrigger>, StoreError> {
        (**self).pending_for(item_ref, user)
    }
    fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTrigger>, StoreError> {
        (**self).due(now)
    }
    fn all(&self) -> Result<Vec<ScheduledTrigger>, StoreError> {
        (**self).all()
    }
    fn transition(
        &self,
        id: &str,
        from: TriggerState,
        to: TriggerState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        (**self).transition(id, from, to, at)
    }
    fn record_event(
        &self,
        key: &str,
        trigger_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).record_event(key, trigger_id, at)
    }
    fn event_trigger(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).event_trigger(key)
    }
    fn append_delegation(&self, record: &DelegationRecord) -> Result<(), StoreError> {
        (**self).append_delegation(record)
    }
}

// === In-memory implementation ===

/// In-memory trigger store. Used by tests and the CLI's offline commands.
#[derive(Default)]
pub struct MemoryTriggerStore {
    triggers: Mutex<HashMap<String, ScheduledTrigger>>,
    events: Mutex<HashMap<String, String>>,
    delegations: Mutex<Vec<DelegationRecord>>,
}

impl MemoryTriggerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded delegation audit entries (test inspection).
    pub fn delegations(&self) -> Vec<DelegationRecord> {
        self.delegations.lock().expect("delegation lock").clone()
    }
}

impl TriggerStore for MemoryTriggerStore {
    fn upsert(&self, trigger: ScheduledTrigger) -> Result<ScheduledTrigger, StoreError> {
        let mut triggers = self.triggers.lock().expect("trigger lock");

        // Same-pair Pending row wins over a blind insert
        let existing = triggers
            .values()
            .find(|t| {
                t.state == TriggerState::Pending
                    && t.item_ref == trigger.item_ref
                    && t.user == trigger.user
                    && t.id != trigger.id
            })
            .map(|t| (t.id.clone(), t.created_at));

        let stored = match existing {
            Some((id, created_at)) if trigger.state == TriggerState::Pending => ScheduledTrigger {
                id,
                created_at,
                ..trigger
            },
            _ => trigger,
        };
        triggers.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    fn get(&self, id: &str) -> Result<Option<ScheduledTrigger>, StoreError> {
        Ok(self.triggers.lock().expect("trigger lock").get(id).cloned())
    }

    fn pending_for(
        &self,
        item_ref: &str,
        user: &str,
    ) -> Result<Option<ScheduledTrigger>, StoreError> {
        Ok(self
            .triggers
            .lock()
            .expect("trigger lock")
            .values()
            .find(|t| {
                t.state == TriggerState::Pending && t.item_ref == item_ref && t.user == user
            })
            .cloned())
    }

    fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTrigger>, StoreError> {
        let mut due: Vec<ScheduledTrigger> = self
            .triggers
            .lock()
            .expect("trigger lock")
            .values()
            .filter(|t| t.state == TriggerState::Pending && t.scheduled_at <= now)
            .cloned()
            .collect();
        due.sort_by_key(|t| t.scheduled_at);
        Ok(due)
    }

    fn all(&self) -> Result<Vec<ScheduledTrigger>, StoreError> {
        let mut all: Vec<ScheduledTrigger> = self
            .triggers
            .lock()
            .expect("trigger lock")
            .values()
            .cloned()
            .collect();
        all.sort_by_key(|t| t.created_at);
        Ok(all)
    }

    fn transition(
        &self,
        id: &str,
        from: TriggerState,
        to: TriggerState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut triggers = self.triggers.lock().expect("trigger lock");
        match triggers.get_mut(id) {
            Some(trigger) if trigger.state == from => {
                trigger.state = to;
                if to == TriggerState::Fired {
                    trigger.last_evaluated_at = Some(at);
                }
                Ok(true)
            }
            Some(_) => Ok(false),
            None => Err(StoreError::UnknownTrigger(id.to_string())),
        }
    }

    fn record_event(
        &self,
        key: &str,
        trigger_id: &str,
        _at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.events
            .lock()
            .expect("event lock")
            .insert(key.to_string(), trigger_id.to_string());
        Ok(())
    }

    fn event_trigger(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.events.lock().expect("event lock").get(key).cloned())
    }

    fn append_delegation(&self, record: &DelegationRecord) -> Result<(), StoreError> {
        self.delegations
            .lock()
            .expect("delegation lock")
            .push(record.clone());
        Ok(())
    }
}

// === SQLite implementation ===

/// SQLite-backed trigger store.
///
/// The connection sits behind a mutex: all mutations are serialized, and the
/// firing transition is a guarded `UPDATE ... WHERE state = ?` so it is
/// atomic even against a racing webhook update.
pub struct SqliteTriggerStore {
    conn: Mutex<Connection>,
}

impl SqliteTriggerStore {
    /// Open (and migrate) the store at the default data path,
    /// `<data dir>/taskwarden/triggers.db`.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskwarden")
            .join("triggers.db");
        Self::open(&path)
    }

    /// Open (and migrate) the store at an explicit path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        }
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (tests).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn =
            Connection::open_in_memory().map_err(|e| StoreError::QueryFailed(e.to_string()))?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Apply pending schema migrations.
fn migrate(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);",
    )
    .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        conn.execute_batch(
            "CREATE TABLE triggers (
                id TEXT PRIMARY KEY,
                item_ref TEXT NOT NULL,
                user_id TEXT NOT NULL,
                scheduled_at TEXT NOT NULL,
                state TEXT NOT NULL,
                created_at TEXT NOT NULL,
                last_evaluated_at TEXT,
                external_event_id TEXT,
                planned_priority TEXT,
                planned_labels TEXT,
                planned_due_at TEXT
            );
            CREATE INDEX idx_triggers_due ON triggers(state, scheduled_at);
            CREATE UNIQUE INDEX idx_triggers_pending_pair
                ON triggers(item_ref, user_id) WHERE state = 'pending';
            CREATE TABLE processed_events (
                key TEXT PRIMARY KEY,
                trigger_id TEXT NOT NULL,
                seen_at TEXT NOT NULL
            );
            CREATE TABLE delegation_log (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                item_ref TEXT NOT NULL,
                teammate TEXT NOT NULL,
                ownership REAL NOT NULL,
                workload REAL NOT NULL,
                availability REAL NOT NULL,
                total REAL NOT NULL,
                decided_at TEXT NOT NULL
            );
            DELETE FROM schema_version;
            INSERT INTO schema_version (version) VALUES (1);",
        )
        .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;
    }

    Ok(())
}

/// Format trigger state for storage.
fn format_state(state: TriggerState) -> &'static str {
    match state {
        TriggerState::Pending => "pending",
        TriggerState::Fired => "fired",
        TriggerState::Cancelled => "cancelled",
    }
}

/// Parse trigger state from storage.
fn parse_state(state_str: &str) -> TriggerState {
    match state_str {
        "fired" => TriggerState::Fired,
        "cancelled" => TriggerState::Cancelled,
        _ => TriggerState::Pending,
    }
}

/// Format priority for storage.
fn format_priority(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "low",
        Priority::Medium => "medium",
        Priority::High => "high",
        Priority::Urgent => "urgent",
    }
}

/// Parse priority from storage.
fn parse_priority(priority_str: &str) -> Priority {
    Priority::parse(priority_str).unwrap_or_default()
}

/// Parse an RFC3339 timestamp, falling back to the epoch on corruption.
fn parse_datetime(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| DateTime::<Utc>::UNIX_EPOCH)
}

/// Build a ScheduledTrigger from a database row.
fn row_to_trigger(row: &rusqlite::Row) -> Result<ScheduledTrigger, rusqlite::Error> {
    let state_str: String = row.get(4)?;
    let planned_priority: Option<String> = row.get(8)?;
    let planned_labels: Option<String> = row.get(9)?;
    let planned_due_at: Option<String> = row.get(10)?;

    let planned = planned_priority.map(|priority| PlanSnapshot {
        priority: parse_priority(&priority),
        urgent_labels: planned_labels
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default(),
        due_at: planned_due_at.map(|raw| parse_datetime(&raw)),
    });

    Ok(ScheduledTrigger {
        id: row.get(0)?,
        item_ref: row.get(1)?,
        user: row.get(2)?,
        scheduled_at: parse_datetime(&row.get::<_, String>(3)?),
        state: parse_state(&state_str),
        created_at: parse_datetime(&row.get::<_, String>(5)?),
        last_evaluated_at: row
            .get::<_, Option<String>>(6)?
            .map(|raw| parse_datetime(&raw)),
        external_event_id: row.get(7)?,
        planned,
    })
}

const TRIGGER_COLUMNS: &str = "id, item_ref, user_id, scheduled_at, state, created_at, \
     last_evaluated_at, external_event_id, planned_priority, planned_labels, planned_due_at";

impl SqliteTriggerStore {
    fn write_trigger(
        conn: &Connection,
        trigger: &ScheduledTrigger,
    ) -> Result<(), StoreError> {
        let planned_priority = trigger
            .planned
            .as_ref()
            .map(|p| format_priority(p.priority).to_string());
        let planned_labels = trigger
            .planned
            .as_ref()
            .map(|p| serde_json::to_string(&p.urgent_labels).unwrap_or_else(|_| "[]".into()));
        let planned_due_at = trigger
            .planned
            .as_ref()
            .and_then(|p| p.due_at.map(|d| d.to_rfc3339()));

        conn.execute(
            "INSERT INTO triggers (id, item_ref, user_id, scheduled_at, state, created_at,
                last_evaluated_at, external_event_id, planned_priority, planned_labels, planned_due_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                item_ref = excluded.item_ref,
                user_id = excluded.user_id,
                scheduled_at = excluded.scheduled_at,
                state = excluded.state,
                last_evaluated_at = excluded.last_evaluated_at,
                external_event_id = excluded.external_event_id,
                planned_priority = excluded.planned_priority,
                planned_labels = excluded.planned_labels,
                planned_due_at = excluded.planned_due_at",
            params![
                trigger.id,
                trigger.item_ref,
                trigger.user,
                trigger.scheduled_at.to_rfc3339(),
                format_state(trigger.state),
                trigger.created_at.to_rfc3339(),
                trigger.last_evaluated_at.map(|d| d.to_rfc3339()),
                trigger.external_event_id,
                planned_priority,
                planned_labels,
                planned_due_at,
            ],
        )?;
        Ok(())
    }
}

impl TriggerStore for SqliteTriggerStore {
    fn upsert(&self, trigger: ScheduledTrigger) -> Result<ScheduledTrigger, StoreError> {
        let conn = self.conn.lock().expect("store lock");

        let stored = if trigger.state == TriggerState::Pending {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {TRIGGER_COLUMNS} FROM triggers
                         WHERE item_ref = ?1 AND user_id = ?2 AND state = 'pending' AND id != ?3"
                    ),
                    params![trigger.item_ref, trigger.user, trigger.id],
                    row_to_trigger,
                )
                .optional()?;
            match existing {
                Some(current) => ScheduledTrigger {
                    id: current.id,
                    created_at: current.created_at,
                    ..trigger
                },
                None => trigger,
            }
        } else {
            trigger
        };

        Self::write_trigger(&conn, &stored)?;
        Ok(stored)
    }

    fn get(&self, id: &str) -> Result<Option<ScheduledTrigger>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let trigger = conn
            .query_row(
                &format!("SELECT {TRIGGER_COLUMNS} FROM triggers WHERE id = ?1"),
                params![id],
                row_to_trigger,
            )
            .optional()?;
        Ok(trigger)
    }

    fn pending_for(
        &self,
        item_ref: &str,
        user: &str,
    ) -> Result<Option<ScheduledTrigger>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let trigger = conn
            .query_row(
                &format!(
                    "SELECT {TRIGGER_COLUMNS} FROM triggers
                     WHERE item_ref = ?1 AND user_id = ?2 AND state = 'pending'"
                ),
                params![item_ref, user],
                row_to_trigger,
            )
            .optional()?;
        Ok(trigger)
    }

    fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledTrigger>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers
             WHERE state = 'pending' AND scheduled_at <= ?1
             ORDER BY scheduled_at ASC"
        ))?;
        let rows = stmt.query_map(params![now.to_rfc3339()], row_to_trigger)?;
        let mut due = Vec::new();
        for row in rows {
            due.push(row?);
        }
        Ok(due)
    }

    fn all(&self) -> Result<Vec<ScheduledTrigger>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let mut stmt = conn.prepare(&format!(
            "SELECT {TRIGGER_COLUMNS} FROM triggers ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map([], row_to_trigger)?;
        let mut all = Vec::new();
        for row in rows {
            all.push(row?);
        }
        Ok(all)
    }

    fn transition(
        &self,
        id: &str,
        from: TriggerState,
        to: TriggerState,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let evaluated_at = (to == TriggerState::Fired).then(|| at.to_rfc3339());
        let changed = conn.execute(
            "UPDATE triggers
             SET state = ?1,
                 last_evaluated_at = COALESCE(?2, last_evaluated_at)
             WHERE id = ?3 AND state = ?4",
            params![format_state(to), evaluated_at, id, format_state(from)],
        )?;
        if changed == 0 {
            let exists: bool = conn
                .query_row(
                    "SELECT 1 FROM triggers WHERE id = ?1",
                    params![id],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);
            if !exists {
                return Err(StoreError::UnknownTrigger(id.to_string()));
            }
        }
        Ok(changed > 0)
    }

    fn record_event(
        &self,
        key: &str,
        trigger_id: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        conn.execute(
            "INSERT OR IGNORE INTO processed_events (key, trigger_id, seen_at)
             VALUES (?1, ?2, ?3)",
            params![key, trigger_id, at.to_rfc3339()],
        )?;
        Ok(())
    }

    fn event_trigger(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let trigger_id = conn
            .query_row(
                "SELECT trigger_id FROM processed_events WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(trigger_id)
    }

    fn append_delegation(&self, record: &DelegationRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().expect("store lock");
        conn.execute(
            "INSERT INTO delegation_log
                (item_ref, teammate, ownership, workload, availability, total, decided_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.item_ref,
                record.teammate,
                record.score.ownership,
                record.score.workload,
                record.score.availability,
                record.score.total,
                record.decided_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

/// Read back delegation audit entries (listings and tests).
impl SqliteTriggerStore {
    pub fn delegations(&self) -> Result<Vec<DelegationRecord>, StoreError> {
        let conn = self.conn.lock().expect("store lock");
        let mut stmt = conn.prepare(
            "SELECT item_ref, teammate, ownership, workload, availability, total, decided_at
             FROM delegation_log ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DelegationRecord {
                item_ref: row.get(0)?,
                teammate: row.get(1)?,
                score: SelectionScore {
                    ownership: row.get(2)?,
                    workload: row.get(3)?,
                    availability: row.get(4)?,
                    total: row.get(5)?,
                },
                decided_at: parse_datetime(&row.get::<_, String>(6)?),
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }
}
