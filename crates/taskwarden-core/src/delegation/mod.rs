//! Teammate delegation: roster data and the selection algorithm.
//!
//! When the decision engine lands on Delegate, the selector ranks the
//! roster against the work item's ownership signals and hands back the best
//! candidate. The roster itself is swappable: configuration-backed in
//! production, literal in tests.

mod selector;

pub use selector::{select, RankedTeammate, SelectionScore};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TeammateEntry;
use crate::item::{ItemId, UserId};

/// A teammate eligible for delegation. Read-only reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Teammate {
    pub id: UserId,
    pub name: String,
    /// Path prefixes this teammate owns
    pub path_prefixes: Vec<String>,
    /// Components this teammate owns
    pub components: Vec<String>,
    /// Current workload, 0-100, lower is better
    pub workload: u8,
    /// Availability signal, 0-100, higher is better
    pub availability: u8,
    /// Offset from UTC in minutes
    pub tz_offset_minutes: i32,
}

impl From<&TeammateEntry> for Teammate {
    fn from(entry: &TeammateEntry) -> Self {
        Self {
            id: entry.id.clone(),
            name: entry.name.clone(),
            path_prefixes: entry.path_prefixes.clone(),
            components: entry.components.clone(),
            workload: entry.workload.min(100),
            availability: entry.availability.min(100),
            tz_offset_minutes: entry.tz_offset_minutes,
        }
    }
}

/// Source of teammate reference data.
///
/// The core never mutates a roster; production rosters are sourced
/// externally and refreshed outside this crate.
pub trait Roster: Send + Sync {
    /// All known teammates.
    fn teammates(&self) -> Vec<Teammate>;

    /// Look up one teammate by id.
    fn get(&self, id: &str) -> Option<Teammate> {
        self.teammates().into_iter().find(|t| t.id == id)
    }
}

impl<T: Roster + ?Sized> Roster for std::sync::Arc<T> {
    fn teammates(&self) -> Vec<Teammate> {
        (**self).teammates()
    }

    fn get(&self, id: &str) -> Option<Teammate> {
        (**self).get(id)
    }
}

/// Roster backed by the `[[teammates]]` tables in the configuration file.
#[derive(Debug, Clone, Default)]
pub struct ConfigRoster {
    teammates: Vec<Teammate>,
}

impl ConfigRoster {
    pub fn from_entries(entries: &[TeammateEntry]) -> Self {
        Self {
            teammates: entries.iter().map(Teammate::from).collect(),
        }
    }

    pub fn from_teammates(teammates: Vec<Teammate>) -> Self {
        Self { teammates }
    }
}

impl Roster for ConfigRoster {
    fn teammates(&self) -> Vec<Teammate> {
        self.teammates.clone()
    }
}

/// Audit record appended whenever a delegate is chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationRecord {
    pub item_ref: ItemId,
    pub teammate: UserId,
    pub score: SelectionScore,
    pub decided_at: DateTime<Utc>,
}
