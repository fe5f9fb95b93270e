//! Live evaluation context and the provider seam.
//!
//! The decision layer never talks to the calendar service or the tracker
//! directly; an external [`ContextProvider`] assembles a [`LiveContext`]
//! snapshot per evaluation. Providers are expected to enforce the configured
//! fetch timeout themselves -- a slow upstream must surface as an `Err`, not
//! as a hung tick. Any fetch failure collapses into the detector's
//! conservative unknown-context path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ContextError;
use crate::item::{ItemId, UserId, WorkItem};

/// A calendar event used for conflict detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CalendarEvent {
    /// Create a new calendar event.
    pub fn new(
        id: String,
        title: String,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            start_time,
            end_time,
        }
    }

    /// Check if this event overlaps with a time range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start_time < end && self.end_time > start
    }
}

/// Live context assembled for one evaluation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiveContext {
    /// Fresh snapshot of the work item, if the tracker answered
    pub item: Option<WorkItem>,
    /// The owning user's calendar around the evaluation window
    pub calendar: Vec<CalendarEvent>,
    /// Whether the owning user is available right now; `None` when the
    /// calendar could not be consulted
    pub user_available: Option<bool>,
    /// Start of the user's next known free window, for rescheduling
    pub next_free_window: Option<DateTime<Utc>>,
}

impl LiveContext {
    /// Whether any calendar event overlaps `[start, end)`.
    pub fn has_conflict(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.calendar.iter().any(|e| e.overlaps(start, end))
    }
}

/// Supplies live context for evaluations.
///
/// Production implementations wrap the (out-of-scope) calendar and tracker
/// clients. Implementations must return within the configured timeout;
/// exceeding it is reported as [`ContextError::Timeout`].
pub trait ContextProvider: Send + Sync {
    /// Fetch context for evaluating `item` on behalf of `user` around the
    /// `[window_start, window_end)` window.
    fn fetch(
        &self,
        item: &ItemId,
        user: &UserId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<LiveContext, ContextError>;
}

impl<T: ContextProvider + ?Sized> ContextProvider for std::sync::Arc<T> {
    fn fetch(
        &self,
        item: &ItemId,
        user: &UserId,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<LiveContext, ContextError> {
        (**self).fetch(item, user, window_start, window_end)
    }
}

/// Context provider returning a fixed snapshot. Used in tests and by the
/// CLI's offline evaluation mode.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    context: LiveContext,
}

impl StaticContextProvider {
    pub fn new(context: LiveContext) -> Self {
        Self { context }
    }
}

impl ContextProvider for StaticContextProvider {
    fn fetch(
        &self,
        _item: &ItemId,
        _user: &UserId,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<LiveContext, ContextError> {
        Ok(self.context.clone())
    }
}

/// Context provider that always fails. Used in tests for the
/// unknown-context path.
#[derive(Debug, Clone, Default)]
pub struct UnavailableContextProvider;

impl ContextProvider for UnavailableContextProvider {
    fn fetch(
        &self,
        _item: &ItemId,
        _user: &UserId,
        _window_start: DateTime<Utc>,
        _window_end: DateTime<Utc>,
    ) -> Result<LiveContext, ContextError> {
        Err(ContextError::Upstream("context provider offline".into()))
    }
}
