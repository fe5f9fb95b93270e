//! Shared application state for the HTTP layer.

use std::sync::Arc;

use taskwarden_core::context::ContextProvider;
use taskwarden_core::delegation::Roster;
use taskwarden_core::notifier::Notifier;
use taskwarden_core::triggers::{TriggerScheduler, TriggerStore};

/// Scheduler wired entirely through trait objects so the embedding
/// application chooses the store, context provider, notifier, and roster.
pub type Scheduler = TriggerScheduler<
    Arc<dyn TriggerStore>,
    Arc<dyn ContextProvider>,
    Arc<dyn Notifier>,
    Arc<dyn Roster>,
>;

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self { scheduler }
    }
}
