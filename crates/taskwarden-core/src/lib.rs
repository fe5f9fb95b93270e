//! # Taskwarden Core Library
//!
//! This library is the decision intelligence layer of a productivity
//! assistant: given a snapshot of a tracked work item (an issue or a
//! code-review request) plus current context, it decides what should happen
//! to the item -- execute, delegate, automate, summarize, reschedule, or
//! notify -- without further human input.
//!
//! ## Architecture
//!
//! - **Scoring Engine**: pure function from item attributes to a
//!   criticality score and an automation feasibility score, both 0-100
//! - **Decision Engine**: ordered rule table mapping scores + availability
//!   to exactly one action, with an explainable reasoning trace
//! - **Guardrail Validator**: the safety gate in front of any automated
//!   action
//! - **Teammate Selector**: deterministic weighted ranking of a roster for
//!   delegation
//! - **Triggers**: scheduled re-evaluations plus webhook-driven ones, with
//!   at-most-once firing and idempotent event ingestion
//!
//! Everything around the core (chat front-end, API clients, the messaging
//! layer) is an external collaborator reached through the [`ContextProvider`],
//! [`Roster`], and [`Notifier`] traits.
//!
//! ## Key Components
//!
//! - [`ScoringEngine`]: CS/AFS computation with factor breakdowns
//! - [`DecisionEngine`]: first-match-wins rule evaluation
//! - [`TriggerScheduler`]: tick loop, upserts, cancellation
//! - [`TriggerStore`]: sqlite or in-memory trigger persistence

pub mod config;
pub mod context;
pub mod decision;
pub mod delegation;
pub mod error;
pub mod guardrail;
pub mod item;
pub mod notifier;
pub mod scoring;
pub mod triggers;

pub use config::Config;
pub use context::{CalendarEvent, ContextProvider, LiveContext, StaticContextProvider};
pub use decision::{Action, Decision, DecisionEngine, DecisionInput, DecisionOutcome};
pub use delegation::{ConfigRoster, DelegationRecord, RankedTeammate, Roster, Teammate};
pub use error::{ConfigError, ContextError, CoreError, StoreError, ValidationError};
pub use guardrail::GuardrailCheck;
pub use item::{CiState, ItemKind, ItemStatus, Priority, WorkItem};
pub use notifier::{DecisionNotice, Notifier, TracingNotifier};
pub use scoring::{Scores, ScoringEngine};
pub use triggers::{
    MemoryTriggerStore, MismatchReason, ScheduledTrigger, SqliteTriggerStore, TriggerScheduler,
    TriggerState, TriggerStore,
};
