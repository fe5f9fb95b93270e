//! Decision delivery contract.
//!
//! The messaging layer (chat bot, e-mail digest) lives outside this crate;
//! it consumes exactly one payload shape, [`DecisionNotice`], and nothing
//! else crosses the boundary. [`TracingNotifier`] is the in-repo default;
//! [`RecordingNotifier`] captures notices for assertions in tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::decision::Decision;
use crate::error::CoreError;
use crate::item::{ItemId, UserId};
use crate::triggers::detector::MismatchReason;
use crate::triggers::TriggerId;

/// The full payload handed to the messaging collaborator per evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionNotice {
    pub trigger_id: TriggerId,
    pub item_ref: ItemId,
    pub user: UserId,
    pub decision: Decision,
    /// Mismatch that prompted (or accompanied) this evaluation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mismatch: Option<MismatchReason>,
    pub decided_at: DateTime<Utc>,
}

/// Delivers decisions to the messaging collaborator.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notice: &DecisionNotice) -> Result<(), CoreError>;
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn deliver(&self, notice: &DecisionNotice) -> Result<(), CoreError> {
        (**self).deliver(notice)
    }
}

/// Default notifier: structured log lines only. Real delivery adapters are
/// wired in by the embedding application.
#[derive(Debug, Clone, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn deliver(&self, notice: &DecisionNotice) -> Result<(), CoreError> {
        tracing::info!(
            trigger = %notice.trigger_id,
            item = %notice.item_ref,
            user = %notice.user,
            action = %notice.decision.action,
            cs = notice.decision.criticality,
            afs = notice.decision.feasibility,
            mismatch = notice.mismatch.map(|m| m.as_str()),
            "decision"
        );
        Ok(())
    }
}

/// Captures every notice for later inspection. Test helper.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<DecisionNotice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<DecisionNotice> {
        self.sent.lock().expect("notice lock").clone()
    }
}

impl Notifier for RecordingNotifier {
    fn deliver(&self, notice: &DecisionNotice) -> Result<(), CoreError> {
        self.sent.lock().expect("notice lock").push(notice.clone());
        Ok(())
    }
}
