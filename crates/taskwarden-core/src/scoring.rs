//! Criticality and automation-feasibility scoring engine.
//!
//! Two scores are computed for every work item, both clamped to [0, 100]:
//!
//! - **Criticality Score (CS)**: how urgent/important the item is.
//! - **Automation Feasibility Score (AFS)**: how safe it is for the system
//!   to act without human confirmation.
//!
//! Scoring is a pure function of `(item, now, weights)`: no hidden state,
//! recomputed from scratch on every evaluation, and total over all valid
//! work items: missing optional fields contribute zero instead of erroring.
//! Every contribution is recorded as a named [`ScoreFactor`] so a decision
//! can be reproduced from its logged breakdown alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringWeights;
use crate::item::{CiState, WorkItem};

/// A single named contribution to a score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreFactor {
    /// Factor name
    pub name: String,
    /// Points contributed (pre-clamp)
    pub points: f64,
}

impl ScoreFactor {
    fn new(name: impl Into<String>, points: f64) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }
}

/// Complete scoring breakdown for explainability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    /// Contributions to the criticality score
    pub criticality: Vec<ScoreFactor>,
    /// Contributions to the automation feasibility score
    pub feasibility: Vec<ScoreFactor>,
}

impl ScoreBreakdown {
    /// The top criticality contributor, if any factor fired.
    pub fn top_criticality_factor(&self) -> Option<&ScoreFactor> {
        self.criticality
            .iter()
            .max_by(|a, b| a.points.partial_cmp(&b.points).unwrap_or(std::cmp::Ordering::Equal))
    }
}

/// Result of scoring a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scores {
    /// Criticality score, 0-100
    pub criticality: f64,
    /// Automation feasibility score, 0-100
    pub feasibility: f64,
    /// Named contributions behind both scores
    pub breakdown: ScoreBreakdown,
}

/// Scoring engine.
///
/// Holds the configured weights; `score` itself is side-effect-free.
pub struct ScoringEngine {
    weights: ScoringWeights,
}

impl ScoringEngine {
    /// Create an engine with default weights.
    pub fn new() -> Self {
        Self {
            weights: ScoringWeights::default(),
        }
    }

    /// Create with custom weights.
    pub fn with_weights(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    /// Get current weights.
    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    /// Score a work item at `now`.
    pub fn score(&self, item: &WorkItem, now: DateTime<Utc>) -> Scores {
        let mut breakdown = ScoreBreakdown::default();
        let criticality = self.criticality(item, now, &mut breakdown.criticality);
        let feasibility = self.feasibility(item, &mut breakdown.feasibility);
        Scores {
            criticality,
            feasibility,
            breakdown,
        }
    }

    fn criticality(
        &self,
        item: &WorkItem,
        now: DateTime<Utc>,
        factors: &mut Vec<ScoreFactor>,
    ) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        let priority_points = match item.priority {
            crate::item::Priority::Urgent => w.priority_urgent,
            crate::item::Priority::High => w.priority_high,
            crate::item::Priority::Medium => w.priority_medium,
            crate::item::Priority::Low => w.priority_low,
        };
        score += priority_points;
        factors.push(ScoreFactor::new("priority", priority_points));

        if item.is_overdue(now) {
            let points = w.due_soon + w.overdue_bonus;
            score += points;
            factors.push(ScoreFactor::new("overdue", points));
        } else if item.due_within_hours(now, 24) {
            score += w.due_soon;
            factors.push(ScoreFactor::new("due_soon", w.due_soon));
        }

        let days_past = item.age_days(now) - w.stale_after_days;
        if days_past > 0.0 {
            let points = (days_past * w.stale_per_day).min(w.stale_max);
            score += points;
            factors.push(ScoreFactor::new("stale", points));
        }

        if item.has_urgent_label() {
            score += w.urgent_label;
            factors.push(ScoreFactor::new("urgent_label", w.urgent_label));
        }

        if item.size > w.large_size {
            score += w.large_change;
            factors.push(ScoreFactor::new("large_change", w.large_change));
        }

        score.clamp(0.0, 100.0)
    }

    fn feasibility(&self, item: &WorkItem, factors: &mut Vec<ScoreFactor>) -> f64 {
        let w = &self.weights;
        let mut score = 0.0;

        if item.ci == CiState::Passing {
            score += w.ci_passing;
            factors.push(ScoreFactor::new("ci_passing", w.ci_passing));
        }

        if item.approvals >= w.required_approvals {
            score += w.approved;
            factors.push(ScoreFactor::new("approved", w.approved));
        }

        if !item.blocked {
            score += w.unblocked;
            factors.push(ScoreFactor::new("unblocked", w.unblocked));
        }

        if item.mergeable {
            score += w.mergeable;
            factors.push(ScoreFactor::new("mergeable", w.mergeable));
        }

        score.clamp(0.0, 100.0)
    }
}

impl Default for ScoringEngine {
    fn default() -> Self {
        Self::new()
    }
}
