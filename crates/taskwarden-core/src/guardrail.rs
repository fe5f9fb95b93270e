//! Automation guardrails.
//!
//! Before an Automate action is finalized, every check here must pass.
//! A failing check never raises: the validator reports each check by name
//! and the decision engine downgrades the action instead. No partial
//! automation -- one failure fails the whole gate.

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{parse_time_to_minutes, GuardrailPolicy};
use crate::item::{CiState, WorkItem};

/// Result of a single guardrail check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailCheck {
    /// Check name, stable across releases (decisions are reproduced from logs)
    pub name: String,
    /// Whether the check passed
    pub passed: bool,
    /// Failure detail, absent when passed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl GuardrailCheck {
    fn pass(name: &str) -> Self {
        Self {
            name: name.to_string(),
            passed: true,
            detail: None,
        }
    }

    fn fail(name: &str, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// Whether every check in a report passed.
pub fn all_passed(checks: &[GuardrailCheck]) -> bool {
    checks.iter().all(|c| c.passed)
}

/// Joined failure details for reasoning strings.
pub fn failure_summary(checks: &[GuardrailCheck]) -> String {
    let failures: Vec<&str> = checks
        .iter()
        .filter(|c| !c.passed)
        .filter_map(|c| c.detail.as_deref())
        .collect();
    if failures.is_empty() {
        "All checks passed".to_string()
    } else {
        failures.join("; ")
    }
}

/// Run every guardrail check for a proposed automation.
///
/// `owner_tz_offset_minutes` is the owning user's offset from UTC (from the
/// roster); owners not in the roster are checked against UTC business hours.
pub fn validate(
    item: &WorkItem,
    feasibility: f64,
    automation_opted_in: bool,
    now: DateTime<Utc>,
    policy: &GuardrailPolicy,
    owner_tz_offset_minutes: i32,
) -> Vec<GuardrailCheck> {
    let mut checks = Vec::with_capacity(6);

    checks.push(if automation_opted_in {
        GuardrailCheck::pass("automation_opt_in")
    } else {
        GuardrailCheck::fail(
            "automation_opt_in",
            format!("owner '{}' has not opted into automation", item.owner),
        )
    });

    checks.push(if feasibility >= policy.min_afs {
        GuardrailCheck::pass("high_afs")
    } else {
        GuardrailCheck::fail(
            "high_afs",
            format!(
                "automation feasibility too low (AFS {:.1} < {})",
                feasibility, policy.min_afs
            ),
        )
    });

    let is_production = policy
        .production_labels
        .iter()
        .any(|label| item.has_label(label));
    checks.push(
        if !is_production || item.approvals >= policy.production_min_approvals {
            GuardrailCheck::pass("production_safe")
        } else {
            GuardrailCheck::fail(
                "production_safe",
                format!(
                    "production changes require {}+ approvals, have {}",
                    policy.production_min_approvals, item.approvals
                ),
            )
        },
    );

    checks.push(if item.ci == CiState::Passing {
        GuardrailCheck::pass("ci_passed")
    } else {
        GuardrailCheck::fail("ci_passed", "CI must pass before automation")
    });

    checks.push(if !item.blocked {
        GuardrailCheck::pass("no_blockers")
    } else {
        GuardrailCheck::fail("no_blockers", "item has blockers")
    });

    checks.push(business_hours_check(now, policy, owner_tz_offset_minutes));

    checks
}

/// Check that `now`, shifted into the owner's timezone, falls inside the
/// configured business-hours window.
fn business_hours_check(
    now: DateTime<Utc>,
    policy: &GuardrailPolicy,
    owner_tz_offset_minutes: i32,
) -> GuardrailCheck {
    // Config is validated at load time; fall back to an always-failing window
    // rather than panicking if a hand-edited config slipped through.
    let (Some(start), Some(end)) = (
        parse_time_to_minutes(&policy.business_hours_start),
        parse_time_to_minutes(&policy.business_hours_end),
    ) else {
        return GuardrailCheck::fail("business_hours", "business-hours window is unparseable");
    };

    let local = now + Duration::minutes(owner_tz_offset_minutes as i64);
    let local_minutes = local.hour() as i64 * 60 + local.minute() as i64;

    let inside = if start <= end {
        (start..end).contains(&local_minutes)
    } else {
        // Overnight window, e.g. 22:00-06:00
        local_minutes >= start || local_minutes < end
    };

    if inside {
        GuardrailCheck::pass("business_hours")
    } else {
        GuardrailCheck::fail(
            "business_hours",
            format!(
                "automation only allowed between {} and {} (owner local time)",
                policy.business_hours_start, policy.business_hours_end
            ),
        )
    }
}
