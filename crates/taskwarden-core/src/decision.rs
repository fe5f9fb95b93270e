//! Rule-based decision engine.
//!
//! Routes a scored work item to exactly one action. The rule chain is an
//! explicit ordered table of named predicates -- first match wins -- so
//! individual rules can be unit-tested and reordered without touching the
//! evaluation loop. Every decision carries a reasoning string citing the
//! thresholds it crossed plus the full factor snapshot, making it
//! reproducible from logs alone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{FallbackAction, GuardrailPolicy, RuleThresholds};
use crate::delegation::{self, DelegationRecord, Roster};
use crate::guardrail::{self, GuardrailCheck};
use crate::item::{ItemId, ItemKind, ItemStatus, Priority, UserId, WorkItem};
use crate::scoring::{ScoreBreakdown, Scores};

/// The action a decision resolves to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// User is available and the item is hot: surface it for direct work
    Execute,
    /// Hand the item to the best-ranked teammate
    Delegate,
    /// Let the system act without human confirmation (guardrail-gated)
    Automate,
    /// Low priority: fold into the next batched summary
    Summarize,
    /// Re-plan the trigger to the user's next free window
    Reschedule,
    /// Tell the user/team and do nothing else
    Notify,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Execute => "execute",
            Action::Delegate => "delegate",
            Action::Automate => "automate",
            Action::Summarize => "summarize",
            Action::Reschedule => "reschedule",
            Action::Notify => "notify",
        };
        write!(f, "{s}")
    }
}

/// Snapshot of every input the engine consulted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactorSnapshot {
    pub item_id: ItemId,
    pub item_kind: ItemKind,
    pub priority: Priority,
    pub status: ItemStatus,
    pub criticality: f64,
    pub feasibility: f64,
    pub user_available: bool,
    /// False when availability was assumed (calendar unreachable)
    pub availability_known: bool,
    pub automation_opted_in: bool,
    pub breakdown: ScoreBreakdown,
}

/// An immutable evaluation output. Produced fresh per trigger firing; this
/// exact payload crosses the notifier boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Criticality score the decision was made with
    pub criticality: f64,
    /// Automation feasibility score the decision was made with
    pub feasibility: f64,
    /// Human-readable reasoning citing the thresholds crossed
    pub reasoning: String,
    /// Name of the rule that matched
    pub matched_rule: String,
    /// Inputs consulted
    pub factors: FactorSnapshot,
    /// Guardrail report; empty unless automation was attempted
    pub guardrails: Vec<GuardrailCheck>,
    /// Chosen delegate when action = Delegate
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegate: Option<UserId>,
    /// Target window when action = Reschedule
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rescheduled_for: Option<DateTime<Utc>>,
}

/// Inputs to one decision.
#[derive(Debug, Clone)]
pub struct DecisionInput<'a> {
    pub item: &'a WorkItem,
    pub scores: &'a Scores,
    pub user_available: bool,
    /// False when the calendar could not be consulted and availability
    /// defaulted to unavailable
    pub availability_known: bool,
    pub automation_opted_in: bool,
    /// Start of the user's next known free window, if any
    pub next_free_window: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

/// A decision plus its optional delegation audit record.
#[derive(Debug, Clone)]
pub struct DecisionOutcome {
    pub decision: Decision,
    pub delegation: Option<DelegationRecord>,
}

/// What a matched rule asks the engine to do. `TryAutomate` still has to
/// clear the guardrails before it becomes [`Action::Automate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOutcome {
    Execute,
    Delegate,
    TryAutomate,
    Summarize,
    Reschedule,
    Notify,
}

/// The scalar inputs a rule predicate may inspect.
#[derive(Debug, Clone, Copy)]
pub struct RuleScope<'a> {
    pub cs: f64,
    pub afs: f64,
    pub user_available: bool,
    pub automation_opted_in: bool,
    pub thresholds: &'a RuleThresholds,
}

/// One entry in the ordered rule table.
pub struct DecisionRule {
    /// Stable rule name, recorded on every decision
    pub name: &'static str,
    /// Predicate deciding whether this rule applies
    pub applies: fn(&RuleScope) -> bool,
    /// Requested outcome when the predicate holds
    pub outcome: RuleOutcome,
}

/// The default rule table, in evaluation order.
pub fn default_rules() -> Vec<DecisionRule> {
    vec![
        DecisionRule {
            name: "execute-direct",
            applies: |s| s.cs > s.thresholds.execute_cs && s.user_available,
            outcome: RuleOutcome::Execute,
        },
        DecisionRule {
            name: "delegate-unavailable",
            applies: |s| s.cs > s.thresholds.delegate_cs && !s.user_available,
            outcome: RuleOutcome::Delegate,
        },
        DecisionRule {
            name: "automate-safe",
            applies: |s| {
                s.cs > s.thresholds.delegate_cs
                    && s.afs > s.thresholds.automate_afs
                    && s.automation_opted_in
            },
            outcome: RuleOutcome::TryAutomate,
        },
        DecisionRule {
            name: "summarize-low",
            applies: |s| s.cs < s.thresholds.summarize_cs,
            outcome: RuleOutcome::Summarize,
        },
        DecisionRule {
            name: "reschedule-medium",
            applies: |s| {
                s.cs >= s.thresholds.summarize_cs
                    && s.cs <= s.thresholds.delegate_cs
                    && !s.user_available
            },
            outcome: RuleOutcome::Reschedule,
        },
        DecisionRule {
            name: "notify-default",
            applies: |_| true,
            outcome: RuleOutcome::Notify,
        },
    ]
}

/// Decision engine: rule table + guardrail policy + roster handle.
pub struct DecisionEngine<R: Roster> {
    rules: Vec<DecisionRule>,
    thresholds: RuleThresholds,
    guardrails: GuardrailPolicy,
    roster: R,
}

impl<R: Roster> DecisionEngine<R> {
    pub fn new(thresholds: RuleThresholds, guardrails: GuardrailPolicy, roster: R) -> Self {
        Self {
            rules: default_rules(),
            thresholds,
            guardrails,
            roster,
        }
    }

    /// Replace the rule table (order is significant).
    pub fn with_rules(mut self, rules: Vec<DecisionRule>) -> Self {
        self.rules = rules;
        self
    }

    /// The active rule table, for inspection.
    pub fn rules(&self) -> &[DecisionRule] {
        &self.rules
    }

    /// Decide what happens to a scored work item. Pure: identical inputs
    /// always produce the identical decision.
    pub fn decide(&self, input: &DecisionInput) -> DecisionOutcome {
        let scope = RuleScope {
            cs: input.scores.criticality,
            afs: input.scores.feasibility,
            user_available: input.user_available,
            automation_opted_in: input.automation_opted_in,
            thresholds: &self.thresholds,
        };

        let rule = self
            .rules
            .iter()
            .find(|r| (r.applies)(&scope))
            .unwrap_or(&FINAL_NOTIFY);

        match rule.outcome {
            RuleOutcome::Execute => self.finish(
                input,
                rule.name,
                Action::Execute,
                format!(
                    "High criticality (CS {:.1} > {}). User is available. Execute directly.",
                    scope.cs, self.thresholds.execute_cs
                ),
                Vec::new(),
            ),
            RuleOutcome::Delegate => self.delegate(
                input,
                rule.name,
                format!(
                    "High criticality (CS {:.1} > {}). User is unavailable.",
                    scope.cs, self.thresholds.delegate_cs
                ),
                Vec::new(),
            ),
            RuleOutcome::TryAutomate => self.try_automate(input, rule.name, &scope),
            RuleOutcome::Summarize => self.finish(
                input,
                rule.name,
                Action::Summarize,
                format!(
                    "Low criticality (CS {:.1} < {}). Summarize and batch for later.",
                    scope.cs, self.thresholds.summarize_cs
                ),
                Vec::new(),
            ),
            RuleOutcome::Reschedule => self.reschedule(input, rule.name, &scope),
            RuleOutcome::Notify => self.finish(
                input,
                rule.name,
                Action::Notify,
                format!("Criticality CS {:.1}. Notify user/team.", scope.cs),
                Vec::new(),
            ),
        }
    }

    /// Resolve a Delegate outcome: rank the roster and pick the head, or
    /// downgrade to Notify when nobody is eligible.
    fn delegate(
        &self,
        input: &DecisionInput,
        rule: &str,
        reasoning_prefix: String,
        guardrails: Vec<GuardrailCheck>,
    ) -> DecisionOutcome {
        let roster = self.roster.teammates();
        let ranked = delegation::select(input.item, &roster, &input.item.owner);

        match ranked.first() {
            Some(best) => {
                let reasoning = format!(
                    "{} Delegate to {} (score {:.1}: ownership {:.0}, workload {:.0}, availability {:.0}).",
                    reasoning_prefix,
                    best.teammate.id,
                    best.score.total,
                    best.score.ownership,
                    best.score.workload,
                    best.score.availability,
                );
                let record = DelegationRecord {
                    item_ref: input.item.id.clone(),
                    teammate: best.teammate.id.clone(),
                    score: best.score.clone(),
                    decided_at: input.now,
                };
                let mut outcome = self.finish(input, rule, Action::Delegate, reasoning, guardrails);
                outcome.decision.delegate = Some(best.teammate.id.clone());
                outcome.delegation = Some(record);
                outcome
            }
            None => self.finish(
                input,
                rule,
                Action::Notify,
                format!("{} No delegate available. Notify instead.", reasoning_prefix),
                guardrails,
            ),
        }
    }

    /// Resolve a TryAutomate outcome through the guardrail validator.
    fn try_automate(
        &self,
        input: &DecisionInput,
        rule: &str,
        scope: &RuleScope,
    ) -> DecisionOutcome {
        let owner_tz = self
            .roster
            .get(&input.item.owner)
            .map(|t| t.tz_offset_minutes)
            .unwrap_or(0);

        let checks = guardrail::validate(
            input.item,
            scope.afs,
            input.automation_opted_in,
            input.now,
            &self.guardrails,
            owner_tz,
        );

        let prefix = format!(
            "High criticality (CS {:.1} > {}). High automation feasibility (AFS {:.1} > {}).",
            scope.cs, self.thresholds.delegate_cs, scope.afs, self.thresholds.automate_afs
        );

        if guardrail::all_passed(&checks) {
            return self.finish(
                input,
                rule,
                Action::Automate,
                format!("{} Guardrails passed. Safe to automate.", prefix),
                checks,
            );
        }

        let failure = guardrail::failure_summary(&checks);
        let prefix = format!("{} Automation rejected by guardrails: {}.", prefix, failure);

        // Walk the configured downgrade chain; first applicable entry wins.
        for fallback in &self.thresholds.guardrail_fallback {
            match fallback {
                FallbackAction::Delegate if !input.user_available => {
                    return self.delegate(input, rule, prefix, checks);
                }
                FallbackAction::Execute if input.user_available => {
                    return self.finish(
                        input,
                        rule,
                        Action::Execute,
                        format!("{} User is available. Execute directly instead.", prefix),
                        checks,
                    );
                }
                FallbackAction::Notify => {
                    return self.finish(
                        input,
                        rule,
                        Action::Notify,
                        format!("{} Notify instead.", prefix),
                        checks,
                    );
                }
                _ => continue,
            }
        }

        self.finish(
            input,
            rule,
            Action::Notify,
            format!("{} No applicable downgrade. Notify instead.", prefix),
            checks,
        )
    }

    /// Resolve a Reschedule outcome, falling back to Notify when no free
    /// window is known.
    fn reschedule(&self, input: &DecisionInput, rule: &str, scope: &RuleScope) -> DecisionOutcome {
        let prefix = format!(
            "Medium criticality (CS {:.1} in [{}, {}]). User is unavailable.",
            scope.cs, self.thresholds.summarize_cs, self.thresholds.delegate_cs
        );

        match input.next_free_window {
            Some(window) => {
                let mut outcome = self.finish(
                    input,
                    rule,
                    Action::Reschedule,
                    format!(
                        "{} Reschedule to the next free window at {}.",
                        prefix,
                        window.to_rfc3339()
                    ),
                    Vec::new(),
                );
                outcome.decision.rescheduled_for = Some(window);
                outcome
            }
            None => self.finish(
                input,
                rule,
                Action::Notify,
                format!("{} No known free window. Notify instead.", prefix),
                Vec::new(),
            ),
        }
    }

    fn finish(
        &self,
        input: &DecisionInput,
        rule: &str,
        action: Action,
        reasoning: String,
        guardrails: Vec<GuardrailCheck>,
    ) -> DecisionOutcome {
        let decision = Decision {
            action,
            criticality: input.scores.criticality,
            feasibility: input.scores.feasibility,
            reasoning,
            matched_rule: rule.to_string(),
            factors: FactorSnapshot {
                item_id: input.item.id.clone(),
                item_kind: input.item.kind,
                priority: input.item.priority,
                status: input.item.status,
                criticality: input.scores.criticality,
                feasibility: input.scores.feasibility,
                user_available: input.user_available,
                availability_known: input.availability_known,
                automation_opted_in: input.automation_opted_in,
                breakdown: input.scores.breakdown.clone(),
            },
            guardrails,
            delegate: None,
            rescheduled_for: None,
        };
        DecisionOutcome {
            decision,
            delegation: None,
        }
    }
}

/// Safety net should a custom rule table omit a catch-all entry.
static FINAL_NOTIFY: DecisionRule = DecisionRule {
    name: "notify-default",
    applies: |_| true,
    outcome: RuleOutcome::Notify,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FallbackAction, GuardrailPolicy, RuleThresholds};
    use crate::delegation::{ConfigRoster, Teammate};
    use crate::item::{CiState, ItemKind, ItemStatus, Priority};
    use crate::scoring::{ScoreBreakdown, Scores};
    use chrono::TimeZone;

    fn make_item() -> WorkItem {
        WorkItem {
            id: "pr-42".to_string(),
            kind: ItemKind::ReviewRequest,
            title: "Harden ingest".to_string(),
            priority: Priority::High,
            due_at: None,
            created_at: Utc::now(),
            size: 120,
            labels: vec![],
            status: ItemStatus::Open,
            ci: CiState::Passing,
            approvals: 2,
            blocked: false,
            mergeable: true,
            owner: "alice".to_string(),
            paths: vec!["src/ingest/mod.rs".to_string()],
            component: Some("ingest".to_string()),
        }
    }

    fn make_scores(cs: f64, afs: f64) -> Scores {
        Scores {
            criticality: cs,
            feasibility: afs,
            breakdown: ScoreBreakdown::default(),
        }
    }

    fn make_roster() -> ConfigRoster {
        ConfigRoster::from_teammates(vec![
            Teammate {
                id: "a".to_string(),
                name: "A".to_string(),
                path_prefixes: vec![],
                components: vec!["ingest".to_string()],
                workload: 30,
                availability: 70,
                tz_offset_minutes: 0,
            },
            Teammate {
                id: "b".to_string(),
                name: "B".to_string(),
                path_prefixes: vec![],
                components: vec![],
                workload: 90,
                availability: 40,
                tz_offset_minutes: 0,
            },
        ])
    }

    fn make_engine(roster: ConfigRoster) -> DecisionEngine<ConfigRoster> {
        DecisionEngine::new(RuleThresholds::default(), GuardrailPolicy::default(), roster)
    }

    fn make_input<'a>(
        item: &'a WorkItem,
        scores: &'a Scores,
        user_available: bool,
        automation_opted_in: bool,
    ) -> DecisionInput<'a> {
        DecisionInput {
            item,
            scores,
            user_available,
            availability_known: true,
            automation_opted_in,
            next_free_window: None,
            // midday UTC, inside default business hours
            now: Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_high_cs_available_executes() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(85.0, 20.0);

        let outcome = engine.decide(&make_input(&item, &scores, true, false));
        assert_eq!(outcome.decision.action, Action::Execute);
        assert_eq!(outcome.decision.matched_rule, "execute-direct");
        assert!(outcome.decision.reasoning.contains("85.0"));
        assert!(outcome.decision.reasoning.contains("80"));
    }

    #[test]
    fn test_high_cs_unavailable_delegates_to_best() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(82.0, 34.0);

        let outcome = engine.decide(&make_input(&item, &scores, false, false));
        assert_eq!(outcome.decision.action, Action::Delegate);
        assert_eq!(outcome.decision.delegate.as_deref(), Some("a"));

        let record = outcome.delegation.unwrap();
        assert_eq!(record.teammate, "a");
        assert!((record.score.total - 74.0).abs() < 0.01);
    }

    #[test]
    fn test_delegate_without_roster_downgrades_to_notify() {
        let engine = make_engine(ConfigRoster::default());
        let item = make_item();
        let scores = make_scores(82.0, 34.0);

        let outcome = engine.decide(&make_input(&item, &scores, false, false));
        assert_eq!(outcome.decision.action, Action::Notify);
        assert!(outcome.decision.reasoning.contains("No delegate available"));
        assert!(outcome.delegation.is_none());
    }

    #[test]
    fn test_automate_when_guardrails_pass() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(65.0, 85.0);

        let outcome = engine.decide(&make_input(&item, &scores, true, true));
        assert_eq!(outcome.decision.action, Action::Automate);
        assert_eq!(outcome.decision.guardrails.len(), 6);
        assert!(outcome.decision.guardrails.iter().all(|c| c.passed));
    }

    #[test]
    fn test_guardrail_failure_downgrades_to_execute_when_available() {
        let engine = make_engine(make_roster());
        let mut item = make_item();
        item.labels = vec!["production".to_string()];
        item.approvals = 1;
        let scores = make_scores(65.0, 75.0);

        let outcome = engine.decide(&make_input(&item, &scores, true, true));
        assert_eq!(outcome.decision.action, Action::Execute);
        assert!(outcome.decision.reasoning.contains("rejected by guardrails"));
        assert!(outcome
            .decision
            .guardrails
            .iter()
            .any(|c| c.name == "production_safe" && !c.passed));
    }

    #[test]
    fn test_guardrail_failure_delegates_when_unavailable() {
        // Force the automate rule to see an unavailable user by reordering:
        // drop the delegate-unavailable rule so automate-safe matches first.
        let rules = vec![
            DecisionRule {
                name: "automate-safe",
                applies: |s| {
                    s.cs > s.thresholds.delegate_cs
                        && s.afs > s.thresholds.automate_afs
                        && s.automation_opted_in
                },
                outcome: RuleOutcome::TryAutomate,
            },
            DecisionRule {
                name: "notify-default",
                applies: |_| true,
                outcome: RuleOutcome::Notify,
            },
        ];
        let engine = make_engine(make_roster()).with_rules(rules);

        let mut item = make_item();
        item.labels = vec!["production".to_string()];
        item.approvals = 1;
        let scores = make_scores(65.0, 75.0);

        let outcome = engine.decide(&make_input(&item, &scores, false, true));
        assert_eq!(outcome.decision.action, Action::Delegate);
        assert_eq!(outcome.decision.delegate.as_deref(), Some("a"));
        assert!(!outcome.decision.guardrails.is_empty());
    }

    #[test]
    fn test_low_cs_summarizes_regardless_of_rest() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(35.0, 95.0);

        for (available, opted_in) in [(true, true), (false, false), (true, false)] {
            let outcome = engine.decide(&make_input(&item, &scores, available, opted_in));
            assert_eq!(outcome.decision.action, Action::Summarize);
        }
    }

    #[test]
    fn test_medium_cs_unavailable_reschedules_to_window() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(50.0, 10.0);
        let window = Utc.with_ymd_and_hms(2025, 6, 2, 15, 0, 0).unwrap();

        let mut input = make_input(&item, &scores, false, false);
        input.next_free_window = Some(window);

        let outcome = engine.decide(&input);
        assert_eq!(outcome.decision.action, Action::Reschedule);
        assert_eq!(outcome.decision.rescheduled_for, Some(window));
    }

    #[test]
    fn test_medium_cs_without_window_notifies() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(50.0, 10.0);

        let outcome = engine.decide(&make_input(&item, &scores, false, false));
        assert_eq!(outcome.decision.action, Action::Notify);
        assert!(outcome.decision.reasoning.contains("No known free window"));
    }

    #[test]
    fn test_medium_cs_available_notifies() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(50.0, 10.0);

        let outcome = engine.decide(&make_input(&item, &scores, true, false));
        assert_eq!(outcome.decision.action, Action::Notify);
        assert_eq!(outcome.decision.matched_rule, "notify-default");
    }

    #[test]
    fn test_automate_only_with_all_guardrails_green() {
        // Property: action == Automate implies every guardrail check passed.
        let engine = make_engine(make_roster());
        let mut item = make_item();

        for (ci, blocked, approvals, labels) in [
            (CiState::Passing, false, 2, vec![]),
            (CiState::Failing, false, 2, vec![]),
            (CiState::Passing, true, 2, vec![]),
            (CiState::Passing, false, 0, vec!["production".to_string()]),
        ] {
            item.ci = ci;
            item.blocked = blocked;
            item.approvals = approvals;
            item.labels = labels;

            let scores = make_scores(65.0, 85.0);
            let outcome = engine.decide(&make_input(&item, &scores, true, true));
            if outcome.decision.action == Action::Automate {
                assert!(outcome.decision.guardrails.iter().all(|c| c.passed));
            } else {
                assert!(outcome.decision.guardrails.iter().any(|c| !c.passed));
            }
        }
    }

    #[test]
    fn test_decide_is_deterministic() {
        let engine = make_engine(make_roster());
        let item = make_item();
        let scores = make_scores(72.0, 80.0);
        let input = make_input(&item, &scores, false, true);

        let first = engine.decide(&input);
        for _ in 0..5 {
            let again = engine.decide(&input);
            assert_eq!(again.decision.action, first.decision.action);
            assert_eq!(again.decision.reasoning, first.decision.reasoning);
            assert_eq!(again.decision.delegate, first.decision.delegate);
        }
    }

    #[test]
    fn test_notify_fallback_entry_applies_unconditionally() {
        let mut thresholds = RuleThresholds::default();
        thresholds.guardrail_fallback = vec![FallbackAction::Notify];
        let engine = DecisionEngine::new(thresholds, GuardrailPolicy::default(), make_roster());

        let mut item = make_item();
        item.ci = CiState::Failing;
        let scores = make_scores(65.0, 75.0);

        let outcome = engine.decide(&make_input(&item, &scores, true, true));
        assert_eq!(outcome.decision.action, Action::Notify);
    }
}
