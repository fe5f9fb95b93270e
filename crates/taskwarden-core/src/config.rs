//! TOML-based configuration for the decision layer.
//!
//! Every behavioral tunable lives here so it can be changed without code
//! edits:
//! - scoring weights and thresholds
//! - per-rule decision thresholds (80/60/40/70)
//! - guardrail policy (opt-in owners, business hours, approval minimums)
//! - scheduler tick interval and grace periods
//! - the teammate roster
//!
//! Configuration is stored at `~/.config/taskwarden/config.toml`. A corrupt
//! or out-of-range file fails at load time; the per-item decision path never
//! sees an invalid config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Scoring weights and thresholds for the criticality score (CS) and the
/// automation feasibility score (AFS).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Points for priority = urgent
    #[serde(default = "default_priority_urgent")]
    pub priority_urgent: f64,
    /// Points for priority = high
    #[serde(default = "default_priority_high")]
    pub priority_high: f64,
    /// Points for priority = medium
    #[serde(default = "default_priority_medium")]
    pub priority_medium: f64,
    /// Points for priority = low
    #[serde(default)]
    pub priority_low: f64,
    /// Points when the due date falls within the next 24 hours (or has passed)
    #[serde(default = "default_due_soon")]
    pub due_soon: f64,
    /// Extra points when the due date has already passed
    #[serde(default = "default_overdue_bonus")]
    pub overdue_bonus: f64,
    /// Maximum points for staleness beyond the threshold
    #[serde(default = "default_stale_max")]
    pub stale_max: f64,
    /// Points added per day past the staleness threshold
    #[serde(default = "default_stale_per_day")]
    pub stale_per_day: f64,
    /// Days before an item starts counting as stale
    #[serde(default = "default_stale_after_days")]
    pub stale_after_days: f64,
    /// Points when a label marks the item urgent/blocker
    #[serde(default = "default_urgent_label")]
    pub urgent_label: f64,
    /// Points when the size metric exceeds `large_size`
    #[serde(default = "default_large_change")]
    pub large_change: f64,
    /// Size metric above which a change counts as large
    #[serde(default = "default_large_size")]
    pub large_size: u32,
    /// AFS points for passing CI
    #[serde(default = "default_ci_passing")]
    pub ci_passing: f64,
    /// AFS points for meeting the approval minimum
    #[serde(default = "default_approved")]
    pub approved: f64,
    /// Approvals required for the `approved` contribution
    #[serde(default = "default_required_approvals")]
    pub required_approvals: u32,
    /// AFS points when the item is not blocked
    #[serde(default = "default_unblocked")]
    pub unblocked: f64,
    /// AFS points when the item is mergeable
    #[serde(default = "default_mergeable")]
    pub mergeable: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            priority_urgent: default_priority_urgent(),
            priority_high: default_priority_high(),
            priority_medium: default_priority_medium(),
            priority_low: 0.0,
            due_soon: default_due_soon(),
            overdue_bonus: default_overdue_bonus(),
            stale_max: default_stale_max(),
            stale_per_day: default_stale_per_day(),
            stale_after_days: default_stale_after_days(),
            urgent_label: default_urgent_label(),
            large_change: default_large_change(),
            large_size: default_large_size(),
            ci_passing: default_ci_passing(),
            approved: default_approved(),
            required_approvals: default_required_approvals(),
            unblocked: default_unblocked(),
            mergeable: default_mergeable(),
        }
    }
}

/// Per-rule thresholds for the decision engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleThresholds {
    /// CS above which an available user executes directly
    #[serde(default = "default_execute_cs")]
    pub execute_cs: f64,
    /// CS above which work is delegated or automated
    #[serde(default = "default_delegate_cs")]
    pub delegate_cs: f64,
    /// AFS above which automation is considered
    #[serde(default = "default_automate_afs")]
    pub automate_afs: f64,
    /// CS below which items are batched into a summary
    #[serde(default = "default_summarize_cs")]
    pub summarize_cs: f64,
    /// Downgrade chain walked when guardrails reject an automation,
    /// first applicable entry wins ("delegate", "execute", "notify")
    #[serde(default = "default_guardrail_fallback")]
    pub guardrail_fallback: Vec<FallbackAction>,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            execute_cs: default_execute_cs(),
            delegate_cs: default_delegate_cs(),
            automate_afs: default_automate_afs(),
            summarize_cs: default_summarize_cs(),
            guardrail_fallback: default_guardrail_fallback(),
        }
    }
}

/// Actions eligible as guardrail-failure downgrades.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackAction {
    Delegate,
    Execute,
    Notify,
}

/// Guardrail policy for automated actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailPolicy {
    /// Owners who have explicitly opted into automation
    #[serde(default)]
    pub opted_in_owners: Vec<String>,
    /// Minimum AFS for automation
    #[serde(default = "default_automate_afs")]
    pub min_afs: f64,
    /// Labels that mark an item as production-facing
    #[serde(default = "default_production_labels")]
    pub production_labels: Vec<String>,
    /// Approvals required on production-labeled items
    #[serde(default = "default_production_min_approvals")]
    pub production_min_approvals: u32,
    /// Business-hours window start, "HH:MM" in the owner's local time
    #[serde(default = "default_business_start")]
    pub business_hours_start: String,
    /// Business-hours window end, "HH:MM" in the owner's local time
    #[serde(default = "default_business_end")]
    pub business_hours_end: String,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self {
            opted_in_owners: Vec::new(),
            min_afs: default_automate_afs(),
            production_labels: default_production_labels(),
            production_min_approvals: default_production_min_approvals(),
            business_hours_start: default_business_start(),
            business_hours_end: default_business_end(),
        }
    }
}

/// Scheduler timing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Fixed tick interval in minutes
    #[serde(default = "default_tick_interval")]
    pub tick_interval_minutes: u64,
    /// Grace period before an unfired trigger counts as overdue, in minutes
    #[serde(default = "default_overdue_grace")]
    pub overdue_grace_minutes: i64,
    /// Timeout for live-context fetches, in seconds
    #[serde(default = "default_context_timeout")]
    pub context_timeout_secs: u64,
    /// Maximum attempts for a trigger state transition before giving up
    /// until the next tick
    #[serde(default = "default_store_retry_max")]
    pub store_retry_max: u32,
    /// Base delay for store retry backoff, in milliseconds
    #[serde(default = "default_store_retry_base_ms")]
    pub store_retry_base_ms: u64,
    /// Half-width of the window checked for calendar conflicts around a
    /// trigger's scheduled time, in minutes
    #[serde(default = "default_conflict_window")]
    pub conflict_window_minutes: i64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            tick_interval_minutes: default_tick_interval(),
            overdue_grace_minutes: default_overdue_grace(),
            context_timeout_secs: default_context_timeout(),
            store_retry_max: default_store_retry_max(),
            store_retry_base_ms: default_store_retry_base_ms(),
            conflict_window_minutes: default_conflict_window(),
        }
    }
}

/// A teammate entry in the configured roster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeammateEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Path prefixes this teammate owns (exact-prefix match scores highest)
    #[serde(default)]
    pub path_prefixes: Vec<String>,
    /// Components this teammate owns
    #[serde(default)]
    pub components: Vec<String>,
    /// Current workload, 0-100, lower is better
    #[serde(default = "default_workload")]
    pub workload: u8,
    /// Availability signal, 0-100, higher is better
    #[serde(default = "default_availability")]
    pub availability: u8,
    /// Offset from UTC in minutes, for business-hours checks
    #[serde(default)]
    pub tz_offset_minutes: i32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/taskwarden/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub rules: RuleThresholds,
    #[serde(default)]
    pub guardrails: GuardrailPolicy,
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub teammates: Vec<TeammateEntry>,
}

impl Config {
    /// Default configuration file path (`~/.config/taskwarden/config.toml`).
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("taskwarden")
            .join("config.toml")
    }

    /// Load configuration from the default path, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from an explicit path.
    ///
    /// A missing file yields the defaults; an unreadable or invalid file is
    /// a hard error so startup fails instead of evaluations.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.validate()?;
            return Ok(config);
        }
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::LoadFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let config: Config =
            toml::from_str(&raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        }
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, raw).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Validate value ranges. Called on every load.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ordered = [
            ("rules.summarize_cs", self.rules.summarize_cs),
            ("rules.delegate_cs", self.rules.delegate_cs),
            ("rules.execute_cs", self.rules.execute_cs),
        ];
        for window in ordered.windows(2) {
            if window[0].1 > window[1].1 {
                return Err(ConfigError::InvalidValue {
                    key: window[1].0.to_string(),
                    message: format!(
                        "thresholds must be ordered: {} ({}) > {} ({})",
                        window[0].0, window[0].1, window[1].0, window[1].1
                    ),
                });
            }
        }
        for (key, value) in [
            ("rules.execute_cs", self.rules.execute_cs),
            ("rules.delegate_cs", self.rules.delegate_cs),
            ("rules.automate_afs", self.rules.automate_afs),
            ("rules.summarize_cs", self.rules.summarize_cs),
            ("guardrails.min_afs", self.guardrails.min_afs),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("must be in [0, 100], got {}", value),
                });
            }
        }
        if self.rules.guardrail_fallback.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "rules.guardrail_fallback".to_string(),
                message: "fallback chain must not be empty".to_string(),
            });
        }
        for (key, value) in [
            ("guardrails.business_hours_start", &self.guardrails.business_hours_start),
            ("guardrails.business_hours_end", &self.guardrails.business_hours_end),
        ] {
            if parse_time_to_minutes(value).is_none() {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("expected HH:MM, got '{}'", value),
                });
            }
        }
        if self.scheduler.tick_interval_minutes == 0 {
            return Err(ConfigError::InvalidValue {
                key: "scheduler.tick_interval_minutes".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Parse an "HH:MM" string to minutes since midnight.
pub fn parse_time_to_minutes(time_str: &str) -> Option<i64> {
    let (h, m) = time_str.split_once(':')?;
    let hours: i64 = h.parse().ok()?;
    let minutes: i64 = m.parse().ok()?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return None;
    }
    Some(hours * 60 + minutes)
}

// Default functions
fn default_priority_urgent() -> f64 {
    40.0
}
fn default_priority_high() -> f64 {
    28.0
}
fn default_priority_medium() -> f64 {
    14.0
}
fn default_due_soon() -> f64 {
    25.0
}
fn default_overdue_bonus() -> f64 {
    10.0
}
fn default_stale_max() -> f64 {
    15.0
}
fn default_stale_per_day() -> f64 {
    3.0
}
fn default_stale_after_days() -> f64 {
    3.0
}
fn default_urgent_label() -> f64 {
    15.0
}
fn default_large_change() -> f64 {
    10.0
}
fn default_large_size() -> u32 {
    500
}
fn default_ci_passing() -> f64 {
    35.0
}
fn default_approved() -> f64 {
    30.0
}
fn default_required_approvals() -> u32 {
    1
}
fn default_unblocked() -> f64 {
    20.0
}
fn default_mergeable() -> f64 {
    15.0
}
fn default_execute_cs() -> f64 {
    80.0
}
fn default_delegate_cs() -> f64 {
    60.0
}
fn default_automate_afs() -> f64 {
    70.0
}
fn default_summarize_cs() -> f64 {
    40.0
}
fn default_guardrail_fallback() -> Vec<FallbackAction> {
    vec![FallbackAction::Delegate, FallbackAction::Execute]
}
fn default_production_labels() -> Vec<String> {
    vec![
        "production".to_string(),
        "prod".to_string(),
        "live".to_string(),
    ]
}
fn default_production_min_approvals() -> u32 {
    2
}
fn default_business_start() -> String {
    "09:00".to_string()
}
fn default_business_end() -> String {
    "18:00".to_string()
}
fn default_tick_interval() -> u64 {
    15
}
fn default_overdue_grace() -> i64 {
    60
}
fn default_context_timeout() -> u64 {
    10
}
fn default_store_retry_max() -> u32 {
    3
}
fn default_store_retry_base_ms() -> u64 {
    50
}
fn default_conflict_window() -> i64 {
    30
}
fn default_workload() -> u8 {
    30
}
fn default_availability() -> u8 {
    50
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.scoring.priority_urgent, 40.0);
        assert_eq!(config.rules.execute_cs, 80.0);
        assert_eq!(config.guardrails.production_min_approvals, 2);
        assert_eq!(config.scheduler.tick_interval_minutes, 15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_override() {
        let config: Config = toml::from_str(
            r#"
            [rules]
            execute_cs = 90.0

            [scheduler]
            tick_interval_minutes = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.rules.execute_cs, 90.0);
        assert_eq!(config.rules.delegate_cs, 60.0);
        assert_eq!(config.scheduler.tick_interval_minutes, 5);
    }

    #[test]
    fn test_roster_entries_parse() {
        let config: Config = toml::from_str(
            r#"
            [[teammates]]
            id = "bob"
            name = "Bob"
            path_prefixes = ["src/api/"]
            components = ["api"]
            workload = 20
            availability = 80
            tz_offset_minutes = -300
            "#,
        )
        .unwrap();
        assert_eq!(config.teammates.len(), 1);
        assert_eq!(config.teammates[0].id, "bob");
        assert_eq!(config.teammates[0].tz_offset_minutes, -300);
    }

    #[test]
    fn test_validate_rejects_unordered_thresholds() {
        let mut config = Config::default();
        config.rules.summarize_cs = 70.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_business_hours() {
        let mut config = Config::default();
        config.guardrails.business_hours_start = "9am".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.rules.execute_cs = 140.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_time_to_minutes() {
        assert_eq!(parse_time_to_minutes("00:00"), Some(0));
        assert_eq!(parse_time_to_minutes("09:00"), Some(540));
        assert_eq!(parse_time_to_minutes("23:59"), Some(1439));
        assert_eq!(parse_time_to_minutes("24:00"), None);
        assert_eq!(parse_time_to_minutes("xx"), None);
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.rules.execute_cs = 85.0;
        config.guardrails.opted_in_owners = vec!["alice".to_string()];
        config.save_to(&path).unwrap();

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.rules.execute_cs, 85.0);
        assert_eq!(reloaded.guardrails.opted_in_owners, vec!["alice"]);
    }
}
