//! Teammate selection algorithm.
//!
//! Ranks teammates for delegation by combining:
//! - ownership match against the item's paths/component (40%)
//! - inverted workload (30%)
//! - availability (30%)
//!
//! The ranking is fully deterministic: ties break on lower workload, then
//! on lexical teammate id. The requesting user is never a candidate.

use serde::{Deserialize, Serialize};

use crate::delegation::Teammate;
use crate::item::{UserId, WorkItem};

/// Weight on ownership match.
const OWNERSHIP_WEIGHT: f64 = 0.4;
/// Weight on inverted workload.
const WORKLOAD_WEIGHT: f64 = 0.3;
/// Weight on availability.
const AVAILABILITY_WEIGHT: f64 = 0.3;

/// Ownership score for an exact path-prefix match.
const PATH_MATCH_SCORE: f64 = 100.0;
/// Ownership score for a component match.
const COMPONENT_MATCH_SCORE: f64 = 80.0;

/// Per-candidate score breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionScore {
    /// Ownership sub-score, 0-100
    pub ownership: f64,
    /// Inverted workload sub-score, 0-100
    pub workload: f64,
    /// Availability sub-score, 0-100
    pub availability: f64,
    /// Weighted total
    pub total: f64,
}

/// A ranked delegation candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankedTeammate {
    pub teammate: Teammate,
    pub score: SelectionScore,
}

/// Rank `roster` for delegating `item`, best candidate first.
///
/// `requesting_user` (normally the item's owner) is excluded. Callers take
/// the head as the delegate; the full list serves as a fallback chain.
pub fn select(item: &WorkItem, roster: &[Teammate], requesting_user: &UserId) -> Vec<RankedTeammate> {
    let mut ranked: Vec<RankedTeammate> = roster
        .iter()
        .filter(|t| &t.id != requesting_user)
        .map(|t| RankedTeammate {
            score: score_teammate(item, t),
            teammate: t.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .total
            .partial_cmp(&a.score.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.teammate.workload.cmp(&b.teammate.workload))
            .then_with(|| a.teammate.id.cmp(&b.teammate.id))
    });

    ranked
}

fn score_teammate(item: &WorkItem, teammate: &Teammate) -> SelectionScore {
    let ownership = ownership_score(item, teammate);
    let workload = 100.0 - f64::from(teammate.workload.min(100));
    let availability = f64::from(teammate.availability.min(100));

    let total = OWNERSHIP_WEIGHT * ownership
        + WORKLOAD_WEIGHT * workload
        + AVAILABILITY_WEIGHT * availability;

    SelectionScore {
        ownership,
        workload,
        availability,
        total,
    }
}

/// Ownership match: file-path prefix first, component second, else zero.
fn ownership_score(item: &WorkItem, teammate: &Teammate) -> f64 {
    let path_match = item.paths.iter().any(|path| {
        teammate
            .path_prefixes
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    });
    if path_match {
        return PATH_MATCH_SCORE;
    }

    let component_match = item.component.as_deref().is_some_and(|component| {
        teammate
            .components
            .iter()
            .any(|c| c.eq_ignore_ascii_case(component))
    });
    if component_match {
        return COMPONENT_MATCH_SCORE;
    }

    0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{CiState, ItemKind, ItemStatus, Priority};
    use chrono::Utc;

    fn make_item(paths: Vec<&str>, component: Option<&str>) -> WorkItem {
        WorkItem {
            id: "pr-42".to_string(),
            kind: ItemKind::ReviewRequest,
            title: "Refactor ingest".to_string(),
            priority: Priority::High,
            due_at: None,
            created_at: Utc::now(),
            size: 200,
            labels: vec![],
            status: ItemStatus::Open,
            ci: CiState::Passing,
            approvals: 1,
            blocked: false,
            mergeable: true,
            owner: "alice".to_string(),
            paths: paths.into_iter().map(String::from).collect(),
            component: component.map(String::from),
        }
    }

    fn make_teammate(id: &str, workload: u8, availability: u8) -> Teammate {
        Teammate {
            id: id.to_string(),
            name: id.to_string(),
            path_prefixes: vec![],
            components: vec![],
            workload,
            availability,
            tz_offset_minutes: 0,
        }
    }

    #[test]
    fn test_requesting_user_excluded() {
        let item = make_item(vec![], None);
        let roster = vec![make_teammate("alice", 0, 100), make_teammate("bob", 50, 50)];

        let ranked = select(&item, &roster, &"alice".to_string());
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].teammate.id, "bob");
    }

    #[test]
    fn test_path_prefix_beats_component() {
        let item = make_item(vec!["src/api/router.rs"], Some("api"));

        let mut path_owner = make_teammate("path-owner", 50, 50);
        path_owner.path_prefixes = vec!["src/api/".to_string()];
        let mut component_owner = make_teammate("component-owner", 50, 50);
        component_owner.components = vec!["api".to_string()];

        let ranked = select(&item, &[component_owner, path_owner], &"alice".to_string());
        assert_eq!(ranked[0].teammate.id, "path-owner");
        assert_eq!(ranked[0].score.ownership, 100.0);
        assert_eq!(ranked[1].score.ownership, 80.0);
    }

    #[test]
    fn test_spec_scenario_weighted_ranking() {
        // A: ownership 80, workload 30, availability 70 -> 0.4*80 + 0.3*70 + 0.3*70 = 74
        // B: ownership 20 is not representable via pattern matching; closest
        // corpus-faithful framing is no match (0), workload 90, availability 40
        let item = make_item(vec![], Some("payments"));

        let mut a = make_teammate("a", 30, 70);
        a.components = vec!["payments".to_string()];
        let b = make_teammate("b", 90, 40);

        let ranked = select(&item, &[b, a], &"alice".to_string());
        assert_eq!(ranked[0].teammate.id, "a");
        assert!((ranked[0].score.total - 74.0).abs() < 0.01);
        assert!(ranked[0].score.total > ranked[1].score.total);
    }

    #[test]
    fn test_tie_breaks_are_deterministic() {
        let item = make_item(vec![], None);

        // identical totals: zed vs amy with equal workload/availability
        let roster = vec![make_teammate("zed", 40, 60), make_teammate("amy", 40, 60)];
        let ranked = select(&item, &roster, &"alice".to_string());
        assert_eq!(ranked[0].teammate.id, "amy");

        // lower workload wins before lexical order kicks in, totals equalized
        // via availability: (100-20)*0.3 + 40*0.3 == (100-60)*0.3 + 80*0.3
        let roster = vec![make_teammate("zed", 20, 40), make_teammate("amy", 60, 80)];
        let ranked = select(&item, &roster, &"alice".to_string());
        assert_eq!(ranked[0].teammate.id, "zed");
    }

    #[test]
    fn test_repeated_calls_yield_same_order() {
        let item = make_item(vec!["src/core/mod.rs"], Some("core"));
        let mut roster = vec![
            make_teammate("bob", 30, 70),
            make_teammate("carol", 60, 90),
            make_teammate("dave", 10, 20),
        ];
        roster[1].path_prefixes = vec!["src/core/".to_string()];
        roster[2].components = vec!["core".to_string()];

        let first = select(&item, &roster, &"alice".to_string());
        for _ in 0..10 {
            let again = select(&item, &roster, &"alice".to_string());
            let ids: Vec<_> = again.iter().map(|r| r.teammate.id.clone()).collect();
            let first_ids: Vec<_> = first.iter().map(|r| r.teammate.id.clone()).collect();
            assert_eq!(ids, first_ids);
        }
    }

    #[test]
    fn test_empty_roster_yields_no_candidates() {
        let item = make_item(vec![], None);
        assert!(select(&item, &[], &"alice".to_string()).is_empty());
    }
}
