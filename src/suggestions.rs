//! Suggestion aggregation
//!
//! Pure ranking over a graph snapshot and per-learner progress. Individual
//! suggestions score every candidate figure for one learner; group suggestions
//! count, per figure, the members individually ready for it.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::suggestions::CacheEntry;
use crate::graph::PrerequisiteGraph;
use crate::readiness::{percentage, score_node, LearnerProgress};

/// Who a suggestion list is for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
#[ts(export, export_to = "progression/")]
pub enum SuggestionTarget {
    Learner(String),
    Group(String),
}

impl SuggestionTarget {
    /// Value of the `target_kind` column
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Learner(_) => "learner",
            Self::Group(_) => "group",
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Learner(id) | Self::Group(id) => id,
        }
    }
}

impl fmt::Display for SuggestionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Cut-off and length of a ranked list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankOptions {
    /// Minimum score (or percentage) kept, inclusive
    pub threshold: u8,
    /// Maximum entries; `None` keeps all
    pub limit: Option<usize>,
}

impl RankOptions {
    pub fn new(threshold: u8, limit: usize) -> Self {
        Self { threshold, limit: Some(limit) }
    }

    pub fn unlimited(threshold: u8) -> Self {
        Self { threshold, limit: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "progression/")]
pub struct IndividualSuggestion {
    pub figure_id: String,
    pub score: u8,
    pub validated_count: u32,
    pub total_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "progression/")]
pub struct GroupSuggestion {
    pub figure_id: String,
    pub percentage: u8,
    pub ready_count: u32,
    pub group_size: u32,
}

impl From<&IndividualSuggestion> for CacheEntry {
    fn from(s: &IndividualSuggestion) -> Self {
        CacheEntry {
            figure_id: s.figure_id.clone(),
            score: s.score.into(),
            validated_count: s.validated_count as i32,
            total_count: s.total_count as i32,
        }
    }
}

impl From<&GroupSuggestion> for CacheEntry {
    fn from(s: &GroupSuggestion) -> Self {
        CacheEntry {
            figure_id: s.figure_id.clone(),
            score: s.percentage.into(),
            validated_count: s.ready_count as i32,
            total_count: s.group_size as i32,
        }
    }
}

/// Everything the aggregator needs to know about one learner
#[derive(Debug, Clone, Default)]
pub struct LearnerContext {
    pub progress: LearnerProgress,
    /// Figures present in any plan assigned to the learner
    pub assigned: HashSet<String>,
}

/// Sort by `key` descending; ties keep their incoming (catalog) order
fn rank<T>(mut items: Vec<(usize, T)>, key: impl Fn(&T) -> u8, limit: Option<usize>) -> Vec<T> {
    items.sort_by(|(ia, a), (ib, b)| key(b).cmp(&key(a)).then(ia.cmp(ib)));
    if let Some(limit) = limit {
        items.truncate(limit);
    }
    items.into_iter().map(|(_, item)| item).collect()
}

/// Figures a learner could start next, best first
pub fn suggest_for_learner(
    graph: &PrerequisiteGraph,
    learner: &LearnerContext,
    options: RankOptions,
) -> Vec<IndividualSuggestion> {
    let candidates: Vec<(usize, IndividualSuggestion)> = (0..graph.len())
        .filter(|&idx| graph.has_required_prerequisites(idx))
        .filter(|&idx| {
            let node = graph.node(idx);
            !learner.assigned.contains(&node.id) && !learner.progress.has_mastered(node)
        })
        .map(|idx| (idx, score_node(graph, idx, &learner.progress)))
        .filter(|(_, score)| score.score >= options.threshold)
        .map(|(idx, score)| {
            (
                idx,
                IndividualSuggestion {
                    figure_id: score.figure_id,
                    score: score.score,
                    validated_count: score.validated_count,
                    total_count: score.total_count,
                },
            )
        })
        .collect();

    rank(candidates, |s: &IndividualSuggestion| s.score, options.limit)
}

/// Figures a share of the group is ready for, best first.
///
/// A member is "ready" for a figure when it appears in their individual list
/// at `ready_threshold` with no limit.
pub fn suggest_for_group(
    graph: &PrerequisiteGraph,
    members: &[LearnerContext],
    ready_threshold: u8,
    options: RankOptions,
) -> Vec<GroupSuggestion> {
    if members.is_empty() {
        return Vec::new();
    }

    let mut ready = vec![0u32; graph.len()];
    for member in members {
        for suggestion in suggest_for_learner(graph, member, RankOptions::unlimited(ready_threshold)) {
            if let Some(idx) = graph.index_of(&suggestion.figure_id) {
                ready[idx] += 1;
            }
        }
    }

    let group_size = members.len() as u32;
    let candidates: Vec<(usize, GroupSuggestion)> = ready
        .iter()
        .enumerate()
        .filter(|(_, &count)| count > 0)
        .map(|(idx, &count)| {
            (
                idx,
                GroupSuggestion {
                    figure_id: graph.node(idx).id.clone(),
                    percentage: percentage(count.into(), group_size.into()),
                    ready_count: count,
                    group_size,
                },
            )
        })
        .filter(|(_, s)| s.percentage >= options.threshold)
        .collect();

    rank(candidates, |s: &GroupSuggestion| s.percentage, options.limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::{edge, figure, step};

    fn learner(steps: &[&str], assigned: &[&str]) -> LearnerContext {
        LearnerContext {
            progress: LearnerProgress::new(steps.iter().map(|s| s.to_string()).collect()),
            assigned: assigned.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn ids<T>(items: &[T], f: impl Fn(&T) -> &str) -> Vec<String> {
        items.iter().map(|i| f(i).to_string()).collect()
    }

    /// rondade ← roulade (2), atr (3); salto ← rondade (1); pirouette ← roulade (1)
    fn catalog() -> PrerequisiteGraph {
        let figures = vec![
            figure("roulade", 0),
            figure("atr", 1),
            figure("rondade", 2),
            figure("salto", 3),
            figure("pirouette", 4),
        ];
        let steps = vec![
            step("roulade", 1),
            step("atr", 1),
            step("rondade", 1),
            step("salto", 1),
            step("pirouette", 1),
        ];
        let edges = vec![
            edge("rondade", "roulade", 2, true, 0),
            edge("rondade", "atr", 3, true, 1),
            edge("salto", "rondade", 1, true, 0),
            edge("pirouette", "roulade", 1, true, 0),
        ];
        PrerequisiteGraph::from_parts(figures, steps, edges).unwrap()
    }

    #[test]
    fn test_target_wire_shape() {
        let target = SuggestionTarget::Group("g1".into());
        assert_eq!(target.kind(), "group");
        assert_eq!(target.id(), "g1");
        assert_eq!(target.to_string(), "group:g1");
        assert_eq!(
            serde_json::to_value(&target).unwrap(),
            serde_json::json!({"kind": "group", "id": "g1"})
        );
    }

    #[test]
    fn test_rondade_threshold_boundary() {
        let g = catalog();
        let alice = learner(&["roulade-1"], &["pirouette"]);

        let at_60 = suggest_for_learner(&g, &alice, RankOptions::new(60, 5));
        assert!(at_60.is_empty());

        let at_40 = suggest_for_learner(&g, &alice, RankOptions::new(40, 5));
        assert_eq!(at_40.len(), 1);
        assert_eq!(at_40[0].figure_id, "rondade");
        assert_eq!(at_40[0].score, 40);
        assert_eq!(at_40[0].validated_count, 1);
        assert_eq!(at_40[0].total_count, 2);
    }

    #[test]
    fn test_mastered_and_assigned_figures_excluded() {
        let g = catalog();

        // pirouette scores 100 but its own step is validated
        let mastered = learner(&["roulade-1", "pirouette-1"], &[]);
        let list = suggest_for_learner(&g, &mastered, RankOptions::new(0, 10));
        assert!(!ids(&list, |s| s.figure_id.as_str()).contains(&"pirouette".to_string()));

        let assigned = learner(&["roulade-1"], &["pirouette"]);
        let list = suggest_for_learner(&g, &assigned, RankOptions::new(0, 10));
        assert_eq!(ids(&list, |s| s.figure_id.as_str()), vec!["rondade", "salto"]);
    }

    #[test]
    fn test_ordering_and_limit() {
        let g = catalog();
        let bob = learner(&["roulade-1", "atr-1"], &[]);

        let list = suggest_for_learner(&g, &bob, RankOptions::new(0, 10));
        // rondade and pirouette tie at 100: catalog order breaks the tie
        assert_eq!(ids(&list, |s| s.figure_id.as_str()), vec!["rondade", "pirouette", "salto"]);
        assert_eq!(list[2].score, 0);

        let top = suggest_for_learner(&g, &bob, RankOptions::new(0, 1));
        assert_eq!(ids(&top, |s| s.figure_id.as_str()), vec!["rondade"]);
    }

    #[test]
    fn test_only_figures_with_required_prerequisites() {
        let g = catalog();
        let list = suggest_for_learner(&g, &learner(&[], &[]), RankOptions::unlimited(0));
        let figures = ids(&list, |s| s.figure_id.as_str());
        assert!(!figures.contains(&"roulade".to_string()));
        assert!(!figures.contains(&"atr".to_string()));
        assert_eq!(figures.len(), 3);
    }

    #[test]
    fn test_group_half_ready() {
        let g = catalog();
        let members = vec![
            learner(&["roulade-1"], &[]),
            learner(&["roulade-1"], &[]),
            learner(&[], &[]),
            learner(&["atr-1"], &[]),
        ];

        let at_50 = suggest_for_group(&g, &members, 80, RankOptions::new(50, 5));
        assert_eq!(at_50.len(), 1);
        assert_eq!(at_50[0].figure_id, "pirouette");
        assert_eq!(at_50[0].percentage, 50);
        assert_eq!(at_50[0].ready_count, 2);
        assert_eq!(at_50[0].group_size, 4);

        assert!(suggest_for_group(&g, &members, 80, RankOptions::new(60, 5)).is_empty());
    }

    #[test]
    fn test_group_member_exclusions_apply() {
        let g = catalog();
        // First member already has pirouette in a plan
        let members = vec![learner(&["roulade-1"], &["pirouette"]), learner(&["roulade-1"], &[])];

        let list = suggest_for_group(&g, &members, 80, RankOptions::new(0, 5));
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].ready_count, 1);
        assert_eq!(list[0].percentage, 50);
    }

    #[test]
    fn test_empty_group() {
        let g = catalog();
        assert!(suggest_for_group(&g, &[], 80, RankOptions::new(0, 5)).is_empty());
    }

    #[test]
    fn test_cache_entry_conversion() {
        let group = GroupSuggestion {
            figure_id: "atr".into(),
            percentage: 75,
            ready_count: 3,
            group_size: 4,
        };
        let entry = CacheEntry::from(&group);
        assert_eq!(entry.score, 75);
        assert_eq!(entry.validated_count, 3);
        assert_eq!(entry.total_count, 4);
    }
}
