//! Weighted readiness scoring
//!
//! A figure's readiness for a learner is the weighted share of its required
//! prerequisites the learner has mastered. A prerequisite is mastered when
//! every step of the child figure is `valide`.

use std::collections::HashSet;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::progressions;
use crate::error::ProgressionError;
use crate::graph::{FigureNode, PrerequisiteGraph};

/// Round `numerator / denominator` to the nearest integer, halves up.
/// `denominator` must be non-zero.
pub fn round_half_up(numerator: u64, denominator: u64) -> u64 {
    (2 * numerator + denominator) / (2 * denominator)
}

/// Integer percentage of `part` over `whole`, 0 when `whole` is 0
pub fn percentage(part: u64, whole: u64) -> u8 {
    if whole == 0 {
        return 0;
    }
    round_half_up(100 * part.min(whole), whole) as u8
}

// ============================================================================
// Learner Progress
// ============================================================================

/// Snapshot of the steps one learner has validated
#[derive(Debug, Clone, Default)]
pub struct LearnerProgress {
    validated: HashSet<String>,
}

impl LearnerProgress {
    pub fn new(validated: HashSet<String>) -> Self {
        Self { validated }
    }

    pub fn load(conn: &mut SqliteConnection, learner_id: &str) -> Result<Self, ProgressionError> {
        Ok(Self::new(progressions::validated_step_ids(conn, learner_id)?))
    }

    pub fn is_validated(&self, step_id: &str) -> bool {
        self.validated.contains(step_id)
    }

    pub fn steps_validated(&self, node: &FigureNode) -> usize {
        node.step_ids.iter().filter(|id| self.is_validated(id)).count()
    }

    /// Every step of the figure is `valide`; a figure without steps is never mastered
    pub fn has_mastered(&self, node: &FigureNode) -> bool {
        !node.step_ids.is_empty() && self.steps_validated(node) == node.step_ids.len()
    }
}

// ============================================================================
// Scores
// ============================================================================

/// State of one required prerequisite in a readiness breakdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "progression/")]
pub struct PrerequisiteReadiness {
    pub figure_id: String,
    pub weight: u32,
    pub validated: bool,
    pub steps_validated: u32,
    pub steps_total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "progression/")]
pub struct ReadinessScore {
    pub figure_id: String,
    /// 0..=100
    pub score: u8,
    pub validated_count: u32,
    pub total_count: u32,
    /// Required prerequisites in defined order
    pub breakdown: Vec<PrerequisiteReadiness>,
}

/// Score the figure at arena slot `idx`
pub fn score_node(graph: &PrerequisiteGraph, idx: usize, progress: &LearnerProgress) -> ReadinessScore {
    let mut breakdown = Vec::new();
    let mut weight_total: u64 = 0;
    let mut weight_validated: u64 = 0;

    for edge in graph.required_prerequisites(idx) {
        let child = graph.node(edge.child);
        let validated = progress.has_mastered(child);

        weight_total += u64::from(edge.weight);
        if validated {
            weight_validated += u64::from(edge.weight);
        }

        breakdown.push(PrerequisiteReadiness {
            figure_id: child.id.clone(),
            weight: edge.weight,
            validated,
            steps_validated: progress.steps_validated(child) as u32,
            steps_total: child.step_ids.len() as u32,
        });
    }

    ReadinessScore {
        figure_id: graph.node(idx).id.clone(),
        score: percentage(weight_validated, weight_total),
        validated_count: breakdown.iter().filter(|b| b.validated).count() as u32,
        total_count: breakdown.len() as u32,
        breakdown,
    }
}

/// Score a figure by ID
pub fn score_figure(
    graph: &PrerequisiteGraph,
    figure_id: &str,
    progress: &LearnerProgress,
) -> Result<ReadinessScore, ProgressionError> {
    let idx = graph
        .index_of(figure_id)
        .ok_or_else(|| ProgressionError::NotFound(format!("figure '{}'", figure_id)))?;
    Ok(score_node(graph, idx, progress))
}
