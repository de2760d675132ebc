//! In-memory prerequisite graph
//!
//! Figures live in one indexed table (arena); edges are an explicit collection
//! of (parent, child) index pairs. Node indices follow catalog order, so a
//! node index doubles as the stable tie-break key when ranking figures.

use std::collections::HashMap;

use diesel::prelude::*;
use serde::Serialize;

use crate::db::models::{Figure, Prerequisite, Step};
use crate::db::{catalog, prerequisites};
use crate::error::ProgressionError;

/// Figure node with its step IDs in curriculum order
#[derive(Debug, Clone, Serialize)]
pub struct FigureNode {
    pub id: String,
    pub catalog_order: i32,
    pub step_ids: Vec<String>,
}

/// Edge between two arena slots: `child` is a prerequisite of `parent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub parent: usize,
    pub child: usize,
    pub weight: u32,
    pub required: bool,
    pub sort_order: i32,
}

#[derive(Debug, Default)]
pub struct PrerequisiteGraph {
    nodes: Vec<FigureNode>,
    index: HashMap<String, usize>,
    edges: Vec<Edge>,
    /// Edge indices leaving each node, in defined prerequisite order
    outgoing: Vec<Vec<usize>>,
}

impl PrerequisiteGraph {
    /// Build from catalog rows and edges
    pub fn from_parts(
        mut figures: Vec<Figure>,
        steps: Vec<Step>,
        edges: Vec<Prerequisite>,
    ) -> Result<Self, ProgressionError> {
        figures.sort_by(|a, b| a.catalog_order.cmp(&b.catalog_order).then_with(|| a.id.cmp(&b.id)));

        let mut graph = Self::default();
        for figure in figures {
            graph.index.insert(figure.id.clone(), graph.nodes.len());
            graph.nodes.push(FigureNode {
                id: figure.id,
                catalog_order: figure.catalog_order,
                step_ids: Vec::new(),
            });
            graph.outgoing.push(Vec::new());
        }

        let mut steps = steps;
        steps.sort_by(|a, b| a.figure_id.cmp(&b.figure_id).then(a.step_order.cmp(&b.step_order)));
        for step in steps {
            let slot = graph.slot(&step.figure_id)?;
            graph.nodes[slot].step_ids.push(step.id);
        }

        for edge in edges {
            let weight = u32::try_from(edge.weight).map_err(|_| {
                ProgressionError::Internal(format!("Negative prerequisite weight: {}", edge.weight))
            })?;
            graph.push_edge(Edge {
                parent: graph.slot(&edge.figure_id)?,
                child: graph.slot(&edge.prerequisite_id)?,
                weight,
                required: edge.required(),
                sort_order: edge.sort_order,
            });
        }

        Ok(graph)
    }

    /// Load the whole catalog graph; call inside a transaction for a snapshot
    pub fn load(conn: &mut SqliteConnection) -> Result<Self, ProgressionError> {
        Self::from_parts(
            catalog::list_figures(conn)?,
            catalog::list_steps(conn)?,
            prerequisites::list_all(conn)?,
        )
    }

    fn slot(&self, id: &str) -> Result<usize, ProgressionError> {
        self.index
            .get(id)
            .copied()
            .ok_or_else(|| ProgressionError::Internal(format!("Edge or step references unknown figure '{}'", id)))
    }

    fn push_edge(&mut self, edge: Edge) {
        let edge_idx = self.edges.len();
        self.edges.push(edge);

        let edges = &self.edges;
        let nodes = &self.nodes;
        let out = &mut self.outgoing[edge.parent];
        out.push(edge_idx);
        out.sort_by(|&a, &b| {
            let (ea, eb) = (&edges[a], &edges[b]);
            ea.sort_order
                .cmp(&eb.sort_order)
                .then_with(|| nodes[ea.child].id.cmp(&nodes[eb.child].id))
        });
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node(&self, idx: usize) -> &FigureNode {
        &self.nodes[idx]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Outgoing edges of a node in defined order
    pub fn prerequisites(&self, idx: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.outgoing[idx].iter().map(move |&e| &self.edges[e])
    }

    /// Required outgoing edges of a node in defined order
    pub fn required_prerequisites(&self, idx: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.prerequisites(idx).filter(|edge| edge.required)
    }

    pub fn has_required_prerequisites(&self, idx: usize) -> bool {
        self.required_prerequisites(idx).next().is_some()
    }

    // ========================================================================
    // Cycle detection
    // ========================================================================

    /// Reject an edge (figure → prerequisite) that is a self-loop or closes a cycle
    pub fn check_new_edge(&self, figure_id: &str, prerequisite_id: &str) -> Result<(), ProgressionError> {
        if self.would_create_cycle(figure_id, prerequisite_id) {
            return Err(ProgressionError::Cycle {
                figure: figure_id.to_string(),
                prerequisite: prerequisite_id.to_string(),
            });
        }
        Ok(())
    }

    /// True if `figure == prerequisite` or `figure` is already reachable from
    /// `prerequisite` through existing edges.
    pub fn would_create_cycle(&self, figure_id: &str, prerequisite_id: &str) -> bool {
        if figure_id == prerequisite_id {
            return true;
        }
        match (self.index_of(figure_id), self.index_of(prerequisite_id)) {
            (Some(figure), Some(start)) => self.reaches(start, figure),
            // An unknown node has no edges, so no path can exist through it
            _ => false,
        }
    }

    /// Iterative DFS from `start`; each node is expanded at most once
    fn reaches(&self, start: usize, target: usize) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            if current == target {
                return true;
            }
            if std::mem::replace(&mut visited[current], true) {
                continue;
            }
            stack.extend(
                self.prerequisites(current)
                    .map(|edge| edge.child)
                    .filter(|&child| !visited[child]),
            );
        }

        false
    }
}
