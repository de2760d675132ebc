//! Graph service - guarded edits of the prerequisite graph
//!
//! Writers are serialized twice: an in-process mutex orders them within this
//! process, and `BEGIN IMMEDIATE` holds the SQLite write lock from the cycle
//! check until the insert commits.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::db::models::Prerequisite;
use crate::db::prerequisites::{self, CreatePrerequisiteInput};
use crate::db::{catalog, Database};
use crate::error::ProgressionError;
use crate::graph::PrerequisiteGraph;

use super::events::{EngineEvent, EventBus};

pub struct GraphService {
    db: Arc<Database>,
    events: Arc<EventBus>,
    write_lock: Mutex<()>,
}

impl GraphService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>) -> Self {
        Self {
            db,
            events,
            write_lock: Mutex::new(()),
        }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Prerequisites of a figure in their defined order
    pub fn list_prerequisites(&self, figure_id: &str) -> Result<Vec<Prerequisite>, ProgressionError> {
        self.db.transaction(|conn| {
            catalog::require_figure(conn, figure_id)?;
            prerequisites::list_for_figure(conn, figure_id, false)
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Add an edge after validating weight, endpoints, uniqueness and acyclicity
    pub fn add_prerequisite(&self, input: CreatePrerequisiteInput) -> Result<Prerequisite, ProgressionError> {
        if input.weight <= 0 {
            return Err(ProgressionError::Validation(format!(
                "weight must be positive, got {}",
                input.weight
            )));
        }

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ProgressionError::Internal("graph write lock poisoned".into()))?;

        let edge = self.db.immediate_transaction(|conn| {
            catalog::require_figure(conn, &input.figure_id)?;
            catalog::require_figure(conn, &input.prerequisite_id)?;

            if prerequisites::get_edge(conn, &input.figure_id, &input.prerequisite_id)?.is_some() {
                return Err(ProgressionError::Conflict(format!(
                    "prerequisite '{}' → '{}' already exists",
                    input.figure_id, input.prerequisite_id
                )));
            }

            let graph = PrerequisiteGraph::load(conn)?;
            if let Err(e) = graph.check_new_edge(&input.figure_id, &input.prerequisite_id) {
                warn!(figure = %input.figure_id, prerequisite = %input.prerequisite_id, "Rejected cyclic prerequisite");
                return Err(e);
            }

            prerequisites::insert_edge(conn, &input)
        })?;

        info!(
            figure = %edge.figure_id,
            prerequisite = %edge.prerequisite_id,
            weight = edge.weight,
            required = edge.required(),
            "Prerequisite added"
        );
        self.events.emit(EngineEvent::PrerequisiteAdded {
            figure_id: edge.figure_id.clone(),
            prerequisite_id: edge.prerequisite_id.clone(),
            weight: edge.weight as u32,
        });

        Ok(edge)
    }

    /// Remove an edge; removal cannot introduce a cycle
    pub fn remove_prerequisite(&self, figure_id: &str, prerequisite_id: &str) -> Result<(), ProgressionError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ProgressionError::Internal("graph write lock poisoned".into()))?;

        self.db
            .immediate_transaction(|conn| prerequisites::delete_edge(conn, figure_id, prerequisite_id))?;

        info!(figure = %figure_id, prerequisite = %prerequisite_id, "Prerequisite removed");
        self.events.emit(EngineEvent::PrerequisiteRemoved {
            figure_id: figure_id.to_string(),
            prerequisite_id: prerequisite_id.to_string(),
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::ImportFigureInput;

    fn service_with(figures: &[&str]) -> GraphService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(|conn| {
            for (i, id) in figures.iter().enumerate() {
                catalog::insert_figure(conn, &ImportFigureInput {
                    id: id.to_string(),
                    discipline_id: "acrobatie".into(),
                    name: id.to_string(),
                    difficulty: 1,
                    catalog_order: i as i32,
                })?;
            }
            Ok(())
        })
        .unwrap();
        GraphService::new(db, Arc::new(EventBus::new()))
    }

    fn input(figure: &str, prerequisite: &str, weight: i32) -> CreatePrerequisiteInput {
        CreatePrerequisiteInput {
            figure_id: figure.into(),
            prerequisite_id: prerequisite.into(),
            weight,
            required: true,
            sort_order: 0,
        }
    }

    #[test]
    fn test_chain_cycle_rejected_sibling_accepted() {
        let service = service_with(&["a", "b", "c", "d"]);
        service.add_prerequisite(input("a", "b", 1)).unwrap();
        service.add_prerequisite(input("b", "c", 1)).unwrap();

        let err = service.add_prerequisite(input("c", "a", 1)).unwrap_err();
        assert_eq!(err.kind(), "cycle");
        assert!(service.list_prerequisites("c").unwrap().is_empty());

        service.add_prerequisite(input("d", "b", 1)).unwrap();
        assert_eq!(service.list_prerequisites("d").unwrap().len(), 1);
    }

    #[test]
    fn test_edge_guards_in_order() {
        let service = service_with(&["a", "b"]);

        assert!(matches!(service.add_prerequisite(input("a", "b", 0)), Err(ProgressionError::Validation(_))));
        assert!(matches!(service.add_prerequisite(input("a", "x", 1)), Err(ProgressionError::NotFound(_))));
        assert!(matches!(service.add_prerequisite(input("a", "a", 1)), Err(ProgressionError::Cycle { .. })));

        service.add_prerequisite(input("a", "b", 2)).unwrap();
        assert!(matches!(service.add_prerequisite(input("a", "b", 2)), Err(ProgressionError::Conflict(_))));
    }

    #[test]
    fn test_remove_edge() {
        let service = service_with(&["a", "b"]);
        service.add_prerequisite(input("a", "b", 1)).unwrap();

        service.remove_prerequisite("a", "b").unwrap();
        assert!(matches!(service.remove_prerequisite("a", "b"), Err(ProgressionError::NotFound(_))));

        // Reverse direction is legal once the edge is gone
        service.add_prerequisite(input("b", "a", 1)).unwrap();
        let listed = service.list_prerequisites("b").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].prerequisite_id, "a");
        assert!(service.list_prerequisites("a").unwrap().is_empty());
    }

    #[test]
    fn test_list_unknown_figure() {
        let service = service_with(&["a"]);
        assert!(matches!(service.list_prerequisites("zzz"), Err(ProgressionError::NotFound(_))));
    }
}
