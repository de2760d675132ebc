//! Prerequisite edge storage
//!
//! An edge (figure → prerequisite) states that `prerequisite_id` is a building
//! block of `figure_id`. Edges are keyed by the pair; figures are never
//! embedded in each other. Cycle checks live in `graph` and run before
//! `insert_edge` is called.

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::prerequisites;
use super::models::{current_timestamp, NewPrerequisite, Prerequisite};
use crate::error::ProgressionError;

/// Input for creating an edge
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePrerequisiteInput {
    pub figure_id: String,
    pub prerequisite_id: String,
    #[serde(default = "default_weight")]
    pub weight: i32,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub sort_order: i32,
}

fn default_weight() -> i32 { 1 }
fn default_required() -> bool { true }

/// Get one edge by its (figure, prerequisite) key
pub fn get_edge(
    conn: &mut SqliteConnection,
    figure_id: &str,
    prerequisite_id: &str,
) -> Result<Option<Prerequisite>, ProgressionError> {
    prerequisites::table
        .filter(prerequisites::figure_id.eq(figure_id))
        .filter(prerequisites::prerequisite_id.eq(prerequisite_id))
        .select(Prerequisite::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Prerequisites of a figure in their defined order
pub fn list_for_figure(
    conn: &mut SqliteConnection,
    figure_id: &str,
    required_only: bool,
) -> Result<Vec<Prerequisite>, ProgressionError> {
    let mut query = prerequisites::table
        .filter(prerequisites::figure_id.eq(figure_id))
        .into_boxed();

    if required_only {
        query = query.filter(prerequisites::is_required.eq(1));
    }

    query
        .order((prerequisites::sort_order.asc(), prerequisites::prerequisite_id.asc()))
        .select(Prerequisite::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Every edge of the graph
pub fn list_all(conn: &mut SqliteConnection) -> Result<Vec<Prerequisite>, ProgressionError> {
    prerequisites::table
        .order((
            prerequisites::figure_id.asc(),
            prerequisites::sort_order.asc(),
            prerequisites::prerequisite_id.asc(),
        ))
        .select(Prerequisite::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Insert an edge; a duplicate (figure, prerequisite) pair is a `Conflict`
pub fn insert_edge(
    conn: &mut SqliteConnection,
    input: &CreatePrerequisiteInput,
) -> Result<Prerequisite, ProgressionError> {
    let now = current_timestamp();
    let new_edge = NewPrerequisite {
        figure_id: &input.figure_id,
        prerequisite_id: &input.prerequisite_id,
        weight: input.weight,
        is_required: if input.required { 1 } else { 0 },
        sort_order: input.sort_order,
        created_at: &now,
    };

    diesel::insert_into(prerequisites::table)
        .values(&new_edge)
        .execute(conn)
        .map_err(|e| {
            ProgressionError::from_insert(
                e,
                format!("prerequisite '{}' → '{}'", input.figure_id, input.prerequisite_id),
            )
        })?;

    get_edge(conn, &input.figure_id, &input.prerequisite_id)?
        .ok_or_else(|| ProgressionError::Internal("Failed to retrieve created prerequisite".into()))
}

/// Delete an edge; `NotFound` when absent
pub fn delete_edge(
    conn: &mut SqliteConnection,
    figure_id: &str,
    prerequisite_id: &str,
) -> Result<(), ProgressionError> {
    let deleted = diesel::delete(
        prerequisites::table
            .filter(prerequisites::figure_id.eq(figure_id))
            .filter(prerequisites::prerequisite_id.eq(prerequisite_id)),
    )
    .execute(conn)
    .map_err(|e| ProgressionError::Database(format!("Delete failed: {}", e)))?;

    if deleted == 0 {
        return Err(ProgressionError::NotFound(format!(
            "prerequisite '{}' → '{}'",
            figure_id, prerequisite_id
        )));
    }
    Ok(())
}
