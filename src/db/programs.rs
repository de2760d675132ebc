//! Learner plans (programs) and their assignment
//!
//! Plans belong to the program/assignment collaborator. The engine reads the
//! figures already assigned to a learner and, when a suggestion is accepted,
//! appends to the learner's personal plan.

use std::collections::HashSet;

use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::diesel_schema::{learner_programs, program_figures, programs};
use super::models::{
    current_timestamp, NewLearnerProgram, NewProgram, NewProgramFigure, Program, ProgramFigure,
};
use crate::error::ProgressionError;

/// Name given to auto-created personal plans
pub const PERSONAL_PROGRAM_NAME: &str = "Mon programme";

/// Outcome of appending a figure to a plan
#[derive(Debug, Clone, Serialize)]
pub struct AppendResult {
    pub entry: ProgramFigure,
    /// false when the figure was already in the plan
    pub appended: bool,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_program(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Program>, ProgressionError> {
    programs::table
        .filter(programs::id.eq(id))
        .select(Program::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Personal plan owned by a learner, if one exists
pub fn find_personal_program(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> Result<Option<Program>, ProgressionError> {
    programs::table
        .filter(programs::owner_id.eq(learner_id))
        .filter(programs::is_personal.eq(1))
        .select(Program::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Figures of a plan in plan order
pub fn list_program_figures(
    conn: &mut SqliteConnection,
    program_id: &str,
) -> Result<Vec<ProgramFigure>, ProgressionError> {
    program_figures::table
        .filter(program_figures::program_id.eq(program_id))
        .order(program_figures::position.asc())
        .select(ProgramFigure::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Every figure present in any plan assigned to the learner
pub fn assigned_figure_ids(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> Result<HashSet<String>, ProgressionError> {
    let assigned_programs = learner_programs::table
        .filter(learner_programs::learner_id.eq(learner_id))
        .select(learner_programs::program_id);

    let ids: Vec<String> = program_figures::table
        .filter(program_figures::program_id.eq_any(assigned_programs))
        .select(program_figures::figure_id)
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))?;

    Ok(ids.into_iter().collect())
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create a plan (collaborator-side import)
pub fn create_program(
    conn: &mut SqliteConnection,
    name: &str,
    owner_id: Option<&str>,
    personal: bool,
) -> Result<Program, ProgressionError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();

    diesel::insert_into(programs::table)
        .values(&NewProgram {
            id: &id,
            name,
            owner_id,
            is_personal: if personal { 1 } else { 0 },
            created_at: &now,
        })
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("program '{}'", name)))?;

    get_program(conn, &id)?
        .ok_or_else(|| ProgressionError::Internal("Failed to retrieve created program".into()))
}

/// Assign a plan to a learner; assigning twice is a no-op
pub fn assign_program(
    conn: &mut SqliteConnection,
    program_id: &str,
    learner_id: &str,
) -> Result<(), ProgressionError> {
    diesel::insert_into(learner_programs::table)
        .values(&NewLearnerProgram { program_id, learner_id })
        .on_conflict_do_nothing()
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("assignment of '{}'", program_id)))?;
    Ok(())
}

/// Return the learner's personal plan, creating and assigning it if absent
pub fn ensure_personal_program(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> Result<Program, ProgressionError> {
    if let Some(existing) = find_personal_program(conn, learner_id)? {
        return Ok(existing);
    }

    let program = create_program(conn, PERSONAL_PROGRAM_NAME, Some(learner_id), true)?;
    assign_program(conn, &program.id, learner_id)?;
    Ok(program)
}

/// Append a figure at the next position unless it is already in the plan
pub fn append_figure(
    conn: &mut SqliteConnection,
    program_id: &str,
    figure_id: &str,
) -> Result<AppendResult, ProgressionError> {
    let existing: Option<ProgramFigure> = program_figures::table
        .filter(program_figures::program_id.eq(program_id))
        .filter(program_figures::figure_id.eq(figure_id))
        .select(ProgramFigure::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))?;

    if let Some(entry) = existing {
        return Ok(AppendResult { entry, appended: false });
    }

    let last: Option<i32> = program_figures::table
        .filter(program_figures::program_id.eq(program_id))
        .select(diesel::dsl::max(program_figures::position))
        .first(conn)
        .map_err(|e| ProgressionError::Database(format!("Max query failed: {}", e)))?;

    let now = current_timestamp();
    let position = last.map_or(1, |p| p + 1);

    diesel::insert_into(program_figures::table)
        .values(&NewProgramFigure {
            program_id,
            figure_id,
            position,
            added_at: &now,
        })
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("figure '{}' in plan", figure_id)))?;

    Ok(AppendResult {
        entry: ProgramFigure {
            program_id: program_id.to_string(),
            figure_id: figure_id.to_string(),
            position,
            added_at: now,
        },
        appended: true,
    })
}
