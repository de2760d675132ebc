//! Catalog reads (figures, step templates) and import helpers
//!
//! The catalog is owned by an external collaborator; the engine only reads it.
//! The insert helpers exist so that collaborator (or tests) can populate it.

use diesel::prelude::*;
use serde::Deserialize;

use super::diesel_schema::{figures, steps};
use super::models::{Figure, NewFigure, NewStep, Step};
use crate::error::ProgressionError;

// ============================================================================
// Query Types
// ============================================================================

/// Input for importing a figure
#[derive(Debug, Clone, Deserialize)]
pub struct ImportFigureInput {
    pub id: String,
    pub discipline_id: String,
    pub name: String,
    #[serde(default = "default_difficulty")]
    pub difficulty: i32,
    #[serde(default)]
    pub catalog_order: i32,
}

fn default_difficulty() -> i32 { 1 }

/// Input for importing a step template
#[derive(Debug, Clone, Deserialize)]
pub struct ImportStepInput {
    pub id: String,
    pub figure_id: String,
    pub step_order: i32,
    pub title: String,
    #[serde(default)]
    pub xp: i32,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Get figure by ID
pub fn get_figure(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Figure>, ProgressionError> {
    figures::table
        .filter(figures::id.eq(id))
        .select(Figure::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Get figure by ID, failing with `NotFound`
pub fn require_figure(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Figure, ProgressionError> {
    get_figure(conn, id)?
        .ok_or_else(|| ProgressionError::NotFound(format!("figure '{}'", id)))
}

/// All figures in catalog order
pub fn list_figures(conn: &mut SqliteConnection) -> Result<Vec<Figure>, ProgressionError> {
    figures::table
        .order((figures::catalog_order.asc(), figures::id.asc()))
        .select(Figure::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Get step by ID
pub fn get_step(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Step>, ProgressionError> {
    steps::table
        .filter(steps::id.eq(id))
        .select(Step::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Steps of one figure in curriculum order
pub fn steps_for_figure(
    conn: &mut SqliteConnection,
    figure_id: &str,
) -> Result<Vec<Step>, ProgressionError> {
    steps::table
        .filter(steps::figure_id.eq(figure_id))
        .order(steps::step_order.asc())
        .select(Step::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Every step in the catalog, grouped by figure then curriculum order
pub fn list_steps(conn: &mut SqliteConnection) -> Result<Vec<Step>, ProgressionError> {
    steps::table
        .order((steps::figure_id.asc(), steps::step_order.asc()))
        .select(Step::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

// ============================================================================
// Import Operations
// ============================================================================

/// Insert a figure
pub fn insert_figure(
    conn: &mut SqliteConnection,
    input: &ImportFigureInput,
) -> Result<Figure, ProgressionError> {
    let new_figure = NewFigure {
        id: &input.id,
        discipline_id: &input.discipline_id,
        name: &input.name,
        difficulty: input.difficulty,
        catalog_order: input.catalog_order,
    };

    diesel::insert_into(figures::table)
        .values(&new_figure)
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("figure '{}'", input.id)))?;

    require_figure(conn, &input.id)
}

/// Insert a step template
pub fn insert_step(
    conn: &mut SqliteConnection,
    input: &ImportStepInput,
) -> Result<Step, ProgressionError> {
    let new_step = NewStep {
        id: &input.id,
        figure_id: &input.figure_id,
        step_order: input.step_order,
        title: &input.title,
        xp: input.xp,
    };

    diesel::insert_into(steps::table)
        .values(&new_step)
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("step '{}'", input.id)))?;

    get_step(conn, &input.id)?
        .ok_or_else(|| ProgressionError::Internal("Failed to retrieve created step".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{add_figure, setup_test_db};

    #[test]
    fn test_figures_listed_in_catalog_order() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "rondade", 3, 1);
        add_figure(&mut conn, "atr", 1, 1);
        add_figure(&mut conn, "roulade", 2, 1);

        let ids: Vec<String> = list_figures(&mut conn).unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(ids, vec!["atr", "roulade", "rondade"]);
    }

    #[test]
    fn test_steps_ordered() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 3);

        let steps = steps_for_figure(&mut conn, "atr").unwrap();
        let orders: Vec<i32> = steps.iter().map(|s| s.step_order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
    }

    #[test]
    fn test_duplicate_figure_is_conflict() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 0);

        let err = insert_figure(&mut conn, &ImportFigureInput {
            id: "atr".into(),
            discipline_id: "acrobatie".into(),
            name: "ATR".into(),
            difficulty: 2,
            catalog_order: 1,
        })
        .unwrap_err();
        assert!(matches!(err, ProgressionError::Conflict(_)));
    }

    #[test]
    fn test_step_for_unknown_figure_rejected() {
        let mut conn = setup_test_db();

        let err = insert_step(&mut conn, &ImportStepInput {
            id: "ghost-1".into(),
            figure_id: "ghost".into(),
            step_order: 1,
            title: "Ghost".into(),
            xp: 5,
        })
        .unwrap_err();
        assert!(matches!(err, ProgressionError::NotFound(_)));
    }

    #[test]
    fn test_require_missing_figure() {
        let mut conn = setup_test_db();
        assert!(matches!(
            require_figure(&mut conn, "nope"),
            Err(ProgressionError::NotFound(_))
        ));
    }
}
