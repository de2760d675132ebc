//! Progression store: one status row per (learner, step)
//!
//! Rows are created in bulk at enrollment and afterwards only updated by the
//! attempt recorder. They are never deleted.

use std::collections::HashSet;

use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::catalog;
use super::diesel_schema::{progressions, steps};
use super::models::{current_timestamp, NewProgression, Progression, ProgressionStatus};
use crate::error::ProgressionError;
use crate::progression::Transition;

/// Result of enrolling a learner in a figure
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentResult {
    pub learner_id: String,
    pub figure_id: String,
    pub created: Vec<Progression>,
}

// ============================================================================
// Read Operations
// ============================================================================

pub fn get_progression(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Progression>, ProgressionError> {
    progressions::table
        .filter(progressions::id.eq(id))
        .select(Progression::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Progression of one learner on one step
pub fn find_for_step(
    conn: &mut SqliteConnection,
    learner_id: &str,
    step_id: &str,
) -> Result<Option<Progression>, ProgressionError> {
    progressions::table
        .filter(progressions::learner_id.eq(learner_id))
        .filter(progressions::step_id.eq(step_id))
        .select(Progression::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Progressions of a learner on the steps of one figure, in step order
pub fn list_for_figure(
    conn: &mut SqliteConnection,
    learner_id: &str,
    figure_id: &str,
) -> Result<Vec<Progression>, ProgressionError> {
    progressions::table
        .inner_join(steps::table)
        .filter(progressions::learner_id.eq(learner_id))
        .filter(steps::figure_id.eq(figure_id))
        .order(steps::step_order.asc())
        .select(Progression::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Step IDs this learner has validated
pub fn validated_step_ids(
    conn: &mut SqliteConnection,
    learner_id: &str,
) -> Result<HashSet<String>, ProgressionError> {
    let ids: Vec<String> = progressions::table
        .filter(progressions::learner_id.eq(learner_id))
        .filter(progressions::status.eq(ProgressionStatus::Valide.as_str()))
        .select(progressions::step_id)
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))?;

    Ok(ids.into_iter().collect())
}

/// Learners holding at least one progression row
pub fn enrolled_learner_ids(conn: &mut SqliteConnection) -> Result<Vec<String>, ProgressionError> {
    progressions::table
        .select(progressions::learner_id)
        .distinct()
        .order(progressions::learner_id.asc())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Create `non_commence` rows for every step of a figure.
///
/// Runs in its own transaction: any pre-existing row for one of the steps
/// fails the whole enrollment with `Conflict`.
pub fn enroll(
    conn: &mut SqliteConnection,
    learner_id: &str,
    figure_id: &str,
) -> Result<EnrollmentResult, ProgressionError> {
    conn.transaction(|conn| {
        catalog::require_figure(conn, figure_id)?;
        let steps = catalog::steps_for_figure(conn, figure_id)?;
        let now = current_timestamp();

        let mut created = Vec::with_capacity(steps.len());
        for step in &steps {
            let id = Uuid::new_v4().to_string();
            let new_progression = NewProgression {
                id: &id,
                learner_id,
                step_id: &step.id,
                status: ProgressionStatus::NonCommence.as_str(),
                created_at: &now,
                updated_at: &now,
            };

            diesel::insert_into(progressions::table)
                .values(&new_progression)
                .execute(conn)
                .map_err(|e| {
                    ProgressionError::from_insert(
                        e,
                        format!("progression of '{}' on step '{}'", learner_id, step.id),
                    )
                })?;

            created.push(get_progression(conn, &id)?.ok_or_else(|| {
                ProgressionError::Internal("Failed to retrieve created progression".into())
            })?);
        }

        Ok(EnrollmentResult {
            learner_id: learner_id.to_string(),
            figure_id: figure_id.to_string(),
            created,
        })
    })
}

/// Persist a status transition. A successful attempt re-stamps validation
/// time and validator even when the step was already `valide`.
pub fn apply_transition(
    conn: &mut SqliteConnection,
    progression: &Progression,
    transition: Transition,
    validator_id: Option<&str>,
) -> Result<Progression, ProgressionError> {
    if transition.needs_write() {
        let now = current_timestamp();
        let target = progressions::table.filter(progressions::id.eq(&progression.id));

        let updated = if transition.stamps_validation() {
            diesel::update(target)
                .set((
                    progressions::status.eq(transition.to.as_str()),
                    progressions::validated_at.eq(now.as_str()),
                    progressions::validated_by.eq(validator_id),
                    progressions::updated_at.eq(&now),
                ))
                .execute(conn)
        } else {
            diesel::update(target)
                .set((
                    progressions::status.eq(transition.to.as_str()),
                    progressions::updated_at.eq(&now),
                ))
                .execute(conn)
        };
        updated.map_err(|e| ProgressionError::Database(format!("Update failed: {}", e)))?;
    }

    get_progression(conn, &progression.id)?
        .ok_or_else(|| ProgressionError::Internal("Failed to retrieve updated progression".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{add_figure, setup_test_db};
    use crate::progression::advance;

    #[test]
    fn test_enroll_creates_rows_per_step() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 3);

        let result = enroll(&mut conn, "alice", "atr").unwrap();
        assert_eq!(result.created.len(), 3);
        assert!(result.created.iter().all(|p| p.status == "non_commence"));

        let listed = list_for_figure(&mut conn, "alice", "atr").unwrap();
        let step_ids: Vec<&str> = listed.iter().map(|p| p.step_id.as_str()).collect();
        assert_eq!(step_ids, vec!["atr-1", "atr-2", "atr-3"]);
    }

    #[test]
    fn test_double_enroll_conflicts_and_rolls_back() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 2);

        enroll(&mut conn, "alice", "atr").unwrap();
        let err = enroll(&mut conn, "alice", "atr").unwrap_err();
        assert!(matches!(err, ProgressionError::Conflict(_)));
        assert_eq!(list_for_figure(&mut conn, "alice", "atr").unwrap().len(), 2);
    }

    #[test]
    fn test_enroll_unknown_figure() {
        let mut conn = setup_test_db();
        assert!(matches!(
            enroll(&mut conn, "alice", "ghost"),
            Err(ProgressionError::NotFound(_))
        ));
    }

    #[test]
    fn test_apply_transition_restamps_on_success() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 1);
        enroll(&mut conn, "alice", "atr").unwrap();

        let row = find_for_step(&mut conn, "alice", "atr-1").unwrap().unwrap();
        let validated = apply_transition(
            &mut conn,
            &row,
            advance(ProgressionStatus::NonCommence, true),
            Some("coach-1"),
        )
        .unwrap();
        assert_eq!(validated.status, "valide");
        assert_eq!(validated.validated_by.as_deref(), Some("coach-1"));
        let stamped_at = validated.validated_at.clone();
        assert!(stamped_at.is_some());

        let again = apply_transition(
            &mut conn,
            &validated,
            advance(ProgressionStatus::Valide, true),
            Some("coach-2"),
        )
        .unwrap();
        assert_eq!(again.status, "valide");
        assert_eq!(again.validated_by.as_deref(), Some("coach-2"));
        assert!(again.validated_at >= stamped_at);

        // A failure on a validated step leaves status and stamps alone
        let failed = apply_transition(
            &mut conn,
            &again,
            advance(ProgressionStatus::Valide, false),
            Some("coach-3"),
        )
        .unwrap();
        assert_eq!(failed.status, "valide");
        assert_eq!(failed.validated_by.as_deref(), Some("coach-2"));
        assert_eq!(failed.updated_at, again.updated_at);

        let ids = validated_step_ids(&mut conn, "alice").unwrap();
        assert!(ids.contains("atr-1"));
        assert_eq!(enrolled_learner_ids(&mut conn).unwrap(), vec!["alice"]);
    }
}
