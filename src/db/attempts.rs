//! Append-only attempt log

use diesel::prelude::*;
use uuid::Uuid;

use super::diesel_schema::attempts;
use super::models::{current_timestamp, Attempt, NewAttempt};
use crate::error::ProgressionError;
use crate::progression::AttemptPayload;

pub fn get_attempt(
    conn: &mut SqliteConnection,
    id: &str,
) -> Result<Option<Attempt>, ProgressionError> {
    attempts::table
        .filter(attempts::id.eq(id))
        .select(Attempt::as_select())
        .first(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Attempts on one progression, newest first
pub fn list_for_progression(
    conn: &mut SqliteConnection,
    progression_id: &str,
    limit: i64,
) -> Result<Vec<Attempt>, ProgressionError> {
    attempts::table
        .filter(attempts::progression_id.eq(progression_id))
        .order((attempts::created_at.desc(), attempts::id.desc()))
        .limit(limit)
        .select(Attempt::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Persist one attempt with its derived success flag
pub fn insert_attempt(
    conn: &mut SqliteConnection,
    progression_id: &str,
    payload: &AttemptPayload,
) -> Result<Attempt, ProgressionError> {
    let id = Uuid::new_v4().to_string();
    let now = current_timestamp();
    let (success_flag, score, duration_secs) = payload.columns();

    let new_attempt = NewAttempt {
        id: &id,
        progression_id,
        mode: payload.mode().as_str(),
        success_flag,
        score,
        duration_secs,
        is_success: if payload.is_success() { 1 } else { 0 },
        created_at: &now,
    };

    diesel::insert_into(attempts::table)
        .values(&new_attempt)
        .execute(conn)
        .map_err(|e| ProgressionError::from_insert(e, format!("attempt on '{}'", progression_id)))?;

    get_attempt(conn, &id)?
        .ok_or_else(|| ProgressionError::Internal("Failed to retrieve created attempt".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::progressions;
    use crate::db::test_support::{add_figure, setup_test_db};

    #[test]
    fn test_insert_and_reload_payload() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 1);
        let enrollment = progressions::enroll(&mut conn, "alice", "atr").unwrap();
        let progression_id = &enrollment.created[0].id;

        let payload = AttemptPayload::EvaluationDuree { score: 1, duration_secs: 40 };
        let stored = insert_attempt(&mut conn, progression_id, &payload).unwrap();
        assert_eq!(stored.mode, "evaluation_duree");
        assert!(!stored.succeeded());
        assert_eq!(AttemptPayload::from_stored(&stored).unwrap(), payload);

        insert_attempt(&mut conn, progression_id, &AttemptPayload::Duree { duration_secs: 3 }).unwrap();
        assert_eq!(list_for_progression(&mut conn, progression_id, 10).unwrap().len(), 2);
        assert_eq!(list_for_progression(&mut conn, progression_id, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_attempt_needs_existing_progression() {
        let mut conn = setup_test_db();
        let err = insert_attempt(&mut conn, "missing", &AttemptPayload::Binaire { success: true })
            .unwrap_err();
        assert!(matches!(err, ProgressionError::NotFound(_)));
    }
}
