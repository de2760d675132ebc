//! Suggestion cache storage
//!
//! Rows are keyed by (target_kind, target_id, figure_id). A refresh replaces
//! every row of a target in one transaction.

use diesel::prelude::*;
use serde::Serialize;
use uuid::Uuid;

use super::diesel_schema::{figures, suggestions};
use super::models::{
    current_timestamp, timestamp_in_hours, NewSuggestion, Suggestion, SuggestionStatus,
};
use crate::error::ProgressionError;
use crate::suggestions::SuggestionTarget;

/// One fresh row to cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    pub figure_id: String,
    pub score: i32,
    pub validated_count: i32,
    pub total_count: i32,
}

// ============================================================================
// Read Operations
// ============================================================================

/// Pending, unexpired rows of a target: score descending, then catalog order
pub fn list_live(
    conn: &mut SqliteConnection,
    target: &SuggestionTarget,
) -> Result<Vec<Suggestion>, ProgressionError> {
    let now = current_timestamp();

    suggestions::table
        .inner_join(figures::table)
        .filter(suggestions::target_kind.eq(target.kind()))
        .filter(suggestions::target_id.eq(target.id()))
        .filter(suggestions::status.eq(SuggestionStatus::Pending.as_str()))
        .filter(suggestions::expires_at.gt(&now))
        .order((
            suggestions::score.desc(),
            figures::catalog_order.asc(),
            figures::id.asc(),
        ))
        .select(Suggestion::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

/// Every row of a target regardless of status
pub fn list_all_for_target(
    conn: &mut SqliteConnection,
    target: &SuggestionTarget,
) -> Result<Vec<Suggestion>, ProgressionError> {
    suggestions::table
        .filter(suggestions::target_kind.eq(target.kind()))
        .filter(suggestions::target_id.eq(target.id()))
        .order((suggestions::score.desc(), suggestions::figure_id.asc()))
        .select(Suggestion::as_select())
        .load(conn)
        .map_err(|e| ProgressionError::Database(format!("Query failed: {}", e)))
}

// ============================================================================
// Write Operations
// ============================================================================

/// Atomically replace every cached row of `target` with `entries` as `pending`
pub fn replace_for_target(
    conn: &mut SqliteConnection,
    target: &SuggestionTarget,
    entries: &[CacheEntry],
    ttl_hours: i64,
) -> Result<Vec<Suggestion>, ProgressionError> {
    conn.transaction(|conn| {
        diesel::delete(
            suggestions::table
                .filter(suggestions::target_kind.eq(target.kind()))
                .filter(suggestions::target_id.eq(target.id())),
        )
        .execute(conn)
        .map_err(|e| ProgressionError::Database(format!("Delete failed: {}", e)))?;

        let now = current_timestamp();
        let expires_at = timestamp_in_hours(ttl_hours);

        for entry in entries {
            let id = Uuid::new_v4().to_string();
            diesel::insert_into(suggestions::table)
                .values(&NewSuggestion {
                    id: &id,
                    target_kind: target.kind(),
                    target_id: target.id(),
                    figure_id: &entry.figure_id,
                    score: entry.score,
                    validated_count: entry.validated_count,
                    total_count: entry.total_count,
                    status: SuggestionStatus::Pending.as_str(),
                    expires_at: &expires_at,
                    created_at: &now,
                    updated_at: &now,
                })
                .execute(conn)
                .map_err(|e| {
                    ProgressionError::from_insert(e, format!("suggestion of '{}'", entry.figure_id))
                })?;
        }

        list_all_for_target(conn, target)
    })
}

/// Set the status of the row for (target, figure); returns rows touched
pub fn set_status(
    conn: &mut SqliteConnection,
    target: &SuggestionTarget,
    figure_id: &str,
    status: SuggestionStatus,
) -> Result<usize, ProgressionError> {
    diesel::update(
        suggestions::table
            .filter(suggestions::target_kind.eq(target.kind()))
            .filter(suggestions::target_id.eq(target.id()))
            .filter(suggestions::figure_id.eq(figure_id)),
    )
    .set((
        suggestions::status.eq(status.as_str()),
        suggestions::updated_at.eq(current_timestamp()),
    ))
    .execute(conn)
    .map_err(|e| ProgressionError::Database(format!("Update failed: {}", e)))
}

/// Mark pending rows past their expiry as `expired`
pub fn expire_stale(conn: &mut SqliteConnection) -> Result<usize, ProgressionError> {
    let now = current_timestamp();

    diesel::update(
        suggestions::table
            .filter(suggestions::status.eq(SuggestionStatus::Pending.as_str()))
            .filter(suggestions::expires_at.le(&now)),
    )
    .set((
        suggestions::status.eq(SuggestionStatus::Expired.as_str()),
        suggestions::updated_at.eq(&now),
    ))
    .execute(conn)
    .map_err(|e| ProgressionError::Database(format!("Update failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::{add_figure, setup_test_db};

    fn entry(figure: &str, score: i32) -> CacheEntry {
        CacheEntry {
            figure_id: figure.to_string(),
            score,
            validated_count: 1,
            total_count: 2,
        }
    }

    #[test]
    fn test_replace_wholesale() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 1);
        add_figure(&mut conn, "rondade", 2, 1);
        add_figure(&mut conn, "salto", 3, 1);
        let target = SuggestionTarget::Learner("alice".into());

        replace_for_target(&mut conn, &target, &[entry("atr", 70), entry("rondade", 90)], 24).unwrap();
        set_status(&mut conn, &target, "atr", SuggestionStatus::Dismissed).unwrap();

        let rows = replace_for_target(&mut conn, &target, &[entry("salto", 65)], 24).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].figure_id, "salto");
        assert_eq!(rows[0].status, "pending");
    }

    #[test]
    fn test_targets_are_isolated() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 1, 1);
        let learner = SuggestionTarget::Learner("x1".into());
        let group = SuggestionTarget::Group("x1".into());

        replace_for_target(&mut conn, &learner, &[entry("atr", 70)], 24).unwrap();
        replace_for_target(&mut conn, &group, &[entry("atr", 50)], 24).unwrap();
        replace_for_target(&mut conn, &learner, &[], 24).unwrap();

        assert!(list_all_for_target(&mut conn, &learner).unwrap().is_empty());
        assert_eq!(list_all_for_target(&mut conn, &group).unwrap().len(), 1);
    }

    #[test]
    fn test_live_ordering_and_expiry() {
        let mut conn = setup_test_db();
        add_figure(&mut conn, "atr", 2, 1);
        add_figure(&mut conn, "rondade", 1, 1);
        add_figure(&mut conn, "salto", 3, 1);
        let target = SuggestionTarget::Learner("alice".into());

        replace_for_target(
            &mut conn,
            &target,
            &[entry("atr", 70), entry("rondade", 70), entry("salto", 95)],
            24,
        )
        .unwrap();
        let live: Vec<String> = list_live(&mut conn, &target).unwrap().into_iter().map(|s| s.figure_id).collect();
        assert_eq!(live, vec!["salto", "rondade", "atr"]);
        assert_eq!(expire_stale(&mut conn).unwrap(), 0);

        // Already-expired batch
        replace_for_target(&mut conn, &target, &[entry("atr", 70)], -1).unwrap();
        assert!(list_live(&mut conn, &target).unwrap().is_empty());
        assert_eq!(expire_stale(&mut conn).unwrap(), 1);
        let rows = list_all_for_target(&mut conn, &target).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, "expired");
    }

    #[test]
    fn test_set_status_without_row() {
        let mut conn = setup_test_db();
        let target = SuggestionTarget::Learner("alice".into());
        assert_eq!(set_status(&mut conn, &target, "atr", SuggestionStatus::Dismissed).unwrap(), 0);
    }
}
