//! Database schema definitions

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::sql_types::Integer;
use tracing::info;

use crate::error::ProgressionError;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

#[derive(QueryableByName)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
}

/// Initialize the database schema
pub fn init_schema(conn: &mut SqliteConnection) -> Result<(), ProgressionError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.transaction(|conn| {
            create_tables(conn)?;
            set_schema_version(conn, SCHEMA_VERSION)
        })?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating schema from v{} to v{}", current_version, SCHEMA_VERSION);
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        info!("Database schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &mut SqliteConnection) -> Result<i32, ProgressionError> {
    conn.batch_execute("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .map_err(|e| ProgressionError::Database(format!("Failed to create schema_version table: {}", e)))?;

    let row: Option<VersionRow> = diesel::sql_query("SELECT version FROM schema_version LIMIT 1")
        .get_result(conn)
        .optional()
        .map_err(|e| ProgressionError::Database(format!("Failed to read schema_version: {}", e)))?;

    Ok(row.map(|r| r.version).unwrap_or(0))
}

fn set_schema_version(conn: &mut SqliteConnection, version: i32) -> Result<(), ProgressionError> {
    conn.batch_execute(&format!(
        "DELETE FROM schema_version; INSERT INTO schema_version (version) VALUES ({});",
        version
    ))
    .map_err(|e| ProgressionError::Database(format!("Failed to set schema_version: {}", e)))
}

fn create_tables(conn: &mut SqliteConnection) -> Result<(), ProgressionError> {
    conn.batch_execute(CATALOG_SCHEMA)
        .map_err(|e| ProgressionError::Database(format!("Failed to create catalog tables: {}", e)))?;

    conn.batch_execute(PROGRESSION_SCHEMA)
        .map_err(|e| ProgressionError::Database(format!("Failed to create progression tables: {}", e)))?;

    conn.batch_execute(PLANNING_SCHEMA)
        .map_err(|e| ProgressionError::Database(format!("Failed to create planning tables: {}", e)))?;

    conn.batch_execute(INDEXES_SCHEMA)
        .map_err(|e| ProgressionError::Database(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

/// Figures, steps and the prerequisite graph
const CATALOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS figures (
    id TEXT PRIMARY KEY NOT NULL,
    discipline_id TEXT NOT NULL,
    name TEXT NOT NULL,
    difficulty INTEGER NOT NULL DEFAULT 1,
    catalog_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

CREATE TABLE IF NOT EXISTS steps (
    id TEXT PRIMARY KEY NOT NULL,
    figure_id TEXT NOT NULL REFERENCES figures(id),
    step_order INTEGER NOT NULL,
    title TEXT NOT NULL,
    xp INTEGER NOT NULL DEFAULT 0,
    UNIQUE (figure_id, step_order)
);

CREATE TABLE IF NOT EXISTS prerequisites (
    figure_id TEXT NOT NULL REFERENCES figures(id),
    prerequisite_id TEXT NOT NULL REFERENCES figures(id),
    weight INTEGER NOT NULL DEFAULT 1 CHECK (weight > 0),
    is_required INTEGER NOT NULL DEFAULT 1,
    sort_order INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (figure_id, prerequisite_id),
    CHECK (figure_id <> prerequisite_id)
);
"#;

/// Per-learner progression, attempts and the suggestion cache
const PROGRESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS progressions (
    id TEXT PRIMARY KEY NOT NULL,
    learner_id TEXT NOT NULL,
    step_id TEXT NOT NULL REFERENCES steps(id),
    status TEXT NOT NULL DEFAULT 'non_commence',
    validated_at TEXT,
    validated_by TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (learner_id, step_id)
);

CREATE TABLE IF NOT EXISTS attempts (
    id TEXT PRIMARY KEY NOT NULL,
    progression_id TEXT NOT NULL REFERENCES progressions(id),
    mode TEXT NOT NULL,
    success_flag INTEGER,
    score INTEGER,
    duration_secs INTEGER,
    is_success INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS suggestions (
    id TEXT PRIMARY KEY NOT NULL,
    target_kind TEXT NOT NULL CHECK (target_kind IN ('learner', 'group')),
    target_id TEXT NOT NULL,
    figure_id TEXT NOT NULL REFERENCES figures(id),
    score INTEGER NOT NULL,
    validated_count INTEGER NOT NULL,
    total_count INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    expires_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE (target_kind, target_id, figure_id)
);
"#;

/// Learner plans and group composition
const PLANNING_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS programs (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL,
    owner_id TEXT,
    is_personal INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS program_figures (
    program_id TEXT NOT NULL REFERENCES programs(id),
    figure_id TEXT NOT NULL REFERENCES figures(id),
    position INTEGER NOT NULL,
    added_at TEXT NOT NULL,
    PRIMARY KEY (program_id, figure_id)
);

CREATE TABLE IF NOT EXISTS learner_programs (
    program_id TEXT NOT NULL REFERENCES programs(id),
    learner_id TEXT NOT NULL,
    PRIMARY KEY (program_id, learner_id)
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id TEXT NOT NULL,
    learner_id TEXT NOT NULL,
    PRIMARY KEY (group_id, learner_id)
);
"#;

const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_steps_figure ON steps(figure_id);
CREATE INDEX IF NOT EXISTS idx_prerequisites_child ON prerequisites(prerequisite_id);
CREATE INDEX IF NOT EXISTS idx_progressions_learner ON progressions(learner_id, status);
CREATE INDEX IF NOT EXISTS idx_attempts_progression ON attempts(progression_id);
CREATE INDEX IF NOT EXISTS idx_suggestions_target ON suggestions(target_kind, target_id, status);
CREATE INDEX IF NOT EXISTS idx_learner_programs_learner ON learner_programs(learner_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_programs_personal ON programs(owner_id) WHERE is_personal = 1;
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        init_schema(&mut conn).unwrap();
        init_schema(&mut conn).unwrap();

        assert_eq!(get_schema_version(&mut conn).unwrap(), SCHEMA_VERSION);
    }

    #[test]
    fn test_self_loop_rejected_by_check_constraint() {
        let mut conn = SqliteConnection::establish(":memory:").unwrap();
        init_schema(&mut conn).unwrap();

        conn.batch_execute(
            "INSERT INTO figures (id, discipline_id, name) VALUES ('atr', 'acro', 'ATR');",
        )
        .unwrap();
        let result = conn.batch_execute(
            "INSERT INTO prerequisites (figure_id, prerequisite_id, created_at)
             VALUES ('atr', 'atr', '2024-01-01T00:00:00Z');",
        );
        assert!(result.is_err());
    }
}
