//! SQLite database module for progression storage
//!
//! ## Tables
//!
//! - `figures`, `steps` - Catalog (read-only for the engine)
//! - `prerequisites` - Weighted figure → prerequisite edges (a DAG)
//! - `progressions` - One status row per (learner, step)
//! - `attempts` - Append-only practice log
//! - `suggestions` - Refreshable recommendation cache
//! - `programs`, `program_figures`, `learner_programs` - Learner plans
//! - `group_members` - Group composition

pub mod diesel_schema;
pub mod models;
pub mod schema;

pub mod catalog;
pub mod prerequisites;
pub mod progressions;
pub mod attempts;
pub mod suggestions;
pub mod programs;
pub mod groups;

use std::path::Path;
use std::time::Duration;

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use tracing::{debug, info};

use crate::config::Config;
use crate::error::ProgressionError;

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type PooledConn = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Per-connection PRAGMAs applied when the pool hands out a connection
#[derive(Debug, Clone, Copy)]
struct SqlitePragmas {
    busy_timeout_ms: u32,
    wal: bool,
}

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for SqlitePragmas {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> Result<(), diesel::r2d2::Error> {
        let mut pragmas = format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            self.busy_timeout_ms
        );
        if self.wal {
            pragmas.push_str(" PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
        }
        conn.batch_execute(&pragmas)
            .map_err(diesel::r2d2::Error::QueryError)
    }
}

/// Pooled SQLite database shared by all services
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open or create the database described by `config`
    pub fn open(config: &Config) -> Result<Self, ProgressionError> {
        std::fs::create_dir_all(&config.storage_dir)?;
        let db_path = config.database_path();
        info!("Opening SQLite database at {:?}", db_path);

        let manager = ConnectionManager::<SqliteConnection>::new(path_to_url(&db_path)?);
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: config.busy_timeout_ms,
                wal: true,
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every SQLite `:memory:` connection is a separate database, so the pool
    /// holds exactly one long-lived connection.
    pub fn open_in_memory() -> Result<Self, ProgressionError> {
        debug!("Opening in-memory SQLite database");

        let manager = ConnectionManager::<SqliteConnection>::new(":memory:");
        let pool = Pool::builder()
            .max_size(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connection_customizer(Box::new(SqlitePragmas {
                busy_timeout_ms: 0,
                wal: false,
            }))
            .build(manager)?;

        let db = Self { pool };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<(), ProgressionError> {
        let mut conn = self.conn()?;
        schema::init_schema(&mut conn)
    }

    /// Get a connection from the pool
    pub fn conn(&self) -> Result<PooledConn, ProgressionError> {
        self.pool
            .get()
            .map_err(|e| ProgressionError::Pool(format!("Failed to get connection: {}", e)))
    }

    /// Run `f` with a pooled connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ProgressionError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, ProgressionError>,
    {
        let mut conn = self.conn()?;
        f(&mut *conn)
    }

    /// Run `f` inside a deferred transaction: all writes commit or none do,
    /// and reads see one consistent snapshot
    pub fn transaction<F, T>(&self, f: F) -> Result<T, ProgressionError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, ProgressionError>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.transaction(f)
    }

    /// Run `f` inside `BEGIN IMMEDIATE`, taking the write lock up front
    pub fn immediate_transaction<F, T>(&self, f: F) -> Result<T, ProgressionError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, ProgressionError>,
    {
        let mut pooled = self.conn()?;
        let conn: &mut SqliteConnection = &mut pooled;
        conn.immediate_transaction(f)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, ProgressionError> {
        use diesel_schema::{attempts, figures, prerequisites, progressions, suggestions};

        self.transaction(|conn| {
            Ok(DbStats {
                figure_count: figures::table.count().get_result::<i64>(conn)? as u64,
                prerequisite_count: prerequisites::table.count().get_result::<i64>(conn)? as u64,
                progression_count: progressions::table.count().get_result::<i64>(conn)? as u64,
                attempt_count: attempts::table.count().get_result::<i64>(conn)? as u64,
                suggestion_count: suggestions::table.count().get_result::<i64>(conn)? as u64,
            })
        })
    }
}

fn path_to_url(path: &Path) -> Result<String, ProgressionError> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| ProgressionError::Config(format!("Database path is not UTF-8: {:?}", path)))
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub figure_count: u64,
    pub prerequisite_count: u64,
    pub progression_count: u64,
    pub attempt_count: u64,
    pub suggestion_count: u64,
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::db::catalog::{self, ImportFigureInput, ImportStepInput};

    /// Fresh in-memory connection with the full schema
    pub fn setup_test_db() -> SqliteConnection {
        let mut conn = SqliteConnection::establish(":memory:")
            .expect("Failed to create in-memory database");
        conn.batch_execute("PRAGMA foreign_keys = ON;")
            .expect("Failed to enable foreign keys");
        schema::init_schema(&mut conn).expect("Failed to create schema");
        conn
    }

    /// Insert a figure with `step_count` numbered steps (`{id}-1`, `{id}-2`, ...)
    pub fn add_figure(conn: &mut SqliteConnection, id: &str, order: i32, step_count: i32) {
        catalog::insert_figure(conn, &ImportFigureInput {
            id: id.to_string(),
            discipline_id: "acrobatie".to_string(),
            name: id.to_string(),
            difficulty: 1,
            catalog_order: order,
        })
        .expect("Failed to insert figure");

        for n in 1..=step_count {
            catalog::insert_step(conn, &ImportStepInput {
                id: format!("{}-{}", id, n),
                figure_id: id.to_string(),
                step_order: n,
                title: format!("{} step {}", id, n),
                xp: 10,
            })
            .expect("Failed to insert step");
        }
    }
}
