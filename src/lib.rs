//! Circus Progression - readiness and progression engine for circus figures
//!
//! Tracks each learner's mastery of figures (skills broken into ordered steps)
//! and recommends which figure to learn next from the mastery of its
//! prerequisites.
//!
//! ## Components
//!
//! - **Progression**: per-(learner, step) state machine driven by attempts
//! - **Graph**: weighted prerequisite DAG with a cycle guard on every edit
//! - **Readiness**: weighted completion percentage of a figure's prerequisites
//! - **Suggestions**: ranked individual and group lists plus a refreshable cache
//!
//! ## Flow
//!
//! ```text
//! attempt ──▶ progressions ──▶ readiness score ──▶ suggestions ──▶ cache
//!                                   ▲
//!                    prerequisite graph (cycle-checked edits)
//! ```
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/circus-progression/
//! ├── progression.db      # SQLite (WAL) database
//! └── config.toml         # Configuration
//! ```

pub mod config;
pub mod error;
pub mod db;
pub mod progression;
pub mod graph;
pub mod readiness;
pub mod suggestions;
pub mod services;

// Re-exports
pub use config::{Config, SuggestionSettings};
pub use error::{ProgressionError, Result};
pub use db::Database;
pub use graph::PrerequisiteGraph;
pub use progression::{AttemptMode, AttemptPayload, AttemptRequest};
pub use readiness::{LearnerProgress, ReadinessScore};
pub use suggestions::{GroupSuggestion, IndividualSuggestion, RankOptions, SuggestionTarget};
pub use services::{EngineEvent, EventBus, Services};
