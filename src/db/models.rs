//! Diesel model definitions for database tables
//!
//! - Queryable structs: for SELECT queries (reading data)
//! - Insertable structs: for INSERT queries (writing data)
//!
//! TypeScript types are auto-generated via ts-rs. Run:
//!   cargo test export_bindings
//! Generated files go to: bindings/progression/

use std::fmt;
use std::str::FromStr;

use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use super::diesel_schema::*;
use crate::error::ProgressionError;

// ============================================================================
// Timestamp Helpers (SQLite stores timestamps as TEXT)
// ============================================================================

/// Get current UTC timestamp as ISO 8601 string for SQLite TEXT columns
pub fn current_timestamp() -> String {
    format_timestamp(chrono::Utc::now())
}

/// Timestamp `hours` from now, same format as `current_timestamp`
pub fn timestamp_in_hours(hours: i64) -> String {
    format_timestamp(chrono::Utc::now() + chrono::Duration::hours(hours))
}

fn format_timestamp(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ============================================================================
// Catalog Models
// ============================================================================

/// Figure row (catalog skill node)
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = figures)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Figure {
    pub id: String,
    pub discipline_id: String,
    pub name: String,
    pub difficulty: i32,
    pub catalog_order: i32,
    pub created_at: String,
}

/// New figure for INSERT
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = figures)]
pub struct NewFigure<'a> {
    pub id: &'a str,
    pub discipline_id: &'a str,
    pub name: &'a str,
    pub difficulty: i32,
    pub catalog_order: i32,
}

/// Step template of a figure
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = steps)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Step {
    pub id: String,
    pub figure_id: String,
    pub step_order: i32,
    pub title: String,
    pub xp: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = steps)]
pub struct NewStep<'a> {
    pub id: &'a str,
    pub figure_id: &'a str,
    pub step_order: i32,
    pub title: &'a str,
    pub xp: i32,
}

// ============================================================================
// Prerequisite Graph Models
// ============================================================================

/// Prerequisite edge: `prerequisite_id` is a building block of `figure_id`
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = prerequisites)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Prerequisite {
    pub figure_id: String,
    pub prerequisite_id: String,
    pub weight: i32,
    pub is_required: i32,
    pub sort_order: i32,
    pub created_at: String,
}

impl Prerequisite {
    pub fn required(&self) -> bool {
        self.is_required != 0
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = prerequisites)]
pub struct NewPrerequisite<'a> {
    pub figure_id: &'a str,
    pub prerequisite_id: &'a str,
    pub weight: i32,
    pub is_required: i32,
    pub sort_order: i32,
    pub created_at: &'a str,
}

// ============================================================================
// Progression Models
// ============================================================================

/// One learner's status on one step
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = progressions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Progression {
    pub id: String,
    pub learner_id: String,
    pub step_id: String,
    pub status: String,
    pub validated_at: Option<String>,
    pub validated_by: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Progression {
    pub fn status(&self) -> Result<ProgressionStatus, ProgressionError> {
        self.status.parse()
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = progressions)]
pub struct NewProgression<'a> {
    pub id: &'a str,
    pub learner_id: &'a str,
    pub step_id: &'a str,
    pub status: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Stored practice attempt (append-only)
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = attempts)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Attempt {
    pub id: String,
    pub progression_id: String,
    pub mode: String,
    pub success_flag: Option<i32>,
    pub score: Option<i32>,
    pub duration_secs: Option<i32>,
    pub is_success: i32,
    pub created_at: String,
}

impl Attempt {
    pub fn succeeded(&self) -> bool {
        self.is_success != 0
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = attempts)]
pub struct NewAttempt<'a> {
    pub id: &'a str,
    pub progression_id: &'a str,
    pub mode: &'a str,
    pub success_flag: Option<i32>,
    pub score: Option<i32>,
    pub duration_secs: Option<i32>,
    pub is_success: i32,
    pub created_at: &'a str,
}

// ============================================================================
// Suggestion Cache Models
// ============================================================================

/// Cached recommendation row
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = suggestions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Suggestion {
    pub id: String,
    pub target_kind: String,
    pub target_id: String,
    pub figure_id: String,
    pub score: i32,
    pub validated_count: i32,
    pub total_count: i32,
    pub status: String,
    pub expires_at: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = suggestions)]
pub struct NewSuggestion<'a> {
    pub id: &'a str,
    pub target_kind: &'a str,
    pub target_id: &'a str,
    pub figure_id: &'a str,
    pub score: i32,
    pub validated_count: i32,
    pub total_count: i32,
    pub status: &'a str,
    pub expires_at: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

// ============================================================================
// Planning Models
// ============================================================================

/// Learner plan
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = programs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct Program {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub is_personal: i32,
    pub created_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = programs)]
pub struct NewProgram<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub owner_id: Option<&'a str>,
    pub is_personal: i32,
    pub created_at: &'a str,
}

/// Figure placed in a plan
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize, TS)]
#[diesel(table_name = program_figures)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
#[ts(export, export_to = "progression/")]
pub struct ProgramFigure {
    pub program_id: String,
    pub figure_id: String,
    pub position: i32,
    pub added_at: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = program_figures)]
pub struct NewProgramFigure<'a> {
    pub program_id: &'a str,
    pub figure_id: &'a str,
    pub position: i32,
    pub added_at: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = learner_programs)]
pub struct NewLearnerProgram<'a> {
    pub program_id: &'a str,
    pub learner_id: &'a str,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = group_members)]
pub struct NewGroupMember<'a> {
    pub group_id: &'a str,
    pub learner_id: &'a str,
}

// ============================================================================
// Status Enums (stored as TEXT)
// ============================================================================

/// Step progression status, declared in advancement order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "progression/")]
pub enum ProgressionStatus {
    NonCommence,
    EnCours,
    Valide,
}

impl ProgressionStatus {
    pub const ALL: [ProgressionStatus; 3] = [Self::NonCommence, Self::EnCours, Self::Valide];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonCommence => "non_commence",
            Self::EnCours => "en_cours",
            Self::Valide => "valide",
        }
    }
}

impl FromStr for ProgressionStatus {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ProgressionError::Internal(format!("Unknown progression status: {}", s)))
    }
}

impl fmt::Display for ProgressionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Suggestion cache row lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "progression/")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Dismissed,
    Expired,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for SuggestionStatus {
    type Err = ProgressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "dismissed" => Ok(Self::Dismissed),
            "expired" => Ok(Self::Expired),
            other => Err(ProgressionError::Internal(format!("Unknown suggestion status: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_order_follows_advancement() {
        assert!(ProgressionStatus::NonCommence < ProgressionStatus::EnCours);
        assert!(ProgressionStatus::EnCours < ProgressionStatus::Valide);
    }

    #[test]
    fn test_status_text_mapping() {
        for status in ProgressionStatus::ALL {
            assert_eq!(status.as_str().parse::<ProgressionStatus>().unwrap(), status);
        }
        assert!("termine".parse::<ProgressionStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&ProgressionStatus::NonCommence).unwrap(),
            "\"non_commence\""
        );
        assert_eq!("dismissed".parse::<SuggestionStatus>().unwrap(), SuggestionStatus::Dismissed);
    }

    #[test]
    fn test_timestamps_sort_lexically() {
        let now = current_timestamp();
        let later = timestamp_in_hours(24);
        assert!(later > now);
        assert_eq!(now.len(), "2024-01-01T00:00:00Z".len());
    }
}
