//! Step progression state machine and attempt payloads
//!
//! ```text
//! non_commence ──fail──▶ en_cours ──success──▶ valide
//!      │                    ▲  │                  ▲
//!      │                    └──┘ fail             │
//!      └───────────────success────────────────────┘
//! ```
//!
//! Status never moves backwards. A failed attempt on a `valide` step leaves it
//! `valide`.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::db::models::{Attempt, ProgressionStatus};
use crate::error::ProgressionError;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 3;
/// Lowest evaluation score that counts as a success
pub const PASSING_SCORE: u8 = 2;

// ============================================================================
// Attempt Modes
// ============================================================================

/// How a practice attempt was assessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "progression/")]
pub enum AttemptMode {
    Binaire,
    Evaluation,
    Duree,
    EvaluationDuree,
}

impl AttemptMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binaire => "binaire",
            Self::Evaluation => "evaluation",
            Self::Duree => "duree",
            Self::EvaluationDuree => "evaluation_duree",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "binaire" => Some(Self::Binaire),
            "evaluation" => Some(Self::Evaluation),
            "duree" => Some(Self::Duree),
            "evaluation_duree" => Some(Self::EvaluationDuree),
            _ => None,
        }
    }
}

/// Raw attempt as received from a caller: a mode tag plus optional fields
#[derive(Debug, Clone, Deserialize, Serialize, TS)]
#[ts(export, export_to = "progression/")]
pub struct AttemptRequest {
    pub mode: AttemptMode,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub score: Option<i64>,
    #[serde(default)]
    pub duration_secs: Option<i64>,
}

/// Validated attempt payload; each mode carries only its legal fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "mode", rename_all = "snake_case")]
#[ts(export, export_to = "progression/")]
pub enum AttemptPayload {
    Binaire { success: bool },
    Evaluation { score: u8 },
    Duree { duration_secs: u32 },
    EvaluationDuree { score: u8, duration_secs: u32 },
}

impl AttemptPayload {
    /// Parse a raw request, rejecting missing or forbidden fields for its mode
    pub fn parse(request: &AttemptRequest) -> Result<Self, ProgressionError> {
        let mode = request.mode.as_str();

        let payload = match request.mode {
            AttemptMode::Binaire => {
                forbid(mode, "score", request.score.is_some())?;
                forbid(mode, "duration", request.duration_secs.is_some())?;
                let success = request.success.ok_or_else(|| {
                    ProgressionError::Validation("binaire attempts require a success flag".into())
                })?;
                Self::Binaire { success }
            }
            AttemptMode::Evaluation => {
                forbid(mode, "success flag", request.success.is_some())?;
                forbid(mode, "duration", request.duration_secs.is_some())?;
                Self::Evaluation {
                    score: require_score(mode, request.score)?,
                }
            }
            AttemptMode::Duree => {
                forbid(mode, "success flag", request.success.is_some())?;
                forbid(mode, "score", request.score.is_some())?;
                Self::Duree {
                    duration_secs: require_duration(mode, request.duration_secs)?,
                }
            }
            AttemptMode::EvaluationDuree => {
                forbid(mode, "success flag", request.success.is_some())?;
                Self::EvaluationDuree {
                    score: require_score(mode, request.score)?,
                    duration_secs: require_duration(mode, request.duration_secs)?,
                }
            }
        };

        Ok(payload)
    }

    /// Re-check ranges on a payload built directly in code
    pub fn validate(&self) -> Result<(), ProgressionError> {
        let mode = self.mode().as_str();
        match *self {
            Self::Binaire { .. } => Ok(()),
            Self::Evaluation { score } => require_score(mode, Some(score.into())).map(|_| ()),
            Self::Duree { duration_secs } => {
                require_duration(mode, Some(duration_secs.into())).map(|_| ())
            }
            Self::EvaluationDuree { score, duration_secs } => {
                require_score(mode, Some(score.into()))?;
                require_duration(mode, Some(duration_secs.into())).map(|_| ())
            }
        }
    }

    pub fn mode(&self) -> AttemptMode {
        match self {
            Self::Binaire { .. } => AttemptMode::Binaire,
            Self::Evaluation { .. } => AttemptMode::Evaluation,
            Self::Duree { .. } => AttemptMode::Duree,
            Self::EvaluationDuree { .. } => AttemptMode::EvaluationDuree,
        }
    }

    /// Derived success flag
    pub fn is_success(&self) -> bool {
        match *self {
            Self::Binaire { success } => success,
            Self::Evaluation { score } | Self::EvaluationDuree { score, .. } => score >= PASSING_SCORE,
            Self::Duree { .. } => true,
        }
    }

    /// Column values `(success_flag, score, duration_secs)` for storage
    pub fn columns(&self) -> (Option<i32>, Option<i32>, Option<i32>) {
        match *self {
            Self::Binaire { success } => (Some(success as i32), None, None),
            Self::Evaluation { score } => (None, Some(score.into()), None),
            Self::Duree { duration_secs } => (None, None, Some(duration_secs as i32)),
            Self::EvaluationDuree { score, duration_secs } => {
                (None, Some(score.into()), Some(duration_secs as i32))
            }
        }
    }

    /// Rebuild the payload of a stored attempt
    pub fn from_stored(attempt: &Attempt) -> Result<Self, ProgressionError> {
        let mode = AttemptMode::parse(&attempt.mode).ok_or_else(|| {
            ProgressionError::Internal(format!("Unknown attempt mode: {}", attempt.mode))
        })?;

        Self::parse(&AttemptRequest {
            mode,
            success: attempt.success_flag.map(|flag| flag != 0),
            score: attempt.score.map(i64::from),
            duration_secs: attempt.duration_secs.map(i64::from),
        })
    }
}

fn forbid(mode: &str, field: &str, present: bool) -> Result<(), ProgressionError> {
    if present {
        return Err(ProgressionError::Validation(format!(
            "{} attempts must not carry a {}",
            mode, field
        )));
    }
    Ok(())
}

fn require_score(mode: &str, score: Option<i64>) -> Result<u8, ProgressionError> {
    let score = score.ok_or_else(|| {
        ProgressionError::Validation(format!("{} attempts require a score", mode))
    })?;
    if !(i64::from(MIN_SCORE)..=i64::from(MAX_SCORE)).contains(&score) {
        return Err(ProgressionError::Validation(format!(
            "{} score must be between {} and {}, got {}",
            mode, MIN_SCORE, MAX_SCORE, score
        )));
    }
    Ok(score as u8)
}

fn require_duration(mode: &str, duration: Option<i64>) -> Result<u32, ProgressionError> {
    let duration = duration.ok_or_else(|| {
        ProgressionError::Validation(format!("{} attempts require a duration", mode))
    })?;
    if duration <= 0 {
        return Err(ProgressionError::Validation(format!(
            "{} duration must be positive, got {}",
            mode, duration
        )));
    }
    if duration > i64::from(i32::MAX) {
        return Err(ProgressionError::Validation(format!(
            "{} duration is too large: {}",
            mode, duration
        )));
    }
    Ok(duration as u32)
}

// ============================================================================
// State Machine
// ============================================================================

/// Result of applying one attempt to a step status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ProgressionStatus,
    pub to: ProgressionStatus,
    /// The attempt succeeded
    pub success: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }

    /// Every successful attempt stamps validation time and validator, also on
    /// a step that is already `valide`
    pub fn stamps_validation(&self) -> bool {
        self.success && self.to == ProgressionStatus::Valide
    }

    /// Something must be written back to the progression row
    pub fn needs_write(&self) -> bool {
        self.changed() || self.stamps_validation()
    }
}

/// Apply an attempt outcome to the current status
pub fn advance(current: ProgressionStatus, success: bool) -> Transition {
    let to = match (current, success) {
        (_, true) => ProgressionStatus::Valide,
        (ProgressionStatus::Valide, false) => ProgressionStatus::Valide,
        (_, false) => ProgressionStatus::EnCours,
    };

    Transition { from: current, to, success }
}
