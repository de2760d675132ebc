//! Attempt service - records practice attempts and drives the step state machine
//!
//! An attempt and the status update it causes are written in one
//! `BEGIN IMMEDIATE` transaction, so concurrent writers queue on the busy
//! timeout instead of failing on a lock upgrade. Events go out only after
//! commit.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::db::models::{Attempt, Progression};
use crate::db::progressions::EnrollmentResult;
use crate::db::{attempts, progressions, Database};
use crate::error::ProgressionError;
use crate::progression::{advance, AttemptPayload, AttemptRequest, Transition};

use super::events::{EngineEvent, EventBus};

/// Default page size for attempt history
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;

/// Result of recording one attempt
#[derive(Debug, Clone, Serialize)]
pub struct AttemptOutcome {
    pub progression: Progression,
    pub attempt: Attempt,
    /// true when this attempt changed the step status
    pub status_changed: bool,
}

/// One stored attempt with its payload rebuilt from the stored columns
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub attempt: Attempt,
    pub payload: AttemptPayload,
}

pub struct AttemptService {
    db: Arc<Database>,
    events: Arc<EventBus>,
}

impl AttemptService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>) -> Self {
        Self { db, events }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// A learner's progression rows on one figure, in step order
    pub fn progress_on_figure(
        &self,
        learner_id: &str,
        figure_id: &str,
    ) -> Result<Vec<Progression>, ProgressionError> {
        self.db.with_conn(|conn| progressions::list_for_figure(conn, learner_id, figure_id))
    }

    /// Attempts on a learner's step, newest first
    pub fn history(
        &self,
        learner_id: &str,
        step_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<HistoryEntry>, ProgressionError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 1000);

        let rows = self.db.transaction(|conn| {
            let progression = require_progression(conn, learner_id, step_id)?;
            attempts::list_for_progression(conn, &progression.id, limit)
        })?;

        rows
            .into_iter()
            .map(|attempt| {
                let payload = AttemptPayload::from_stored(&attempt)?;
                Ok(HistoryEntry { attempt, payload })
            })
            .collect()
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Parse and record a raw attempt
    pub fn record_attempt(
        &self,
        learner_id: &str,
        step_id: &str,
        request: &AttemptRequest,
        validator_id: Option<&str>,
    ) -> Result<AttemptOutcome, ProgressionError> {
        let payload = AttemptPayload::parse(request)?;
        self.record(learner_id, step_id, payload, validator_id)
    }

    /// Record an already-built payload
    pub fn record(
        &self,
        learner_id: &str,
        step_id: &str,
        payload: AttemptPayload,
        validator_id: Option<&str>,
    ) -> Result<AttemptOutcome, ProgressionError> {
        payload.validate()?;

        let (progression, attempt, transition) = self.db.immediate_transaction(|conn| {
            let current = require_progression(conn, learner_id, step_id)?;
            let attempt = attempts::insert_attempt(conn, &current.id, &payload)?;
            let transition = advance(current.status()?, payload.is_success());
            let updated = progressions::apply_transition(conn, &current, transition, validator_id)?;
            Ok((updated, attempt, transition))
        })?;

        debug!(
            learner = %learner_id,
            step = %step_id,
            mode = payload.mode().as_str(),
            success = attempt.succeeded(),
            "Attempt recorded"
        );
        self.publish(&progression, &attempt, transition);

        Ok(AttemptOutcome {
            progression,
            attempt,
            status_changed: transition.changed(),
        })
    }

    /// Create `non_commence` rows for every step of a figure
    pub fn enroll(&self, learner_id: &str, figure_id: &str) -> Result<EnrollmentResult, ProgressionError> {
        if learner_id.trim().is_empty() {
            return Err(ProgressionError::Validation("learner_id is required".into()));
        }

        let result = self
            .db
            .immediate_transaction(|conn| progressions::enroll(conn, learner_id, figure_id))?;

        info!(learner = %learner_id, figure = %figure_id, steps = result.created.len(), "Learner enrolled");
        self.events.emit(EngineEvent::LearnerEnrolled {
            learner_id: learner_id.to_string(),
            figure_id: figure_id.to_string(),
            step_count: result.created.len(),
        });

        Ok(result)
    }

    fn publish(&self, progression: &Progression, attempt: &Attempt, transition: Transition) {
        self.events.emit(EngineEvent::AttemptRecorded {
            attempt_id: attempt.id.clone(),
            progression_id: progression.id.clone(),
            learner_id: progression.learner_id.clone(),
            step_id: progression.step_id.clone(),
            success: attempt.succeeded(),
        });

        if transition.changed() {
            info!(
                learner = %progression.learner_id,
                step = %progression.step_id,
                from = transition.from.as_str(),
                to = transition.to.as_str(),
                "Progression changed"
            );
            self.events.emit(EngineEvent::ProgressionChanged {
                progression_id: progression.id.clone(),
                learner_id: progression.learner_id.clone(),
                step_id: progression.step_id.clone(),
                from: transition.from.to_string(),
                to: transition.to.to_string(),
            });
        }
    }
}

fn require_progression(
    conn: &mut diesel::SqliteConnection,
    learner_id: &str,
    step_id: &str,
) -> Result<Progression, ProgressionError> {
    progressions::find_for_step(conn, learner_id, step_id)?.ok_or_else(|| {
        ProgressionError::NotFound(format!(
            "learner '{}' is not enrolled on step '{}'",
            learner_id, step_id
        ))
    })
}
