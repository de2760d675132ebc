//! Suggestion service - refreshable recommendation cache
//!
//! Refresh recomputes at the relaxed refresh settings and swaps a target's rows
//! in one transaction. Accept and dismiss act on the learner's own row.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use diesel::SqliteConnection;

use crate::config::SuggestionSettings;
use crate::db::models::{ProgramFigure, Suggestion, SuggestionStatus};
use crate::db::suggestions::{self as cache, CacheEntry};
use crate::db::{catalog, groups, programs, progressions, Database};
use crate::error::ProgressionError;
use crate::graph::PrerequisiteGraph;
use crate::suggestions::{suggest_for_group, suggest_for_learner, RankOptions, SuggestionTarget};

use super::events::{EngineEvent, EventBus};
use super::readiness_service::{load_group, load_learner};

/// Result of accepting a suggestion
#[derive(Debug, Clone, Serialize)]
pub struct AcceptOutcome {
    pub program_id: String,
    pub entry: ProgramFigure,
    /// false when the figure was already in the plan
    pub appended: bool,
    /// false when no cache row matched
    pub suggestion_marked: bool,
}

/// Rows written per target by a scheduler-wide refresh
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshSummary {
    pub learners: usize,
    pub groups: usize,
    pub rows: usize,
}

pub struct SuggestionService {
    db: Arc<Database>,
    events: Arc<EventBus>,
    settings: SuggestionSettings,
}

impl SuggestionService {
    pub fn new(db: Arc<Database>, events: Arc<EventBus>, settings: SuggestionSettings) -> Self {
        Self { db, events, settings }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Live cached suggestions of a target, best first
    pub fn list(&self, target: &SuggestionTarget) -> Result<Vec<Suggestion>, ProgressionError> {
        self.db.with_conn(|conn| cache::list_live(conn, target))
    }

    // =========================================================================
    // Refresh
    // =========================================================================

    /// Recompute and replace every cached row of one target
    pub fn refresh(&self, target: &SuggestionTarget) -> Result<Vec<Suggestion>, ProgressionError> {
        let rows = self.db.immediate_transaction(|conn| {
            let graph = PrerequisiteGraph::load(conn)?;
            self.refresh_in(conn, &graph, target)
        })?;

        self.announce_refresh(target, rows.len());
        Ok(rows)
    }

    /// Refresh every enrolled learner and every non-empty group
    pub fn refresh_all(&self) -> Result<RefreshSummary, ProgressionError> {
        let refreshed = self.db.immediate_transaction(|conn| {
            let graph = PrerequisiteGraph::load(conn)?;
            let targets: Vec<SuggestionTarget> = progressions::enrolled_learner_ids(conn)?
                .into_iter()
                .map(SuggestionTarget::Learner)
                .chain(groups::group_ids(conn)?.into_iter().map(SuggestionTarget::Group))
                .collect();

            let mut refreshed = Vec::with_capacity(targets.len());
            for target in targets {
                let count = self.refresh_in(conn, &graph, &target)?.len();
                refreshed.push((target, count));
            }
            Ok(refreshed)
        })?;

        let mut summary = RefreshSummary::default();
        for (target, count) in &refreshed {
            match target {
                SuggestionTarget::Learner(_) => summary.learners += 1,
                SuggestionTarget::Group(_) => summary.groups += 1,
            }
            summary.rows += count;
            self.announce_refresh(target, *count);
        }

        info!(learners = summary.learners, groups = summary.groups, rows = summary.rows, "Suggestion cache refreshed");
        Ok(summary)
    }

    fn refresh_in(
        &self,
        conn: &mut SqliteConnection,
        graph: &PrerequisiteGraph,
        target: &SuggestionTarget,
    ) -> Result<Vec<Suggestion>, ProgressionError> {
        let s = &self.settings;

        let entries: Vec<CacheEntry> = match target {
            SuggestionTarget::Learner(learner_id) => {
                let learner = load_learner(conn, learner_id)?;
                let options = RankOptions::new(s.refresh_individual_threshold, s.refresh_individual_limit);
                suggest_for_learner(graph, &learner, options).iter().map(CacheEntry::from).collect()
            }
            SuggestionTarget::Group(group_id) => {
                let members = load_group(conn, group_id)?;
                let options = RankOptions::new(s.refresh_group_threshold, s.refresh_group_limit);
                suggest_for_group(graph, &members, s.ready_threshold, options)
                    .iter()
                    .map(CacheEntry::from)
                    .collect()
            }
        };

        cache::replace_for_target(conn, target, &entries, s.cache_ttl_hours)
    }

    fn announce_refresh(&self, target: &SuggestionTarget, count: usize) {
        debug!(suggestion_target = %target, count, "Suggestions refreshed");
        self.events.emit(EngineEvent::SuggestionsRefreshed {
            target_kind: target.kind().to_string(),
            target_id: target.id().to_string(),
            count,
        });
    }

    // =========================================================================
    // Learner Actions
    // =========================================================================

    /// Put the figure in the learner's personal plan and mark the row accepted.
    /// Accepting again changes nothing.
    pub fn accept(&self, learner_id: &str, figure_id: &str) -> Result<AcceptOutcome, ProgressionError> {
        let target = SuggestionTarget::Learner(learner_id.to_string());

        let outcome = self.db.immediate_transaction(|conn| {
            catalog::require_figure(conn, figure_id)?;
            let program = programs::ensure_personal_program(conn, learner_id)?;
            let appended = programs::append_figure(conn, &program.id, figure_id)?;
            let marked = cache::set_status(conn, &target, figure_id, SuggestionStatus::Accepted)?;

            Ok(AcceptOutcome {
                program_id: program.id,
                entry: appended.entry,
                appended: appended.appended,
                suggestion_marked: marked > 0,
            })
        })?;

        info!(
            learner = %learner_id,
            figure = %figure_id,
            position = outcome.entry.position,
            appended = outcome.appended,
            "Suggestion accepted"
        );
        self.events.emit(EngineEvent::SuggestionAccepted {
            learner_id: learner_id.to_string(),
            figure_id: figure_id.to_string(),
            program_id: outcome.program_id.clone(),
        });

        Ok(outcome)
    }

    /// Mark the learner's row dismissed; returns false when there was no row
    pub fn dismiss(&self, learner_id: &str, figure_id: &str) -> Result<bool, ProgressionError> {
        let target = SuggestionTarget::Learner(learner_id.to_string());
        let marked = self
            .db
            .with_conn(|conn| cache::set_status(conn, &target, figure_id, SuggestionStatus::Dismissed))?;

        if marked > 0 {
            debug!(learner = %learner_id, figure = %figure_id, "Suggestion dismissed");
            self.events.emit(EngineEvent::SuggestionDismissed {
                learner_id: learner_id.to_string(),
                figure_id: figure_id.to_string(),
            });
        }

        Ok(marked > 0)
    }

    /// Mark every pending row past its expiry as expired
    pub fn expire(&self) -> Result<usize, ProgressionError> {
        let count = self.db.with_conn(cache::expire_stale)?;

        if count > 0 {
            info!(count, "Expired stale suggestions");
        }
        self.events.emit(EngineEvent::SuggestionsExpired { count });
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::prerequisites::{self, CreatePrerequisiteInput};
    use crate::db::test_support::add_figure;

    /// rondade ← roulade (w=2), atr (w=3); pirouette ← roulade
    fn setup() -> SuggestionService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(|conn| {
            add_figure(conn, "roulade", 1, 1);
            add_figure(conn, "atr", 2, 1);
            add_figure(conn, "rondade", 3, 1);
            add_figure(conn, "pirouette", 4, 1);
            for (figure, child, weight) in [("rondade", "roulade", 2), ("rondade", "atr", 3), ("pirouette", "roulade", 1)] {
                prerequisites::insert_edge(conn, &CreatePrerequisiteInput {
                    figure_id: figure.into(),
                    prerequisite_id: child.into(),
                    weight,
                    required: true,
                    sort_order: 0,
                })?;
            }
            progressions::enroll(conn, "alice", "roulade")?;
            let row = progressions::find_for_step(conn, "alice", "roulade-1")?
                .ok_or_else(|| ProgressionError::Internal("missing row".into()))?;
            progressions::apply_transition(conn, &row, crate::progression::advance(row.status()?, true), None)?;
            Ok(())
        })
        .unwrap();
        SuggestionService::new(db, Arc::new(EventBus::new()), SuggestionSettings::default())
    }

    fn alice() -> SuggestionTarget {
        SuggestionTarget::Learner("alice".into())
    }

    #[test]
    fn test_refresh_writes_pending_rows() {
        let service = setup();

        let rows = service.refresh(&alice()).unwrap();
        // pirouette 100 qualifies, rondade 40 does not
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].figure_id, "pirouette");
        assert_eq!(rows[0].status, "pending");
        assert_eq!(service.list(&alice()).unwrap().len(), 1);
    }

    #[test]
    fn test_accept_twice_keeps_one_plan_entry() {
        let service = setup();
        service.refresh(&alice()).unwrap();

        let first = service.accept("alice", "pirouette").unwrap();
        let second = service.accept("alice", "pirouette").unwrap();

        assert!(first.appended);
        assert!(first.suggestion_marked);
        assert!(!second.appended);
        assert_eq!(first.program_id, second.program_id);

        let plan = service
            .db
            .with_conn(|conn| programs::list_program_figures(conn, &first.program_id))
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert!(service.list(&alice()).unwrap().is_empty());

        // Assigned figures leave the next refresh
        assert!(service.refresh(&alice()).unwrap().is_empty());
    }

    #[test]
    fn test_accept_unknown_figure() {
        let service = setup();
        assert!(matches!(service.accept("alice", "salto"), Err(ProgressionError::NotFound(_))));
    }

    #[test]
    fn test_dismiss() {
        let service = setup();
        assert!(!service.dismiss("alice", "pirouette").unwrap());

        service.refresh(&alice()).unwrap();
        assert!(service.dismiss("alice", "pirouette").unwrap());
        assert!(service.list(&alice()).unwrap().is_empty());

        // Refresh replaces dismissed rows too
        assert_eq!(service.refresh(&alice()).unwrap().len(), 1);
    }

    #[test]
    fn test_refresh_all_covers_learners_and_groups() {
        let service = setup();
        service
            .db
            .with_conn(|conn| {
                groups::add_member(conn, "g1", "alice")?;
                groups::add_member(conn, "g1", "bob")?;
                Ok(())
            })
            .unwrap();

        let summary = service.refresh_all().unwrap();
        assert_eq!(summary.learners, 1);
        assert_eq!(summary.groups, 1);

        let group_rows = service.list(&SuggestionTarget::Group("g1".into())).unwrap();
        assert_eq!(group_rows.len(), 1);
        assert_eq!(group_rows[0].score, 50);
        assert_eq!(group_rows[0].total_count, 2);
    }

    #[test]
    fn test_expire_with_nothing_stale() {
        let service = setup();
        service.refresh(&alice()).unwrap();
        assert_eq!(service.expire().unwrap(), 0);
    }
}
