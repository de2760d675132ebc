//! Readiness service - scoring and live suggestion lists
//!
//! Every call loads the graph and learner progress inside one read
//! transaction, so a pass never mixes two database states.

use std::sync::Arc;

use diesel::SqliteConnection;
use tracing::debug;

use crate::config::SuggestionSettings;
use crate::db::{groups, programs, Database};
use crate::error::ProgressionError;
use crate::graph::PrerequisiteGraph;
use crate::readiness::{score_figure, LearnerProgress, ReadinessScore};
use crate::suggestions::{
    suggest_for_group, suggest_for_learner, GroupSuggestion, IndividualSuggestion, LearnerContext,
    RankOptions,
};

pub struct ReadinessService {
    db: Arc<Database>,
    settings: SuggestionSettings,
}

impl ReadinessService {
    pub fn new(db: Arc<Database>, settings: SuggestionSettings) -> Self {
        Self { db, settings }
    }

    /// Weighted readiness of `learner_id` for `figure_id`
    pub fn score(&self, learner_id: &str, figure_id: &str) -> Result<ReadinessScore, ProgressionError> {
        let score = self.db.transaction(|conn| {
            let graph = PrerequisiteGraph::load(conn)?;
            let progress = LearnerProgress::load(conn, learner_id)?;
            score_figure(&graph, figure_id, &progress)
        })?;

        debug!(learner = %learner_id, figure = %figure_id, score = score.score, "Readiness scored");
        Ok(score)
    }

    /// Individual suggestions; `None` uses the configured threshold and limit
    pub fn suggest_for_learner(
        &self,
        learner_id: &str,
        options: Option<RankOptions>,
    ) -> Result<Vec<IndividualSuggestion>, ProgressionError> {
        let options = options.unwrap_or_else(|| {
            RankOptions::new(self.settings.individual_threshold, self.settings.individual_limit)
        });

        self.db.transaction(|conn| {
            let graph = PrerequisiteGraph::load(conn)?;
            let learner = load_learner(conn, learner_id)?;
            Ok(suggest_for_learner(&graph, &learner, options))
        })
    }

    /// Group suggestions; `None` uses the configured threshold and limit
    pub fn suggest_for_group(
        &self,
        group_id: &str,
        options: Option<RankOptions>,
    ) -> Result<Vec<GroupSuggestion>, ProgressionError> {
        let options = options.unwrap_or_else(|| {
            RankOptions::new(self.settings.group_threshold, self.settings.group_limit)
        });
        let ready_threshold = self.settings.ready_threshold;

        self.db.transaction(|conn| {
            let graph = PrerequisiteGraph::load(conn)?;
            let members = load_group(conn, group_id)?;
            Ok(suggest_for_group(&graph, &members, ready_threshold, options))
        })
    }
}

/// Progress and assigned figures of one learner
pub(crate) fn load_learner(conn: &mut SqliteConnection, learner_id: &str) -> Result<LearnerContext, ProgressionError> {
    Ok(LearnerContext {
        progress: LearnerProgress::load(conn, learner_id)?,
        assigned: programs::assigned_figure_ids(conn, learner_id)?,
    })
}

/// Contexts of every member of a group; an unknown group has no members
pub(crate) fn load_group(conn: &mut SqliteConnection, group_id: &str) -> Result<Vec<LearnerContext>, ProgressionError> {
    groups::member_ids(conn, group_id)?
        .iter()
        .map(|learner_id| load_learner(conn, learner_id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::prerequisites::{self, CreatePrerequisiteInput};
    use crate::db::progressions;
    use crate::db::test_support::add_figure;
    use crate::db::models::ProgressionStatus;
    use crate::progression::Transition;

    /// rondade ← roulade (w=2), atr (w=3); one step each
    fn setup() -> ReadinessService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        db.with_conn(|conn| {
            add_figure(conn, "roulade", 1, 1);
            add_figure(conn, "atr", 2, 1);
            add_figure(conn, "rondade", 3, 1);
            for (child, weight, order) in [("roulade", 2, 0), ("atr", 3, 1)] {
                prerequisites::insert_edge(conn, &CreatePrerequisiteInput {
                    figure_id: "rondade".into(),
                    prerequisite_id: child.into(),
                    weight,
                    required: true,
                    sort_order: order,
                })?;
            }
            Ok(())
        })
        .unwrap();
        ReadinessService::new(db, SuggestionSettings::default())
    }

    fn validate(service: &ReadinessService, learner: &str, figure: &str) {
        service
            .db
            .with_conn(|conn| {
                let result = match progressions::enroll(conn, learner, figure) {
                    Ok(result) => result.created,
                    Err(ProgressionError::Conflict(_)) => progressions::list_for_figure(conn, learner, figure)?,
                    Err(e) => return Err(e),
                };
                for row in &result {
                    let transition = Transition {
                        from: row.status()?,
                        to: ProgressionStatus::Valide,
                        success: true,
                    };
                    progressions::apply_transition(conn, row, transition, None)?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_score_uses_weights() {
        let service = setup();
        validate(&service, "alice", "roulade");

        let score = service.score("alice", "rondade").unwrap();
        assert_eq!(score.score, 40);
        assert_eq!((score.validated_count, score.total_count), (1, 2));

        assert!(matches!(service.score("alice", "salto"), Err(ProgressionError::NotFound(_))));
    }

    #[test]
    fn test_default_threshold_applies() {
        let service = setup();
        validate(&service, "alice", "roulade");

        assert!(service.suggest_for_learner("alice", None).unwrap().is_empty());
        let relaxed = service.suggest_for_learner("alice", Some(RankOptions::new(40, 5))).unwrap();
        assert_eq!(relaxed.len(), 1);
        assert_eq!(relaxed[0].figure_id, "rondade");
    }

    #[test]
    fn test_group_suggestions() {
        let service = setup();
        service
            .db
            .with_conn(|conn| {
                for learner in ["alice", "bob"] {
                    groups::add_member(conn, "g1", learner)?;
                }
                Ok(())
            })
            .unwrap();
        validate(&service, "alice", "roulade");
        validate(&service, "alice", "atr");

        let list = service.suggest_for_group("g1", None).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].percentage, 50);
        assert!(service.suggest_for_group("nobody", None).unwrap().is_empty());
    }
}
