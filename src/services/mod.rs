//! Service layer for circus-progression
//!
//! Services wrap repository calls with:
//! - Input validation
//! - Transaction boundaries
//! - Event emission after commit
//!
//! ## Architecture
//!
//! ```text
//! CLI / presentation layer
//!     ↓
//! Service Layer (orchestration)
//!     ↓
//! Engine (progression, graph, readiness, suggestions) + Repositories (db/*.rs)
//!     ↓
//! SQLite Database
//! ```

pub mod events;
pub mod attempt_service;
pub mod graph_service;
pub mod readiness_service;
pub mod suggestion_service;

pub use events::{spawn_logging_listener, EngineEvent, EventBus, EventListener};
pub use attempt_service::{AttemptOutcome, AttemptService, HistoryEntry};
pub use graph_service::GraphService;
pub use readiness_service::ReadinessService;
pub use suggestion_service::{AcceptOutcome, RefreshSummary, SuggestionService};

use std::sync::Arc;

use crate::config::SuggestionSettings;
use crate::db::Database;

/// Service container sharing one database and one event bus
pub struct Services {
    pub attempts: Arc<AttemptService>,
    pub graph: Arc<GraphService>,
    pub readiness: Arc<ReadinessService>,
    pub suggestions: Arc<SuggestionService>,
    pub events: Arc<EventBus>,
    pub db: Arc<Database>,
}

impl Services {
    pub fn new(db: Arc<Database>, settings: SuggestionSettings) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            attempts: Arc::new(AttemptService::new(db.clone(), events.clone())),
            graph: Arc::new(GraphService::new(db.clone(), events.clone())),
            readiness: Arc::new(ReadinessService::new(db.clone(), settings.clone())),
            suggestions: Arc::new(SuggestionService::new(db.clone(), events.clone(), settings)),
            events,
            db,
        }
    }
}
