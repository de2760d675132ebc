//! Engine event bus
//!
//! Services publish after their transaction commits. The gamification layer
//! subscribes to `ProgressionChanged`; everything else is audit trail.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Events emitted by services
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    // Progression events
    AttemptRecorded {
        attempt_id: String,
        progression_id: String,
        learner_id: String,
        step_id: String,
        success: bool,
    },
    ProgressionChanged {
        progression_id: String,
        learner_id: String,
        step_id: String,
        from: String,
        to: String,
    },
    LearnerEnrolled {
        learner_id: String,
        figure_id: String,
        step_count: usize,
    },

    // Graph events
    PrerequisiteAdded {
        figure_id: String,
        prerequisite_id: String,
        weight: u32,
    },
    PrerequisiteRemoved {
        figure_id: String,
        prerequisite_id: String,
    },

    // Suggestion cache events
    SuggestionsRefreshed {
        target_kind: String,
        target_id: String,
        count: usize,
    },
    SuggestionAccepted {
        learner_id: String,
        figure_id: String,
        program_id: String,
    },
    SuggestionDismissed {
        learner_id: String,
        figure_id: String,
    },
    SuggestionsExpired {
        count: usize,
    },
}

/// Trait for event listeners
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &EngineEvent);
}

/// Broadcast bus for engine events
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: EngineEvent) {
        trace!(event = ?event, "Emitting engine event");
        // No subscribers is not an error
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Logs progression milestones at debug level, everything else at trace
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &EngineEvent) {
        match event {
            EngineEvent::ProgressionChanged { learner_id, step_id, from, to, .. } => {
                debug!(learner = %learner_id, step = %step_id, from = %from, to = %to, "Progression changed");
            }
            EngineEvent::PrerequisiteAdded { figure_id, prerequisite_id, weight } => {
                debug!(figure = %figure_id, prerequisite = %prerequisite_id, weight, "Prerequisite added");
            }
            EngineEvent::SuggestionsRefreshed { target_kind, target_id, count } => {
                debug!(kind = %target_kind, target = %target_id, count, "Suggestions refreshed");
            }
            EngineEvent::SuggestionAccepted { learner_id, figure_id, .. } => {
                debug!(learner = %learner_id, figure = %figure_id, "Suggestion accepted");
            }
            _ => {
                trace!(event = ?event, "Engine event");
            }
        }
    }
}

/// Spawn a background task that logs all events
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping listener");
                    break;
                }
            }
        }
    })
}
