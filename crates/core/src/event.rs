//! Domain event system — decoupled observation of running tasks.
//!
//! The core loop publishes an event at every stage transition and tool
//! dispatch. Front-ends subscribe to show progress without the loop
//! knowing who is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A task entered the core loop
    TaskReceived {
        task_id: String,
        text_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// A task moved to a new stage of the loop
    StageEntered {
        task_id: String,
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// A plan step was dispatched to its tool and returned
    ToolDispatched {
        task_id: String,
        step: usize,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// An episode was written to memory
    EpisodePersisted {
        task_id: String,
        episode_id: String,
        quality_score: f32,
        timestamp: DateTime<Utc>,
    },

    /// An error occurred
    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
