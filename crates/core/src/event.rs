//! Agent events: what the turn loop reports while it runs.
//!
//! Events are published on a broadcast [`EventBus`]; a UI subscribes to
//! render progress without being coupled to the loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::tool::ToolStatus;

/// The turn loop's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    AwaitingModel,
    DispatchingTools,
    Done,
    Cancelled,
}

/// All events the agent publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    TurnStarted {
        conversation_id: String,
        input: String,
        timestamp: DateTime<Utc>,
    },

    StateChanged { state: TurnState },

    /// Text the model produced in one round
    AssistantText { model: String, text: String },

    ToolStarted { call_id: String, tool_name: String },

    ToolFinished {
        call_id: String,
        tool_name: String,
        status: ToolStatus,
        duration_ms: u64,
    },

    TurnCompleted {
        conversation_id: String,
        round_trips: usize,
        timestamp: DateTime<Utc>,
    },

    TurnFailed {
        conversation_id: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Arc<AgentEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: AgentEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<AgentEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
