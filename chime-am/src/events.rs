//! Manager event types
//!
//! Lifecycle notifications broadcast to any number of subscribers. Events
//! are informational: a send with no subscribers is not an error.

use crate::manager::backend::BackendKind;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// How a playback session finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "lowercase")]
pub enum PlaybackOutcome {
    Ended,
    Failed(String),
}

/// Audio manager events
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ManagerEvent {
    /// Backend chosen during initialization
    BackendSelected {
        backend: BackendKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A resource finished loading and is now cached
    ClipLoaded {
        id: String,
        backend: BackendKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A resource failed to load (not cached, may be retried)
    LoadFailed {
        id: String,
        error: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback session started (or was scheduled on the precise engine)
    PlaybackStarted {
        session_id: Uuid,
        id: String,
        backend: BackendKind,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A playback session settled
    PlaybackEnded {
        session_id: Uuid,
        id: String,
        outcome: PlaybackOutcome,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

/// Broadcast fan-out for [`ManagerEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ManagerEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: ManagerEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}
