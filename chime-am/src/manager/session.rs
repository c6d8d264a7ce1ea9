//! Playback sessions
//!
//! A session covers one attempted playback: it starts pending and settles
//! exactly once, at which point the caller's completion callback runs.

use crate::events::{EventBus, ManagerEvent, PlaybackOutcome};
use crate::manager::backend::BackendKind;
use tracing::debug;
use uuid::Uuid;

/// Completion callback supplied with a play request
pub type EndCallback = Box<dyn FnOnce() + Send + 'static>;

pub(crate) struct PlaybackSession {
    id: Uuid,
    resource: String,
    backend: BackendKind,
    on_end: Option<EndCallback>,
    settled: bool,
    events: EventBus,
}

impl PlaybackSession {
    pub(crate) fn new(
        resource: &str,
        backend: BackendKind,
        on_end: Option<EndCallback>,
        events: EventBus,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource: resource.to_string(),
            backend,
            on_end,
            settled: false,
            events,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn started(&self) {
        debug!(session = %self.id, "Playback of {} started on {}", self.resource, self.backend);
        self.events.emit(ManagerEvent::PlaybackStarted {
            session_id: self.id,
            id: self.resource.clone(),
            backend: self.backend,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Settle the session. Returns false if it had already settled.
    pub(crate) fn settle(&mut self, outcome: PlaybackOutcome) -> bool {
        if self.settled {
            return false;
        }
        self.settled = true;

        debug!(session = %self.id, "Playback of {} settled: {:?}", self.resource, outcome);
        if let Some(on_end) = self.on_end.take() {
            on_end();
        }
        self.events.emit(ManagerEvent::PlaybackEnded {
            session_id: self.id,
            id: self.resource.clone(),
            outcome,
            timestamp: chrono::Utc::now(),
        });
        true
    }
}
