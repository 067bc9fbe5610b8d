//! Change notifications published by the session coordinator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::error::FailureKind;
use crate::image::{ImageHash, SessionId};
use crate::paint::PaintParameters;
use crate::wall::WallId;

/// What happened inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEventKind {
    ImageUploaded {
        file_name: String,
        bytes: usize,
    },
    DetectionStarted {
        generation: u64,
    },
    DetectionCompleted {
        image_hash: ImageHash,
        wall_count: usize,
        from_cache: bool,
    },
    DetectionFailed {
        kind: FailureKind,
        message: String,
    },
    /// A detection response arrived for a superseded session.
    DetectionDiscarded {
        generation: u64,
    },
    SelectionChanged {
        selected: Vec<WallId>,
    },
    ParametersChanged {
        params: PaintParameters,
    },
    PaintIssued {
        generation: u64,
        params: PaintParameters,
    },
    PaintApplied {
        generation: u64,
        walls_painted: usize,
        round_trip_ms: u64,
    },
    PaintFailed {
        generation: u64,
        kind: FailureKind,
        message: String,
    },
    /// A paint response arrived after a newer call superseded it.
    PaintDiscarded {
        generation: u64,
    },
    ArtifactCleared,
    SessionReset,
}

/// An event stamped with its session and time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session_id: Option<SessionId>,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: SessionEventKind,
}

impl SessionEvent {
    pub fn new(session_id: Option<SessionId>, kind: SessionEventKind) -> Self {
        Self {
            session_id,
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Fan-out of session events to any number of subscribers.
///
/// Subscribers whose receiver was dropped are pruned on the next publish.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<SessionEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    pub fn publish(&self, event: SessionEvent) {
        let mut subscribers = match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.lock() {
            Ok(subscribers) => subscribers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}
