//! Detection lifecycle of one uploaded image.

use std::sync::Arc;
use wallpaint_core::error::{FailureKind, Result, ServiceFailure, WallPaintError};
use wallpaint_core::image::ImageHash;
use wallpaint_core::wall::{WallInfo, validate_walls};

/// Where the single detection round trip of an image stands.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionState {
    Idle,
    Detecting {
        generation: u64,
    },
    Detected {
        image_hash: ImageHash,
        walls: Arc<Vec<WallInfo>>,
    },
    Failed {
        kind: FailureKind,
        message: String,
    },
}

impl DetectionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Detecting { .. } => "detecting",
            Self::Detected { .. } => "detected",
            Self::Failed { .. } => "failed",
        }
    }
}

/// State machine `Idle -> Detecting -> Detected | Failed`.
///
/// Every `start` takes a new generation from a counter that never goes
/// backwards. Completions carry the generation they were started with, and
/// anything not matching the current `Detecting` generation is dropped.
#[derive(Debug)]
pub struct DetectionSession {
    state: DetectionState,
    generation: u64,
}

impl Default for DetectionSession {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionSession {
    pub fn new() -> Self {
        Self {
            state: DetectionState::Idle,
            generation: 0,
        }
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    /// Begins a detection round trip and returns its generation.
    ///
    /// Allowed from every state except `Detecting`.
    pub fn start(&mut self) -> Result<u64> {
        if let DetectionState::Detecting { generation } = self.state {
            return Err(WallPaintError::invariant(format!(
                "detection {generation} is still running"
            )));
        }
        self.generation += 1;
        self.state = DetectionState::Detecting {
            generation: self.generation,
        };
        tracing::debug!("[Detection] Started generation {}", self.generation);
        Ok(self.generation)
    }

    /// Applies a successful response.
    ///
    /// Returns `Ok(false)` when the response belongs to a superseded
    /// generation. A response that violates the wall contract moves the
    /// session to `Failed(invalid-response)` and is returned as the error.
    pub fn complete(
        &mut self,
        generation: u64,
        image_hash: ImageHash,
        walls: Vec<WallInfo>,
    ) -> std::result::Result<bool, ServiceFailure> {
        if !self.is_current(generation) {
            tracing::debug!(
                "[Detection] Discarding result of superseded generation {}",
                generation
            );
            return Ok(false);
        }
        if let Err(failure) = validate_walls(&walls) {
            self.fail(generation, failure.clone());
            return Err(failure);
        }

        tracing::info!(
            "[Detection] Generation {} detected {} walls (hash {})",
            generation,
            walls.len(),
            image_hash
        );
        self.state = DetectionState::Detected {
            image_hash,
            walls: Arc::new(walls),
        };
        Ok(true)
    }

    /// Applies a failed response. Returns `false` for superseded generations.
    pub fn fail(&mut self, generation: u64, failure: ServiceFailure) -> bool {
        if !self.is_current(generation) {
            tracing::debug!(
                "[Detection] Discarding failure of superseded generation {}",
                generation
            );
            return false;
        }
        tracing::warn!(
            "[Detection] Generation {} failed: {}",
            generation,
            failure
        );
        self.state = DetectionState::Failed {
            kind: failure.kind,
            message: failure.message,
        };
        true
    }

    /// Returns to `Idle` and invalidates whatever is still in flight.
    pub fn reset(&mut self) {
        if let DetectionState::Detecting { generation } = self.state {
            tracing::debug!("[Detection] Abandoning generation {}", generation);
        }
        self.generation += 1;
        self.state = DetectionState::Idle;
    }

    pub fn image_hash(&self) -> Option<&ImageHash> {
        match &self.state {
            DetectionState::Detected { image_hash, .. } => Some(image_hash),
            _ => None,
        }
    }

    pub fn walls(&self) -> Option<Arc<Vec<WallInfo>>> {
        match &self.state {
            DetectionState::Detected { walls, .. } => Some(Arc::clone(walls)),
            _ => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self.state, DetectionState::Detected { .. })
    }

    pub fn is_detecting(&self) -> bool {
        matches!(self.state, DetectionState::Detecting { .. })
    }

    fn is_current(&self, generation: u64) -> bool {
        matches!(self.state, DetectionState::Detecting { generation: current } if current == generation)
    }
}
