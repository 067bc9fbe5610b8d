//! Boundary to the remote segmentation/paint service.
//!
//! The core never talks HTTP itself. `wallpaint-interaction` provides the
//! real client and tests plug in scripted implementations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

use crate::error::ServiceFailure;
use crate::image::{ImageHash, ImageSize, UploadedImage};
use crate::paint::{HexColor, Opacity, PaintParameters};
use crate::wall::{WallId, WallInfo};

/// Result type of every service call.
pub type ServiceResult<T> = std::result::Result<T, ServiceFailure>;

/// Successful detection as reported by the service.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionOutcome {
    pub image_hash: ImageHash,
    pub walls: Vec<WallInfo>,
    pub image_size: Option<ImageSize>,
    /// The service already had masks cached for this image.
    pub from_cache: bool,
    pub service_time: Option<Duration>,
}

/// Inputs of one paint call, bound to a detected image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaintRequest {
    pub image_hash: ImageHash,
    pub color: HexColor,
    pub opacity: Opacity,
    pub main_walls_only: bool,
    pub wall_ids: BTreeSet<WallId>,
}

impl PaintRequest {
    pub fn new(image_hash: ImageHash, params: &PaintParameters) -> Self {
        Self {
            image_hash,
            color: params.color.clone(),
            opacity: params.opacity,
            main_walls_only: params.main_walls_only,
            wall_ids: params.wall_ids.clone(),
        }
    }
}

/// Successful paint call.
#[derive(Debug, Clone, PartialEq)]
pub struct PaintOutcome {
    /// Painted image as a `data:` URL.
    pub image: String,
    pub walls_painted: usize,
    pub service_time: Option<Duration>,
}

/// Read-only rendering of the detected masks.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskVisualization {
    pub image: String,
    pub walls_found: usize,
}

/// Compute device the service runs its model on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Snapshot of the service's health endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceHealth {
    /// Whether the segmentation model is loaded; `detect` is refused otherwise.
    pub sam_loaded: bool,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
    #[serde(default)]
    pub cached_images: Option<usize>,
}

/// The remote segmentation and compositing service.
#[async_trait]
pub trait SegmentationService: Send + Sync {
    /// Polls whether the model is loaded.
    async fn health(&self) -> ServiceResult<ServiceHealth>;

    /// Segments the image into walls and returns its cache key.
    async fn detect(&self, image: &UploadedImage) -> ServiceResult<DetectionOutcome>;

    /// Paints the selected walls of a previously detected image.
    async fn paint(&self, request: &PaintRequest) -> ServiceResult<PaintOutcome>;

    /// Renders the detected masks of a previously detected image.
    async fn visualize_masks(&self, image_hash: &ImageHash) -> ServiceResult<MaskVisualization>;

    /// Drops the service's mask cache, returning how many images were cached.
    async fn clear_cache(&self) -> ServiceResult<usize>;
}
