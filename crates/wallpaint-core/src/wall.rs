//! Detected wall segments.

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::error::ServiceFailure;

/// Positional index of a wall inside one detection result.
pub type WallId = usize;

/// Classification assigned to a wall segment by the segmentation service.
///
/// The service reports `main_wall`, `accent_wall` or `background`; the bare
/// names are accepted too. Anything else is `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase", from = "String")]
#[strum(serialize_all = "lowercase")]
pub enum WallType {
    Main,
    Accent,
    #[default]
    Other,
}

impl From<String> for WallType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "main_wall" | "main" => Self::Main,
            "accent_wall" | "accent" => Self::Accent,
            _ => Self::Other,
        }
    }
}

/// One detected wall segment.
///
/// Created in bulk when a detection completes and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WallInfo {
    pub id: WallId,
    #[serde(default)]
    pub wall_type: WallType,
    /// Segment area in pixels.
    pub area: u64,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    /// Share of the image covered by the segment, in `[0, 100]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_percentage: Option<f32>,
    /// Bounding box `[x, y, width, height]` in original image pixels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<[i64; 4]>,
}

impl WallInfo {
    pub fn is_main(&self) -> bool {
        self.wall_type == WallType::Main
    }
}

/// Checks a freshly detected wall list against the detection contract.
///
/// Ids must be `0..n-1` in result order, confidences in `[0, 1]` and area
/// percentages in `[0, 100]`.
pub fn validate_walls(walls: &[WallInfo]) -> Result<(), ServiceFailure> {
    for (position, wall) in walls.iter().enumerate() {
        if wall.id != position {
            return Err(ServiceFailure::invalid_response(format!(
                "wall at position {} has id {}",
                position, wall.id
            )));
        }
        if !(0.0..=1.0).contains(&wall.confidence) {
            return Err(ServiceFailure::invalid_response(format!(
                "wall {} has confidence {} outside [0, 1]",
                wall.id, wall.confidence
            )));
        }
        if let Some(pct) = wall.area_percentage {
            if !(0.0..=100.0).contains(&pct) {
                return Err(ServiceFailure::invalid_response(format!(
                    "wall {} has area percentage {} outside [0, 100]",
                    wall.id, pct
                )));
            }
        }
    }
    Ok(())
}
