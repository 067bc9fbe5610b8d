//! Paint parameters and painted results.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, WallPaintError};
use crate::wall::WallId;

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#?([0-9A-Fa-f]{6})$").expect("static regex is valid"));

/// Default paint color used by the service when none is given.
pub const DEFAULT_COLOR: &str = "#FF5733";
/// Default paint opacity.
pub const DEFAULT_OPACITY: f32 = 0.7;

/// An `#RRGGBB` color, normalized to upper case with a leading `#`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HexColor(String);

impl HexColor {
    pub fn parse(input: &str) -> Result<Self> {
        let captures = HEX_COLOR.captures(input.trim()).ok_or_else(|| {
            WallPaintError::invalid_parameter(format!("'{input}' is not an #RRGGBB color"))
        })?;
        Ok(Self(format!("#{}", captures[1].to_uppercase())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for HexColor {
    fn default() -> Self {
        Self(DEFAULT_COLOR.to_string())
    }
}

impl FromStr for HexColor {
    type Err = WallPaintError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HexColor {
    type Error = WallPaintError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<HexColor> for String {
    fn from(color: HexColor) -> Self {
        color.0
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Paint opacity, always within `[0.1, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Opacity(f32);

impl Opacity {
    pub const MIN: f32 = 0.1;
    pub const MAX: f32 = 1.0;

    /// Clamps `value` into range. Non-finite values are rejected.
    pub fn new(value: f32) -> Result<Self> {
        if !value.is_finite() {
            return Err(WallPaintError::invalid_parameter(format!(
                "opacity {value} is not a finite number"
            )));
        }
        Ok(Self(value.clamp(Self::MIN, Self::MAX)))
    }

    pub fn value(self) -> f32 {
        self.0
    }
}

impl Default for Opacity {
    fn default() -> Self {
        Self(DEFAULT_OPACITY)
    }
}

impl TryFrom<f32> for Opacity {
    type Error = WallPaintError;

    fn try_from(value: f32) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Opacity> for f32 {
    fn from(opacity: Opacity) -> Self {
        opacity.0
    }
}

/// The continuous paint settings the user adjusts with sliders and swatches.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaintSettings {
    pub color: HexColor,
    pub opacity: Opacity,
    pub main_walls_only: bool,
}

/// Everything a paint call depends on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PaintParameters {
    pub color: HexColor,
    pub opacity: Opacity,
    pub main_walls_only: bool,
    pub wall_ids: BTreeSet<WallId>,
}

impl PaintParameters {
    pub fn new(settings: &PaintSettings, wall_ids: BTreeSet<WallId>) -> Self {
        Self {
            color: settings.color.clone(),
            opacity: settings.opacity,
            main_walls_only: settings.main_walls_only,
            wall_ids,
        }
    }

    pub fn has_walls(&self) -> bool {
        !self.wall_ids.is_empty()
    }
}

/// The composited image returned by a paint call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaintedArtifact {
    /// `data:image/jpeg;base64,...` URL of the painted image.
    pub image: String,
    pub walls_painted: usize,
    /// Parameters of the call that produced this artifact.
    pub params: PaintParameters,
}

/// Timing of one completed paint round trip.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaintTimings {
    /// Wall-clock time from issuing the request to receiving the response.
    pub round_trip: Duration,
    /// Processing time reported by the service itself.
    pub service_time: Option<Duration>,
}
