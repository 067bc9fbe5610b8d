//! HttpSegmentationService - JSON/HTTP client for the wall segmentation service.
//!
//! Endpoints:
//! - `GET  /api/health`
//! - `POST /api/detect-walls`
//! - `POST /api/paint-instant`
//! - `POST /api/visualize-masks`
//! - `POST /api/clear-cache`

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use wallpaint_core::config::ServiceConfig;
use wallpaint_core::error::{Result, ServiceFailure, WallPaintError};
use wallpaint_core::image::{ImageHash, ImageSize, UploadedImage};
use wallpaint_core::service::{
    DetectionOutcome, MaskVisualization, PaintOutcome, PaintRequest, SegmentationService,
    ServiceHealth, ServiceResult,
};
use wallpaint_core::wall::{WallInfo, validate_walls};

const HEALTH_PATH: &str = "/api/health";
const DETECT_PATH: &str = "/api/detect-walls";
const PAINT_PATH: &str = "/api/paint-instant";
const VISUALIZE_PATH: &str = "/api/visualize-masks";
const CLEAR_CACHE_PATH: &str = "/api/clear-cache";

/// Segmentation service reached over HTTP.
#[derive(Clone)]
pub struct HttpSegmentationService {
    client: Client,
    base_url: String,
}

impl HttpSegmentationService {
    /// Creates a client with reqwest's default settings.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: normalize_base_url(base_url.into()),
        }
    }

    /// Creates a client honoring the configured timeouts.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .build()
            .map_err(|err| WallPaintError::config(format!("Failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            base_url: normalize_base_url(config.base_url.clone()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ServiceResult<T> {
        let response = self
            .client
            .get(self.endpoint(path))
            .send()
            .await
            .map_err(|err| request_failed(path, err))?;
        Self::read_response(path, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        let response = self
            .client
            .post(self.endpoint(path))
            .json(body)
            .send()
            .await
            .map_err(|err| request_failed(path, err))?;
        Self::read_response(path, response).await
    }

    async fn read_response<T: DeserializeOwned>(
        path: &str,
        response: reqwest::Response,
    ) -> ServiceResult<T> {
        let status = response.status();
        let body = response.text().await.map_err(|err| {
            ServiceFailure::network(format!("Failed to read response from {path}: {err}"))
        })?;
        decode_body(status, &body)
    }
}

#[async_trait]
impl SegmentationService for HttpSegmentationService {
    async fn health(&self) -> ServiceResult<ServiceHealth> {
        self.get_json(HEALTH_PATH).await
    }

    async fn detect(&self, image: &UploadedImage) -> ServiceResult<DetectionOutcome> {
        tracing::debug!(
            "[Service] POST {} ({}, {} bytes)",
            DETECT_PATH,
            image.file_name,
            image.bytes.len()
        );
        let body = DetectRequest {
            image: image.to_data_url(),
        };
        let response: DetectResponse = self.post_json(DETECT_PATH, &body).await?;
        response.into_outcome()
    }

    async fn paint(&self, request: &PaintRequest) -> ServiceResult<PaintOutcome> {
        let body = PaintBody::from(request);
        tracing::debug!(
            "[Service] POST {} color={} opacity={} walls={}",
            PAINT_PATH,
            body.color,
            body.opacity,
            body.wall_ids.len()
        );
        let response: PaintResponse = self.post_json(PAINT_PATH, &body).await?;
        response.into_outcome()
    }

    async fn visualize_masks(&self, image_hash: &ImageHash) -> ServiceResult<MaskVisualization> {
        let body = VisualizeBody {
            image_hash: image_hash.as_str(),
        };
        let response: VisualizeResponse = self.post_json(VISUALIZE_PATH, &body).await?;
        response.into_outcome()
    }

    async fn clear_cache(&self) -> ServiceResult<usize> {
        let response: ClearCacheResponse = self
            .post_json(CLEAR_CACHE_PATH, &serde_json::json!({}))
            .await?;
        Ok(response.cleared_count())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Serialize)]
struct DetectRequest {
    image: String,
}

#[derive(Debug, Serialize)]
struct PaintBody<'a> {
    image_hash: &'a str,
    wall_ids: Vec<usize>,
    color: &'a str,
    opacity: f32,
    #[serde(rename = "mainWallsOnly")]
    main_walls_only: bool,
}

impl<'a> From<&'a PaintRequest> for PaintBody<'a> {
    fn from(request: &'a PaintRequest) -> Self {
        Self {
            image_hash: request.image_hash.as_str(),
            wall_ids: request.wall_ids.iter().copied().collect(),
            color: request.color.as_str(),
            opacity: request.opacity.value(),
            main_walls_only: request.main_walls_only,
        }
    }
}

#[derive(Serialize)]
struct VisualizeBody<'a> {
    image_hash: &'a str,
}

/// Fields every service response may carry.
#[derive(Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct DetectResponse {
    image_hash: Option<String>,
    wall_info: Option<Vec<WallInfo>>,
    #[serde(default)]
    walls_detected: Option<usize>,
    #[serde(default)]
    image_size: Option<ImageSize>,
    #[serde(default)]
    from_cache: bool,
    #[serde(default)]
    processing_time: Option<f64>,
}

impl DetectResponse {
    fn into_outcome(self) -> ServiceResult<DetectionOutcome> {
        let image_hash = self
            .image_hash
            .filter(|hash| !hash.trim().is_empty())
            .ok_or_else(|| ServiceFailure::invalid_response("detection response has no image_hash"))?;
        let walls = self
            .wall_info
            .ok_or_else(|| ServiceFailure::invalid_response("detection response has no wall_info"))?;

        if let Some(count) = self.walls_detected {
            if count != walls.len() {
                return Err(ServiceFailure::invalid_response(format!(
                    "walls_detected is {} but wall_info has {} entries",
                    count,
                    walls.len()
                )));
            }
        }
        validate_walls(&walls)?;

        Ok(DetectionOutcome {
            image_hash: ImageHash::new(image_hash),
            walls,
            image_size: self.image_size,
            from_cache: self.from_cache,
            service_time: self.processing_time.and_then(seconds),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaintResponse {
    result_image: Option<String>,
    #[serde(default)]
    walls_painted: usize,
    #[serde(default)]
    processing_time: Option<f64>,
}

impl PaintResponse {
    fn into_outcome(self) -> ServiceResult<PaintOutcome> {
        let image = self
            .result_image
            .filter(|image| !image.is_empty())
            .ok_or_else(|| ServiceFailure::invalid_response("paint response has no result_image"))?;
        Ok(PaintOutcome {
            image,
            walls_painted: self.walls_painted,
            service_time: self.processing_time.and_then(seconds),
        })
    }
}

#[derive(Deserialize)]
struct VisualizeResponse {
    visualization: Option<String>,
    #[serde(default)]
    walls_found: usize,
}

impl VisualizeResponse {
    fn into_outcome(self) -> ServiceResult<MaskVisualization> {
        let image = self.visualization.ok_or_else(|| {
            ServiceFailure::invalid_response("mask response has no visualization")
        })?;
        Ok(MaskVisualization {
            image,
            walls_found: self.walls_found,
        })
    }
}

#[derive(Deserialize)]
struct ClearCacheResponse {
    #[serde(default)]
    cleared: Option<usize>,
    #[serde(default)]
    message: Option<String>,
}

impl ClearCacheResponse {
    /// The service reports the count only inside its message ("Cleared 3 cached images").
    fn cleared_count(&self) -> usize {
        self.cleared
            .or_else(|| {
                self.message
                    .as_deref()?
                    .split_whitespace()
                    .find_map(|word| word.parse().ok())
            })
            .unwrap_or(0)
    }
}

// ============================================================================
// Response classification
// ============================================================================

/// Classifies an HTTP response body.
///
/// - non-2xx: `service-error`, message from the `error` field when present
/// - `success: false`: `service-error`
/// - unparsable body or missing fields: `invalid-response`
fn decode_body<T: DeserializeOwned>(status: StatusCode, body: &str) -> ServiceResult<T> {
    let envelope = serde_json::from_str::<StatusEnvelope>(body).ok();

    if !status.is_success() {
        let message = envelope
            .and_then(|env| env.error)
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), truncate(body, 200)));
        return Err(ServiceFailure::service_error(message));
    }

    let envelope = envelope.ok_or_else(|| {
        ServiceFailure::invalid_response(format!("response is not a JSON object: {}", truncate(body, 200)))
    })?;
    if envelope.success == Some(false) {
        return Err(ServiceFailure::service_error(
            envelope
                .error
                .unwrap_or_else(|| "service reported failure without a message".to_string()),
        ));
    }

    serde_json::from_str(body).map_err(|err| {
        ServiceFailure::invalid_response(format!("Failed to parse service response: {err}"))
    })
}

fn request_failed(path: &str, err: reqwest::Error) -> ServiceFailure {
    let reason = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "could not connect"
    } else {
        "request failed"
    };
    ServiceFailure::network(format!("{path} {reason}: {err}"))
}

fn normalize_base_url(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
