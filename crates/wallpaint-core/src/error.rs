//! Error types for the WallPaint session core.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// Why a round trip to the segmentation service failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum FailureKind {
    /// Transport failure or timeout; the service was never heard from.
    Network,
    /// The service answered with a non-success status or `success: false`.
    ServiceError,
    /// The body could not be parsed or violated the response contract.
    InvalidResponse,
}

/// Failure reported by a `SegmentationService` implementation.
///
/// The coordinator maps this into [`WallPaintError::DetectionFailed`] or
/// [`WallPaintError::PaintFailed`] depending on which call produced it.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ServiceFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ServiceFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, message)
    }

    pub fn service_error(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ServiceError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidResponse, message)
    }
}

/// A shared error type for the whole WallPaint workspace.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum WallPaintError {
    /// Upload validation rejected the file (size, type, empty body).
    #[error("Upload rejected: {0}")]
    UploadRejected(String),

    /// The detection round trip failed.
    #[error("Detection failed ({kind}): {message}")]
    DetectionFailed { kind: FailureKind, message: String },

    /// A paint round trip failed.
    #[error("Paint failed ({kind}): {message}")]
    PaintFailed { kind: FailureKind, message: String },

    /// A user-supplied parameter could not be accepted.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The operation's precondition is not met yet (no image, not detected, ...).
    #[error("Not ready: {0}")]
    NotReady(String),

    /// Any other service round trip failed (health, masks, cache).
    #[error("Service call failed ({kind}): {message}")]
    ServiceCall { kind: FailureKind, message: String },

    /// The remote service reported its model is not loaded.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal state contradiction. Gating should make this unreachable.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization { format: String, message: String },
}

impl WallPaintError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    pub fn upload_rejected(message: impl Into<String>) -> Self {
        Self::UploadRejected(message.into())
    }

    pub fn detection_failed(failure: ServiceFailure) -> Self {
        Self::DetectionFailed {
            kind: failure.kind,
            message: failure.message,
        }
    }

    pub fn paint_failed(failure: ServiceFailure) -> Self {
        Self::PaintFailed {
            kind: failure.kind,
            message: failure.message,
        }
    }

    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Detection and paint failures are transient; the user may simply retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::DetectionFailed { .. } | Self::PaintFailed { .. })
    }

    pub fn is_upload_rejected(&self) -> bool {
        matches!(self, Self::UploadRejected(_))
    }

    pub fn is_not_ready(&self) -> bool {
        matches!(self, Self::NotReady(_))
    }

    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvariantViolation(_))
    }

    /// Returns the failure kind for errors that came from the service.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::DetectionFailed { kind, .. }
            | Self::PaintFailed { kind, .. }
            | Self::ServiceCall { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<ServiceFailure> for WallPaintError {
    fn from(failure: ServiceFailure) -> Self {
        Self::ServiceCall {
            kind: failure.kind,
            message: failure.message,
        }
    }
}

impl From<std::io::Error> for WallPaintError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for WallPaintError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

impl From<toml::de::Error> for WallPaintError {
    fn from(err: toml::de::Error) -> Self {
        Self::Serialization {
            format: "TOML".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, WallPaintError>`.
pub type Result<T> = std::result::Result<T, WallPaintError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_failure_kind_renders_kebab_case() {
        assert_eq!(FailureKind::Network.to_string(), "network");
        assert_eq!(FailureKind::ServiceError.to_string(), "service-error");
        assert_eq!(FailureKind::InvalidResponse.to_string(), "invalid-response");
        assert_eq!(
            FailureKind::from_str("service-error").unwrap(),
            FailureKind::ServiceError
        );
    }

    #[test]
    fn test_service_failure_maps_to_detection_and_paint() {
        let failure = ServiceFailure::service_error("SAM model not loaded");

        let detection = WallPaintError::detection_failed(failure.clone());
        assert!(detection.is_retryable());
        assert_eq!(detection.failure_kind(), Some(FailureKind::ServiceError));
        assert_eq!(
            detection.to_string(),
            "Detection failed (service-error): SAM model not loaded"
        );

        let paint = WallPaintError::paint_failed(failure);
        assert!(matches!(paint, WallPaintError::PaintFailed { .. }));
    }

    #[test]
    fn test_invariant_violation_is_not_retryable() {
        let err = WallPaintError::invariant("paint without image hash");
        assert!(err.is_invariant_violation());
        assert!(!err.is_retryable());
        assert_eq!(err.failure_kind(), None);
    }

    #[test]
    fn test_other_service_failures_convert_to_service_call() {
        let err: WallPaintError = ServiceFailure::network("connection refused").into();
        assert_eq!(err.failure_kind(), Some(FailureKind::Network));
        assert!(!err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Service call failed (network): connection refused"
        );
    }

    #[test]
    fn test_io_conversion_keeps_kind() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.jpg");
        let err: WallPaintError = io.into();
        match err {
            WallPaintError::Io { message } => assert!(message.contains("NotFound")),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
