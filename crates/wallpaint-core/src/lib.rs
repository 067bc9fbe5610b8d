pub mod config;
pub mod error;
pub mod event;
pub mod image;
pub mod paint;
pub mod service;
pub mod wall;

// Re-export common error type
pub use error::{FailureKind, ServiceFailure, WallPaintError};
