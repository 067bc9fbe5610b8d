//! Clients for the remote wall segmentation service.

pub mod http_service;

pub use http_service::HttpSegmentationService;
