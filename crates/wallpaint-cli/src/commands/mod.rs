pub mod cache;
pub mod detect;
pub mod health;
pub mod masks;
pub mod paint;

use anyhow::{Context as _, Result, bail};
use std::path::Path;
use std::sync::Arc;
use wallpaint_application::{DetectionReport, SessionCoordinator};
use wallpaint_core::config::WallPaintConfig;
use wallpaint_core::image::{UploadedImage, decode_data_url};
use wallpaint_interaction::HttpSegmentationService;

/// Resolved configuration and service client shared by all commands.
pub struct Context {
    pub config: WallPaintConfig,
    pub service: Arc<HttpSegmentationService>,
}

impl Context {
    pub fn load(config_path: Option<&Path>, api_url: Option<String>) -> Result<Self> {
        let mut config = WallPaintConfig::load(config_path)?;
        if let Some(url) = api_url {
            config.service.base_url = url;
            config.validate()?;
        }
        let service = Arc::new(HttpSegmentationService::from_config(&config.service)?);
        tracing::debug!("[Cli] Using service at {}", service.base_url());
        Ok(Self { config, service })
    }

    pub fn coordinator(&self) -> Result<SessionCoordinator> {
        Ok(SessionCoordinator::new(
            self.service.clone(),
            self.config.clone(),
        )?)
    }
}

/// Health check, upload and detection of `path`.
pub async fn detect_image(
    coordinator: &SessionCoordinator,
    path: &Path,
) -> Result<DetectionReport> {
    coordinator.check_health().await?;
    let image = UploadedImage::from_path(path).await?;
    coordinator.upload(image).await?;
    match coordinator.detect().await? {
        Some(report) => Ok(report),
        None => bail!("detection of {} was superseded", path.display()),
    }
}

/// Decodes a `data:` URL returned by the service and writes it to `out`.
pub async fn write_data_url(data_url: &str, out: &Path) -> Result<()> {
    let bytes = decode_data_url(data_url)?;
    tokio::fs::write(out, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("✓ Wrote {} ({} bytes)", out.display(), bytes.len());
    Ok(())
}
