use anyhow::Result;
use wallpaint_core::service::SegmentationService;

use super::Context;

pub async fn run(context: &Context) -> Result<()> {
    let health = context.service.health().await?;

    println!("Service:       {}", context.service.base_url());
    println!("Status:        {}", health.status.as_deref().unwrap_or("unknown"));
    println!("Model loaded:  {}", if health.sam_loaded { "yes" } else { "no" });
    if let Some(device) = &health.device {
        match &device.name {
            Some(name) => println!("Device:        {} ({})", device.kind, name),
            None => println!("Device:        {}", device.kind),
        }
    }
    if let Some(cached) = health.cached_images {
        println!("Cached images: {}", cached);
    }
    Ok(())
}
