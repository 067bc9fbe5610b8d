use anyhow::Result;
use wallpaint_core::service::SegmentationService;

use super::Context;

pub async fn clear(context: &Context) -> Result<()> {
    let cleared = context.service.clear_cache().await?;
    println!("✓ Cleared {} cached images", cleared);
    Ok(())
}
