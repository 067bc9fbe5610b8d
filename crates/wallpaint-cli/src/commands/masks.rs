use anyhow::Result;
use std::path::Path;

use super::{Context, detect_image, write_data_url};

pub async fn run(context: &Context, image: &Path, out: &Path) -> Result<()> {
    let coordinator = context.coordinator()?;
    detect_image(&coordinator, image).await?;

    let masks = coordinator.visualize_masks().await?;
    println!("Masks for {} walls", masks.walls_found);
    write_data_url(&masks.image, out).await
}
