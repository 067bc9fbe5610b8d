use anyhow::Result;
use std::path::Path;

use super::{Context, detect_image};

pub async fn run(context: &Context, image: &Path, json: bool) -> Result<()> {
    let coordinator = context.coordinator()?;
    let report = detect_image(&coordinator, image).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let view = coordinator.view().await;
    println!(
        "Detected {} walls in {:?}{}",
        report.wall_count,
        report.round_trip,
        if report.from_cache { " (cached)" } else { "" }
    );
    println!("Image hash: {}", report.image_hash);
    println!(
        "Main walls: {}",
        view.walls.iter().filter(|wall| wall.is_main()).count()
    );
    if let Some(size) = report.image_size {
        println!("Image size: {}x{}", size.width, size.height);
    }
    if let Some(notice) = &view.notice {
        println!("{}", notice);
        return Ok(());
    }

    println!();
    println!("{:>4}  {:<7}  {:>10}  {:>7}  {:>10}", "ID", "TYPE", "AREA", "AREA %", "CONFIDENCE");
    for wall in view.walls.iter() {
        let percentage = wall
            .area_percentage
            .map(|p| format!("{:.1}", p))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:>4}  {:<7}  {:>10}  {:>7}  {:>10.2}",
            wall.id,
            wall.wall_type.to_string(),
            wall.area,
            percentage,
            wall.confidence
        );
    }
    Ok(())
}
