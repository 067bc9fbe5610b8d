use anyhow::{Result, bail};
use std::path::Path;

use super::{Context, detect_image, write_data_url};

pub struct PaintOptions {
    pub color: String,
    pub opacity: f32,
    pub main_walls_only: bool,
    /// `None` paints every detected wall.
    pub walls: Option<Vec<usize>>,
}

pub async fn run(context: &Context, image: &Path, options: &PaintOptions, out: &Path) -> Result<()> {
    let coordinator = context.coordinator()?;

    // Buffered until detection completes, so the first paint already uses them.
    coordinator.set_color(&options.color).await?;
    coordinator.set_opacity(options.opacity).await?;
    coordinator.set_main_walls_only(options.main_walls_only).await?;

    let report = detect_image(&coordinator, image).await?;
    if report.wall_count == 0 {
        bail!("no walls found in {}", image.display());
    }

    let has_main_wall = coordinator
        .view()
        .await
        .walls
        .iter()
        .any(|wall| wall.is_main());
    if options.main_walls_only && !has_main_wall {
        tracing::warn!("[Cli] No main walls detected; --main-walls-only paints nothing");
    }

    if let Some(wanted) = &options.walls {
        for id in wanted {
            if *id >= report.wall_count {
                tracing::warn!("[Cli] Ignoring unknown wall id {}", id);
            }
        }
        for id in 0..report.wall_count {
            if !wanted.contains(&id) {
                coordinator.toggle_wall(id).await?;
            }
        }
    }

    coordinator.wait_until_settled().await;
    let view = coordinator.view().await;
    if let Some(error) = view.error {
        bail!(error);
    }
    let Some(artifact) = view.artifact else {
        bail!("nothing was painted (no walls selected)");
    };

    if let Some(timings) = view.timings {
        tracing::info!(
            "[Cli] Painted {} walls in {:?} ({} calls)",
            artifact.walls_painted,
            timings.round_trip,
            view.paint_calls
        );
    }
    write_data_url(&artifact.image, out).await
}
