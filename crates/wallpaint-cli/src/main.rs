use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wallpaint")]
#[command(about = "WallPaint CLI - detect walls once, repaint them many times", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ~/.config/wallpaint/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the segmentation service
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show whether the service is up and its model loaded
    Health,
    /// Detect the walls of an image and list them
    Detect {
        image: PathBuf,
        /// Print the detection report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Paint the walls of an image and write the result
    Paint {
        image: PathBuf,
        #[arg(long, default_value = "#FF5733")]
        color: String,
        #[arg(long, default_value_t = 0.7)]
        opacity: f32,
        #[arg(long)]
        main_walls_only: bool,
        /// Wall ids to paint, comma separated (all walls when omitted)
        #[arg(long, value_delimiter = ',')]
        walls: Option<Vec<usize>>,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Write the detected wall masks as an image
    Masks {
        image: PathBuf,
        #[arg(long, short)]
        out: PathBuf,
    },
    /// Drop the service's cached detections
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let context = commands::Context::load(cli.config.as_deref(), cli.api_url)?;

    match cli.command {
        Commands::Health => commands::health::run(&context).await?,
        Commands::Detect { image, json } => commands::detect::run(&context, &image, json).await?,
        Commands::Paint {
            image,
            color,
            opacity,
            main_walls_only,
            walls,
            out,
        } => {
            let options = commands::paint::PaintOptions {
                color,
                opacity,
                main_walls_only,
                walls,
            };
            commands::paint::run(&context, &image, &options, &out).await?
        }
        Commands::Masks { image, out } => commands::masks::run(&context, &image, &out).await?,
        Commands::ClearCache => commands::cache::clear(&context).await?,
    }

    Ok(())
}
