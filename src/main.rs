//! homowarp command line entry point

use anyhow::{Context, Result};
use clap::Parser;
use homowarp::{config, image_source, session, viewer};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// homowarp - drag four corners to warp an image in perspective
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path (TOML, optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Window title
    #[arg(short, long)]
    title: Option<String>,

    /// Source image path
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// Output canvas width
    #[arg(long)]
    width: Option<u32>,

    /// Output canvas height
    #[arg(long)]
    height: Option<u32>,

    /// Initial destination quad: x0,y0,x1,y1,x2,y2,x3,y3 (TL, TR, BR, BL)
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    quad: Option<Vec<f64>>,

    /// Borderless fullscreen window
    #[arg(long)]
    fullscreen: bool,

    /// Start with corner markers shown
    #[arg(short, long)]
    markers: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    /// Apply command line overrides on top of the loaded configuration
    fn apply(&self, config: &mut config::Config) -> Result<()> {
        if let Some(title) = &self.title {
            config.window.title = title.clone();
        }
        if let Some(image) = &self.image {
            config.image.path = image.clone();
        }
        if let Some(width) = self.width {
            config.output.width = width;
        }
        if let Some(height) = self.height {
            config.output.height = height;
        }
        if let Some(quad) = &self.quad {
            config.set_destination_flat(quad)?;
        }
        if self.fullscreen {
            config.window.fullscreen = true;
        }
        if self.markers {
            config.view.show_corner_markers = true;
        }
        config.validate()
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    info!("homowarp v{}", env!("CARGO_PKG_VERSION"));

    let mut config = config::Config::load_or_default(args.config.as_deref())?;
    args.apply(&mut config).context("Invalid configuration")?;

    // Fail before any window exists if the image is unusable
    let image = image_source::load(&config.image.path)?;

    info!("Canvas: {}x{}", config.output.width, config.output.height);
    info!(
        "Initial quad: {}",
        config
            .destination
            .iter()
            .map(|p| format!("({}, {})", p.x, p.y))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let session = session::Session::new(&config, image);
    viewer::run(&config, session)?;

    info!("Exiting");
    Ok(())
}
