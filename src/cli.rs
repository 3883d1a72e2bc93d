//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

use crate::images::MANIFEST_FILE;
use crate::params::{AppConfig, ConfigError};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "music-mosaic")]
#[command(about = "Audio-reactive mosaic image visualizer", long_about = None)]
pub struct Args {
    /// JSON array of image paths, relative to the manifest's directory
    #[arg(long, value_name = "FILE", default_value = MANIFEST_FILE)]
    pub manifest: PathBuf,

    /// JSON config file layered over the defaults
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Audio input device id (see --list-devices)
    #[arg(long, value_name = "ID")]
    pub device: Option<String>,

    /// Print available audio input devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Visualize without capturing audio
    #[arg(long)]
    pub no_audio: bool,

    /// Skip the compute renderer
    #[arg(long)]
    pub fallback_renderer: bool,

    /// Seconds each image is shown before transitioning
    #[arg(long, value_name = "SECONDS")]
    pub cycle_seconds: Option<f64>,

    /// Mosaic tile edge in pixels
    #[arg(long, value_name = "PIXELS")]
    pub tile_size: Option<u32>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, value_name = "LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Defaults, then the config file, then flag overrides
    pub fn build_config(&self) -> Result<AppConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(seconds) = self.cycle_seconds {
            config.cycle_seconds = seconds;
        }
        if let Some(size) = self.tile_size {
            config.grid_tile_size = size;
        }

        config.validate()?;
        Ok(config)
    }
}
