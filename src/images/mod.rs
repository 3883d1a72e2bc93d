//! Image sequence, decoding and cache.

mod loader;
mod placeholder;

use image::RgbaImage;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use loader::{ImageLoader, MANIFEST_FILE};
pub use placeholder::{
    placeholder_seed, placeholder_urls, render_placeholder, PLACEHOLDER_HEIGHT,
    PLACEHOLDER_SCHEME, PLACEHOLDER_WIDTH,
};

/// A decoded RGBA8 image.
///
/// The bitmap is shared: the cache, the director and renderer uploads all
/// hold the same allocation, which is freed when the last holder drops it.
#[derive(Clone, Debug)]
pub struct LoadedImage {
    pub bitmap: Arc<RgbaImage>,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl LoadedImage {
    pub fn new(url: impl Into<String>, bitmap: RgbaImage) -> Self {
        let (width, height) = bitmap.dimensions();
        Self {
            bitmap: Arc::new(bitmap),
            url: url.into(),
            width,
            height,
        }
    }
}

/// Image loading errors
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("No image URLs available")]
    NoImages,

    #[error("Failed to read manifest {path}: {source}")]
    ManifestIo {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    ManifestParse(#[from] serde_json::Error),

    #[error("Failed to load image {url}: {source}")]
    Decode {
        url: String,
        source: image::ImageError,
    },
}

/// Supplier of images for the director.
///
/// `load_next_image` advances the sequence pointer before loading;
/// `preload_next_image` loads the same image without advancing it.
pub trait ImageSource {
    fn load_random_image(&mut self) -> Result<LoadedImage, ImageError>;
    fn load_next_image(&mut self) -> Result<LoadedImage, ImageError>;
    fn preload_next_image(&mut self) -> Result<LoadedImage, ImageError>;
    fn clear_cache(&mut self);
    fn image_count(&self) -> usize;
    fn cache_size(&self) -> usize;
}
