//! Manifest-driven image loader with a bounded decode cache.

use image::imageops::FilterType;
use image::RgbaImage;
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::placeholder::{
    placeholder_seed, placeholder_urls, render_placeholder, PLACEHOLDER_HEIGHT, PLACEHOLDER_WIDTH,
};
use super::{ImageError, ImageSource, LoadedImage};

/// Default manifest name, looked up in the working directory
pub const MANIFEST_FILE: &str = "images.json";

/// Loads images from a list of paths (or placeholder URLs).
///
/// Relative manifest entries resolve against the manifest's directory.
pub struct ImageLoader {
    urls: Vec<String>,
    base_dir: PathBuf,
    current_index: usize,

    cache: HashMap<String, LoadedImage>,
    /// Insertion order for FIFO eviction
    cache_order: VecDeque<String>,
    capacity: usize,

    max_side: u32,
    placeholder_size: (u32, u32),
}

impl ImageLoader {
    pub fn new(urls: Vec<String>, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            urls,
            base_dir: base_dir.into(),
            current_index: 0,
            cache: HashMap::new(),
            cache_order: VecDeque::new(),
            capacity: 8,
            max_side: 2048,
            placeholder_size: (PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT),
        }
    }

    /// Read `path` as a JSON array of image paths.
    ///
    /// An unreadable, malformed or empty manifest is logged and replaced by
    /// the built-in placeholder list.
    pub fn from_manifest(path: &Path) -> Self {
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        match read_manifest(path) {
            Ok(urls) if !urls.is_empty() => {
                info!("Loaded {} image URLs from {}", urls.len(), path.display());
                Self::new(urls, base_dir)
            }
            Ok(_) => {
                warn!("Manifest {} is empty, using placeholders", path.display());
                Self::new(placeholder_urls(), base_dir)
            }
            Err(e) => {
                error!("Error loading image URLs: {}", e);
                Self::new(placeholder_urls(), base_dir)
            }
        }
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn with_max_side(mut self, max_side: u32) -> Self {
        self.max_side = max_side.max(1);
        self
    }

    pub fn with_placeholder_size(mut self, width: u32, height: u32) -> Self {
        self.placeholder_size = (width.max(1), height.max(1));
        self
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    /// Load `url`, serving from the cache when possible
    pub fn load_image(&mut self, url: &str) -> Result<LoadedImage, ImageError> {
        if let Some(image) = self.cache.get(url) {
            return Ok(image.clone());
        }

        debug!("Loading image: {}", url);
        let bitmap = match placeholder_seed(url) {
            Some(seed) => {
                let (w, h) = self.placeholder_size;
                render_placeholder(seed, w, h)
            }
            None => self.decode_file(url)?,
        };

        let bitmap = fit_within(bitmap, self.max_side);
        let image = LoadedImage::new(url, bitmap);
        info!("Image loaded: {} ({}x{})", url, image.width, image.height);

        self.insert(image.clone());
        Ok(image)
    }

    fn decode_file(&self, url: &str) -> Result<RgbaImage, ImageError> {
        let path = self.resolve(url);
        let decoded = image::open(&path).map_err(|source| ImageError::Decode {
            url: url.to_string(),
            source,
        })?;
        Ok(decoded.into_rgba8())
    }

    fn resolve(&self, url: &str) -> PathBuf {
        let path = Path::new(url);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn insert(&mut self, image: LoadedImage) {
        while self.cache.len() >= self.capacity {
            let Some(oldest) = self.cache_order.pop_front() else {
                break;
            };
            self.cache.remove(&oldest);
            debug!("Evicted image from cache: {}", oldest);
        }
        self.cache_order.push_back(image.url.clone());
        self.cache.insert(image.url.clone(), image);
    }

    fn url_at(&self, index: usize) -> Result<String, ImageError> {
        if self.urls.is_empty() {
            return Err(ImageError::NoImages);
        }
        Ok(self.urls[index % self.urls.len()].clone())
    }
}

impl ImageSource for ImageLoader {
    fn load_random_image(&mut self) -> Result<LoadedImage, ImageError> {
        if self.urls.is_empty() {
            return Err(ImageError::NoImages);
        }
        let index = (rand::random::<f64>() * self.urls.len() as f64) as usize;
        let url = self.url_at(index)?;
        self.load_image(&url)
    }

    fn load_next_image(&mut self) -> Result<LoadedImage, ImageError> {
        if self.urls.is_empty() {
            return Err(ImageError::NoImages);
        }
        self.current_index = (self.current_index + 1) % self.urls.len();
        let url = self.url_at(self.current_index)?;
        self.load_image(&url)
    }

    fn preload_next_image(&mut self) -> Result<LoadedImage, ImageError> {
        let url = self.url_at(self.current_index + 1)?;
        self.load_image(&url)
    }

    fn clear_cache(&mut self) {
        self.cache.clear();
        self.cache_order.clear();
        info!("Image cache cleared");
    }

    fn image_count(&self) -> usize {
        self.urls.len()
    }

    fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

fn read_manifest(path: &Path) -> Result<Vec<String>, ImageError> {
    let content = fs::read_to_string(path).map_err(|source| ImageError::ManifestIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&content)?)
}

/// Downscale so neither side exceeds `max_side`, preserving aspect ratio
fn fit_within(bitmap: RgbaImage, max_side: u32) -> RgbaImage {
    let (w, h) = bitmap.dimensions();
    if w <= max_side && h <= max_side {
        return bitmap;
    }

    let scale = max_side as f64 / w.max(h) as f64;
    let new_w = ((w as f64 * scale).round() as u32).clamp(1, max_side);
    let new_h = ((h as f64 * scale).round() as u32).clamp(1, max_side);
    debug!("Downscaling {}x{} to {}x{}", w, h, new_w, new_h);
    image::imageops::resize(&bitmap, new_w, new_h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::io::Write;

    fn small_placeholders() -> ImageLoader {
        ImageLoader::new(placeholder_urls(), ".").with_placeholder_size(16, 9)
    }

    #[test]
    fn test_next_pointer_is_n_mod_len() {
        let mut loader = small_placeholders();
        let len = loader.image_count();
        for n in 1..=10 {
            loader.load_next_image().unwrap();
            assert_eq!(loader.current_index(), n % len);
        }
    }

    #[test]
    fn test_preload_does_not_advance() {
        let mut loader = small_placeholders();
        let preloaded = loader.preload_next_image().unwrap();
        assert_eq!(loader.current_index(), 0);
        assert_eq!(preloaded.url, "placeholder://2");

        // Committing loads the same image from cache
        let next = loader.load_next_image().unwrap();
        assert_eq!(next.url, preloaded.url);
        assert_eq!(loader.current_index(), 1);
        assert_eq!(loader.cache_size(), 1);
    }

    #[test]
    fn test_random_image_keeps_pointer() {
        let mut loader = small_placeholders();
        for _ in 0..5 {
            let image = loader.load_random_image().unwrap();
            assert!(loader.urls().contains(&image.url));
        }
        assert_eq!(loader.current_index(), 0);
    }

    #[test]
    fn test_empty_list_errors() {
        let mut loader = ImageLoader::new(Vec::new(), ".");
        assert!(matches!(loader.load_next_image(), Err(ImageError::NoImages)));
        assert!(matches!(loader.preload_next_image(), Err(ImageError::NoImages)));
        assert!(matches!(loader.load_random_image(), Err(ImageError::NoImages)));
    }

    #[test]
    fn test_missing_manifest_uses_placeholders() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ImageLoader::from_manifest(&dir.path().join("missing.json"));
        assert_eq!(loader.urls(), placeholder_urls().as_slice());
    }

    #[test]
    fn test_malformed_or_empty_manifest_uses_placeholders() {
        let mut bad = tempfile::NamedTempFile::new().unwrap();
        write!(bad, "{{ not json").unwrap();
        assert_eq!(ImageLoader::from_manifest(bad.path()).image_count(), 3);

        let mut empty = tempfile::NamedTempFile::new().unwrap();
        write!(empty, "[]").unwrap();
        assert_eq!(
            ImageLoader::from_manifest(empty.path()).urls(),
            placeholder_urls().as_slice()
        );
    }

    #[test]
    fn test_manifest_paths_resolve_relative_to_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let img = RgbaImage::from_pixel(4, 2, Rgba([10, 20, 30, 255]));
        img.save(dir.path().join("a.png")).unwrap();
        fs::write(dir.path().join(MANIFEST_FILE), r#"["a.png"]"#).unwrap();

        let mut loader = ImageLoader::from_manifest(&dir.path().join(MANIFEST_FILE));
        let loaded = loader.load_next_image().unwrap();
        assert_eq!(loaded.url, "a.png");
        assert_eq!((loaded.width, loaded.height), (4, 2));
        assert_eq!(loaded.bitmap.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_decode_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = ImageLoader::new(vec!["nope.png".to_string()], dir.path());
        assert!(matches!(
            loader.load_next_image(),
            Err(ImageError::Decode { .. })
        ));
        assert_eq!(loader.cache_size(), 0);
    }

    #[test]
    fn test_cache_evicts_oldest_first() {
        let urls = (1..=4).map(|i| format!("placeholder://{}", i)).collect();
        let mut loader = ImageLoader::new(urls, ".")
            .with_placeholder_size(8, 8)
            .with_cache_capacity(2);

        loader.load_image("placeholder://1").unwrap();
        loader.load_image("placeholder://2").unwrap();
        loader.load_image("placeholder://3").unwrap();
        assert_eq!(loader.cache_size(), 2);
        assert!(!loader.cache.contains_key("placeholder://1"));
        assert!(loader.cache.contains_key("placeholder://3"));

        loader.clear_cache();
        assert_eq!(loader.cache_size(), 0);
    }

    #[test]
    fn test_large_images_are_downscaled() {
        let mut loader = ImageLoader::new(placeholder_urls(), ".")
            .with_placeholder_size(400, 100)
            .with_max_side(200);
        let image = loader.load_next_image().unwrap();
        assert_eq!((image.width, image.height), (200, 50));
    }
}
