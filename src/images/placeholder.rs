//! Generated stand-in images used when no manifest is available.

use image::{Rgba, RgbaImage};

/// URL scheme marking a generated image
pub const PLACEHOLDER_SCHEME: &str = "placeholder://";

pub const PLACEHOLDER_WIDTH: u32 = 1920;
pub const PLACEHOLDER_HEIGHT: u32 = 1080;

const PLACEHOLDER_COUNT: u32 = 3;

/// Built-in fallback list: `placeholder://1` ..= `placeholder://3`
pub fn placeholder_urls() -> Vec<String> {
    (1..=PLACEHOLDER_COUNT)
        .map(|i| format!("{}{}", PLACEHOLDER_SCHEME, i))
        .collect()
}

/// Seed encoded in a placeholder URL, if it is one
pub fn placeholder_seed(url: &str) -> Option<u32> {
    url.strip_prefix(PLACEHOLDER_SCHEME)?.parse().ok()
}

/// Render placeholder `seed`: a diagonal gradient with concentric rings
/// whose spacing depends on the seed, so consecutive placeholders differ.
pub fn render_placeholder(seed: u32, width: u32, height: u32) -> RgbaImage {
    let w = width.max(1) as f32;
    let h = height.max(1) as f32;
    let ring_spacing = 40.0 + 25.0 * (seed % 5) as f32;
    let (cx, cy) = (w * (0.3 + 0.2 * (seed % 3) as f32), h * 0.5);
    let tint = [
        (seed * 67 % 256) as f32 / 255.0,
        (seed * 131 % 256) as f32 / 255.0,
        (seed * 197 % 256) as f32 / 255.0,
    ];

    RgbaImage::from_fn(width, height, |x, y| {
        let gradient = (x as f32 / w + y as f32 / h) * 0.5;
        let distance = ((x as f32 - cx).powi(2) + (y as f32 - cy).powi(2)).sqrt();
        let ring = 0.5 + 0.5 * (distance / ring_spacing * std::f32::consts::TAU).sin();
        let value = 0.6 * gradient + 0.4 * ring;

        let channel = |t: f32| ((value * (0.5 + 0.5 * t)).clamp(0.0, 1.0) * 255.0) as u8;
        Rgba([channel(tint[0]), channel(tint[1]), channel(tint[2]), 255])
    })
}
