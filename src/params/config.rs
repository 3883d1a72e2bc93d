//! Application configuration shared by every component.
//!
//! One `AppConfig` exists per session, owned by the director and lent by
//! reference to the analyser and renderer. Runtime edits arrive as
//! [`ConfigChange`] values and are applied as whole-field assignments.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::audio::SUPPORTED_FFT_SIZES;

/// Range re-rolled effect intensities are drawn from
pub const INTENSITY_RANGE: (f32, f32) = (0.1, 2.0);

/// Bounds for randomly chosen tile sizes (pixels)
const RANDOM_TILE_RANGE: (f32, f32) = (6.0, 200.0);

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Flat configuration record (durations in milliseconds unless noted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Time an image stays in RUN before an automatic transition (seconds)
    pub cycle_seconds: f64,

    /// Mosaic tile edge length (image pixels)
    pub grid_tile_size: u32,

    pub fade_in_ms: f64,
    pub transition_ms: f64,
    pub fade_out_ms: f64,

    /// FFT window size (512, 1024 or 2048)
    pub fft_size: usize,

    /// RMS below which the input counts as silent
    pub silence_rms: f32,

    /// Continuous silence required before fading out
    pub silence_hold_ms: f64,

    /// Continuous sound required before resuming from black
    pub resume_hold_ms: f64,

    /// Per-tile UV distortion multiplier
    pub distortion_strength: f32,

    /// Combined RMS + mean band energy that forces a transition
    pub audio_transition_threshold: f32,

    /// How long the combined intensity must stay above threshold
    pub audio_transition_hold_ms: f64,

    /// Band ranges (Hz)
    pub low_band_hz: (f32, f32),
    pub mid_band_hz: (f32, f32),
    pub high_band_hz: (f32, f32),

    // Audio-reactive effect intensities (dimensionless multipliers)
    pub ripple_intensity: f32,
    pub pulse_intensity: f32,
    pub detail_intensity: f32,
    pub beat_intensity: f32,
    pub rotation_intensity: f32,
    pub flow_intensity: f32,

    /// Re-roll effect intensities on every transition and resume
    pub enable_random_intensities: bool,

    /// Re-roll the tile size on every transition
    pub enable_random_tile_size: bool,

    /// Draw the star and ray overlay on renderers that support it
    pub enable_energy_rays: bool,

    /// Decoded images kept in the loader cache
    pub image_cache_capacity: usize,

    /// Larger images are downscaled so neither side exceeds this (pixels)
    pub max_texture_side: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: 30.0,
            grid_tile_size: 32,
            fade_in_ms: 1200.0,
            transition_ms: 2000.0,
            fade_out_ms: 600.0,
            fft_size: 2048,
            silence_rms: 0.01,
            silence_hold_ms: 3000.0,
            resume_hold_ms: 500.0,
            distortion_strength: 1.0,
            audio_transition_threshold: 0.3,
            audio_transition_hold_ms: 1000.0,
            low_band_hz: (20.0, 200.0),
            mid_band_hz: (200.0, 2000.0),
            high_band_hz: (2000.0, 8000.0),
            ripple_intensity: 1.0,
            pulse_intensity: 1.0,
            detail_intensity: 1.0,
            beat_intensity: 1.0,
            rotation_intensity: 1.0,
            flow_intensity: 1.0,
            enable_random_intensities: true,
            enable_random_tile_size: false,
            enable_energy_rays: true,
            image_cache_capacity: 8,
            max_texture_side: 2048,
        }
    }
}

/// A single runtime edit, applied as a whole-field assignment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigChange {
    TileSize(u32),
    DistortionStrength(f32),
    CycleSeconds(f64),
    SilenceRms(f32),
    AudioTransitionThreshold(f32),
    AudioTransitionHoldMs(f64),
    RippleIntensity(f32),
    PulseIntensity(f32),
    DetailIntensity(f32),
    BeatIntensity(f32),
    RotationIntensity(f32),
    FlowIntensity(f32),
    RandomIntensities(bool),
    RandomTileSize(bool),
    EnergyRays(bool),
}

impl AppConfig {
    /// Load a JSON config file; missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration (FFT size, tile size, band ordering)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !SUPPORTED_FFT_SIZES.contains(&self.fft_size) {
            return Err(ConfigError::Invalid(format!(
                "FFT size must be one of {:?}, got {}",
                SUPPORTED_FFT_SIZES, self.fft_size
            )));
        }
        if self.grid_tile_size == 0 {
            return Err(ConfigError::Invalid("Tile size must be > 0".to_string()));
        }
        if self.max_texture_side == 0 {
            return Err(ConfigError::Invalid(
                "Max texture side must be > 0".to_string(),
            ));
        }
        for (name, band) in [
            ("low", self.low_band_hz),
            ("mid", self.mid_band_hz),
            ("high", self.high_band_hz),
        ] {
            if band.0 < 0.0 || band.1 <= band.0 {
                return Err(ConfigError::Invalid(format!(
                    "{} band must satisfy 0 <= start < end, got {:?}",
                    name, band
                )));
            }
        }
        Ok(())
    }

    /// Cycle duration in milliseconds
    pub fn cycle_ms(&self) -> f64 {
        self.cycle_seconds * 1000.0
    }

    /// Apply a runtime edit
    pub fn apply(&mut self, change: ConfigChange) {
        match change {
            ConfigChange::TileSize(size) => self.grid_tile_size = size.max(1),
            ConfigChange::DistortionStrength(v) => self.distortion_strength = v.max(0.0),
            ConfigChange::CycleSeconds(v) => self.cycle_seconds = v.max(0.0),
            ConfigChange::SilenceRms(v) => self.silence_rms = v.max(0.0),
            ConfigChange::AudioTransitionThreshold(v) => self.audio_transition_threshold = v,
            ConfigChange::AudioTransitionHoldMs(v) => self.audio_transition_hold_ms = v.max(0.0),
            ConfigChange::RippleIntensity(v) => self.ripple_intensity = v,
            ConfigChange::PulseIntensity(v) => self.pulse_intensity = v,
            ConfigChange::DetailIntensity(v) => self.detail_intensity = v,
            ConfigChange::BeatIntensity(v) => self.beat_intensity = v,
            ConfigChange::RotationIntensity(v) => self.rotation_intensity = v,
            ConfigChange::FlowIntensity(v) => self.flow_intensity = v,
            ConfigChange::RandomIntensities(on) => self.enable_random_intensities = on,
            ConfigChange::RandomTileSize(on) => self.enable_random_tile_size = on,
            ConfigChange::EnergyRays(on) => self.enable_energy_rays = on,
        }
    }

    /// Re-roll all six effect intensities if enabled.
    ///
    /// `sample` yields uniform values in `[0, 1)`.
    pub fn randomize_intensities(&mut self, mut sample: impl FnMut() -> f64) -> bool {
        if !self.enable_random_intensities {
            return false;
        }
        let (min, max) = INTENSITY_RANGE;
        self.ripple_intensity = log_weighted_intensity(sample(), min, max);
        self.pulse_intensity = log_weighted_intensity(sample(), min, max);
        self.detail_intensity = log_weighted_intensity(sample(), min, max);
        self.beat_intensity = log_weighted_intensity(sample(), min, max);
        self.rotation_intensity = log_weighted_intensity(sample(), min, max);
        self.flow_intensity = log_weighted_intensity(sample(), min, max);
        true
    }

    /// Re-roll the tile size if enabled
    pub fn randomize_tile_size(&mut self, sample: f64) -> bool {
        if !self.enable_random_tile_size {
            return false;
        }
        self.grid_tile_size = exponential_tile_size(sample);
        true
    }
}

/// Square-root weighted value in `[min, max]`.
pub fn log_weighted_intensity(sample: f64, min: f32, max: f32) -> f32 {
    let weighted = sample.clamp(0.0, 1.0).sqrt() as f32;
    min + (max - min) * weighted
}

/// Exponentially distributed tile size, biased toward small tiles.
pub fn exponential_tile_size(sample: f64) -> u32 {
    let (min, max) = RANDOM_TILE_RANGE;
    // Guard ln(0)
    let exponential = -(sample.max(f64::MIN_POSITIVE)).ln();
    let normalized = (exponential / 4.0).min(1.0) as f32;
    (min + (max - min) * normalized).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cycle_ms(), 30_000.0);
    }

    #[test]
    fn test_rejects_unsupported_fft_size() {
        let config = AppConfig {
            fft_size: 1000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_inverted_band() {
        let config = AppConfig {
            mid_band_hz: (2000.0, 200.0),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "cycle_seconds": 5.0, "grid_tile_size": 16 }}"#).unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.cycle_seconds, 5.0);
        assert_eq!(config.grid_tile_size, 16);
        assert_eq!(config.fade_in_ms, 1200.0);
        assert_eq!(config.high_band_hz, (2000.0, 8000.0));
    }

    #[test]
    fn test_apply_is_whole_field() {
        let mut config = AppConfig::default();
        config.apply(ConfigChange::TileSize(0));
        assert_eq!(config.grid_tile_size, 1);

        config.apply(ConfigChange::FlowIntensity(1.7));
        assert_eq!(config.flow_intensity, 1.7);
        assert_eq!(config.ripple_intensity, 1.0);
    }

    #[test]
    fn test_log_weighted_intensity_bounds() {
        assert!((log_weighted_intensity(0.0, 0.1, 2.0) - 0.1).abs() < 1e-6);
        assert!((log_weighted_intensity(1.0, 0.1, 2.0) - 2.0).abs() < 1e-6);
        // sqrt(0.25) = 0.5
        assert!((log_weighted_intensity(0.25, 0.1, 2.0) - 1.05).abs() < 1e-6);
    }

    #[test]
    fn test_randomize_intensities_respects_flag() {
        let mut config = AppConfig {
            enable_random_intensities: false,
            ..Default::default()
        };
        assert!(!config.randomize_intensities(|| 0.5));
        assert_eq!(config.pulse_intensity, 1.0);

        config.enable_random_intensities = true;
        assert!(config.randomize_intensities(|| 0.0));
        assert!((config.pulse_intensity - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_exponential_tile_size_range() {
        // u = 1 -> -ln(1) = 0 -> minimum
        assert_eq!(exponential_tile_size(1.0), 6);
        // very small u saturates at the maximum
        assert_eq!(exponential_tile_size(1e-12), 200);
        assert_eq!(exponential_tile_size(0.0), 200);
    }
}
