//! Parameter definitions with units and documented defaults.
//!
//! All tunables live here:
//! - Durations in milliseconds, frequencies in Hz, sizes in pixels
//! - Documented defaults and valid ranges
//! - Validation before the values reach the analyser or renderer

mod audio;
mod config;

// Re-export all types
pub use audio::{analyser_constants, band_bins, bin_size_hz, SUPPORTED_FFT_SIZES};
pub use config::{
    exponential_tile_size, log_weighted_intensity, AppConfig, ConfigChange, ConfigError,
    INTENSITY_RANGE,
};
