//! Microphone capture and signal extraction.
//!
//! Captured PCM feeds an analyser that mirrors a browser analyser node
//! (windowed FFT, temporally smoothed decibel magnitudes). The
//! [`SignalExtractor`] turns that into three smoothed band energies, an RMS
//! loudness value and silence/resume hysteresis signals.

mod analyzer;
mod input;
mod spectrum;

use thiserror::Error;

// Re-export public types
pub use analyzer::{SignalExtractor, SpectrumSource};
pub use input::{enumerate_devices, AudioDevice, AudioInput, AudioStream, CaptureSource, CpalInput};
pub use spectrum::{AnalyserSpectrum, SampleRing};

/// Smoothed, soft-clipped band energies in `[0, 1)`
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AudioBands {
    pub low: f32,  // Bass (20-200 Hz by default)
    pub mid: f32,  // Mids (200-2000 Hz)
    pub high: f32, // Highs (2000-8000 Hz)
}

impl AudioBands {
    pub fn mean(&self) -> f32 {
        (self.low + self.mid + self.high) / 3.0
    }
}

/// Silence detector output; never both true
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SilenceState {
    pub is_silent: bool,
    pub should_resume: bool,
}

/// Extended per-frame audio snapshot for renderers that can use it
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetailedAudio {
    pub bands: AudioBands,
    pub rms: f32,
    /// Log-spaced spectrum bins normalised to `[0, 1]`
    pub spectrum: Vec<f32>,
}

/// Audio input errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device available")]
    NoDevice,

    #[error("Audio input device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device config: {0}")]
    Config(String),

    #[error("Failed to build audio stream: {0}")]
    Build(String),

    #[error("Failed to start stream: {0}")]
    Play(String),
}
