//! Audio analysis constants and frequency-band helpers.

use std::ops::RangeInclusive;

/// FFT sizes the analyser accepts (samples per analysis window)
pub const SUPPORTED_FFT_SIZES: [usize; 3] = [512, 1024, 2048];

/// Analyser constants (fixed, not user-tunable)
pub mod analyser_constants {
    /// Per-bin temporal smoothing applied to FFT magnitudes (0 = none, 1 = frozen)
    pub const SMOOTHING_TIME_CONSTANT: f32 = 0.75;

    /// Floor for frequency data in decibels
    pub const MIN_DECIBELS: f32 = -90.0;

    /// Upper reference used when normalising spectrum bins to 0..1
    pub const MAX_DECIBELS: f32 = -10.0;

    /// Weight of the newest frame in the per-band moving average
    pub const BAND_EMA_ALPHA: f32 = 0.1;

    /// Resume threshold as a multiple of the silence threshold
    pub const RESUME_HYSTERESIS: f32 = 1.25;

    /// Number of log-spaced bins in a detailed spectrum snapshot
    pub const SPECTRUM_BINS: usize = 32;
}

/// Width of one FFT bin in Hz.
///
/// `bin_count` is the number of frequency bins (half the FFT size), so the
/// bins span 0..Nyquist.
pub fn bin_size_hz(sample_rate_hz: f32, bin_count: usize) -> f32 {
    sample_rate_hz / 2.0 / bin_count as f32
}

/// Map a frequency range (Hz) onto an inclusive range of bin indices.
///
/// The end index may exceed the available bins; callers stop at `bin_count`.
pub fn band_bins(range_hz: (f32, f32), bin_size_hz: f32) -> RangeInclusive<usize> {
    let start = (range_hz.0 / bin_size_hz).floor().max(0.0) as usize;
    let end = (range_hz.1 / bin_size_hz).floor().max(0.0) as usize;
    start..=end
}
