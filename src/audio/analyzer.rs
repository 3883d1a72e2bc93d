//! Band energy, loudness and silence detection over a spectrum source.

use super::{AudioBands, DetailedAudio, SilenceState};
use crate::params::analyser_constants::{
    BAND_EMA_ALPHA, MAX_DECIBELS, MIN_DECIBELS, RESUME_HYSTERESIS, SPECTRUM_BINS,
};
use crate::params::{band_bins, bin_size_hz, AppConfig};

/// Largest f32 below 1.0; soft-clipped values would otherwise round up to 1
const BELOW_ONE: f32 = 1.0 - f32::EPSILON / 2.0;

/// Live frequency/time-domain data, read once per frame
pub trait SpectrumSource {
    fn sample_rate(&self) -> f32;

    /// Number of frequency bins (half the FFT size)
    fn bin_count(&self) -> usize;

    /// Number of samples in the time-domain window
    fn window_len(&self) -> usize;

    /// Fill `out` (len = `bin_count`) with per-bin magnitudes in decibels
    fn frequency_data(&mut self, out: &mut [f32]);

    /// Fill `out` (len = `window_len`) with the most recent samples
    fn time_domain_data(&mut self, out: &mut [f32]);
}

/// Converts a spectrum source into band energies, RMS and silence signals.
///
/// Without a source every getter returns neutral values, so "no audio"
/// looks the same to callers as a quiet room.
pub struct SignalExtractor {
    source: Option<Box<dyn SpectrumSource>>,
    frequency: Vec<f32>,
    time: Vec<f32>,
    /// Moving averages before soft clipping
    ema: AudioBands,
    last_rms: f32,
    silence_start_ms: Option<f64>,
    sound_start_ms: Option<f64>,
}

impl SignalExtractor {
    pub fn new(source: Box<dyn SpectrumSource>) -> Self {
        let frequency = vec![MIN_DECIBELS; source.bin_count()];
        let time = vec![0.0; source.window_len()];
        Self {
            source: Some(source),
            frequency,
            time,
            ema: AudioBands::default(),
            last_rms: 0.0,
            silence_start_ms: None,
            sound_start_ms: None,
        }
    }

    /// Extractor with no source attached
    pub fn inactive() -> Self {
        Self {
            source: None,
            frequency: Vec::new(),
            time: Vec::new(),
            ema: AudioBands::default(),
            last_rms: 0.0,
            silence_start_ms: None,
            sound_start_ms: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }

    /// Smoothed, soft-clipped energy of the three configured bands
    pub fn audio_bands(&mut self, config: &AppConfig) -> AudioBands {
        let Some(source) = self.source.as_mut() else {
            return AudioBands::default();
        };

        source.frequency_data(&mut self.frequency);
        let bin_size = bin_size_hz(source.sample_rate(), self.frequency.len());

        let low = band_energy(&self.frequency, config.low_band_hz, bin_size);
        let mid = band_energy(&self.frequency, config.mid_band_hz, bin_size);
        let high = band_energy(&self.frequency, config.high_band_hz, bin_size);

        self.ema.low = ema(self.ema.low, low);
        self.ema.mid = ema(self.ema.mid, mid);
        self.ema.high = ema(self.ema.high, high);

        AudioBands {
            low: soft_clip(self.ema.low),
            mid: soft_clip(self.ema.mid),
            high: soft_clip(self.ema.high),
        }
    }

    /// Root-mean-square of the latest time-domain window
    pub fn rms(&mut self) -> f32 {
        let Some(source) = self.source.as_mut() else {
            return 0.0;
        };
        if self.time.is_empty() {
            return 0.0;
        }

        source.time_domain_data(&mut self.time);
        let sum: f32 = self
            .time
            .iter()
            .filter(|s| s.is_finite())
            .map(|s| s * s)
            .sum();

        self.last_rms = (sum / self.time.len() as f32).sqrt();
        self.last_rms
    }

    pub fn last_rms(&self) -> f32 {
        self.last_rms
    }

    /// Hysteresis over RMS.
    ///
    /// Entering silence needs RMS below `silence_rms` for `silence_hold_ms`;
    /// resuming needs RMS above `silence_rms * 1.25` for `resume_hold_ms`.
    /// Readings between the two thresholds keep whichever timer is running.
    pub fn check_silence(&mut self, config: &AppConfig, now_ms: f64) -> SilenceState {
        if self.source.is_none() {
            return SilenceState::default();
        }

        let rms = self.rms();
        let threshold = config.silence_rms;

        if rms < threshold {
            let start = *self.silence_start_ms.get_or_insert(now_ms);
            self.sound_start_ms = None;
            SilenceState {
                is_silent: now_ms - start >= config.silence_hold_ms,
                should_resume: false,
            }
        } else if rms > threshold * RESUME_HYSTERESIS {
            let start = *self.sound_start_ms.get_or_insert(now_ms);
            self.silence_start_ms = None;
            SilenceState {
                is_silent: false,
                should_resume: now_ms - start >= config.resume_hold_ms,
            }
        } else {
            SilenceState {
                is_silent: held(self.silence_start_ms, now_ms, config.silence_hold_ms),
                should_resume: held(self.sound_start_ms, now_ms, config.resume_hold_ms),
            }
        }
    }

    /// Snapshot for renderers with the detailed-audio capability.
    ///
    /// Reuses the frequency data read by the last [`Self::audio_bands`] call.
    pub fn detailed(&self, bands: AudioBands) -> DetailedAudio {
        DetailedAudio {
            bands,
            rms: self.last_rms,
            spectrum: log_spectrum(&self.frequency, SPECTRUM_BINS),
        }
    }

    /// Detach the source so its owner can stop it
    pub fn into_source(self) -> Option<Box<dyn SpectrumSource>> {
        self.source
    }
}

fn held(start_ms: Option<f64>, now_ms: f64, hold_ms: f64) -> bool {
    start_ms.is_some_and(|start| now_ms - start >= hold_ms)
}

/// Mean linear magnitude of the bins covering `range_hz`
fn band_energy(db: &[f32], range_hz: (f32, f32), bin_size_hz: f32) -> f32 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for i in band_bins(range_hz, bin_size_hz) {
        if i >= db.len() {
            break;
        }
        let linear = 10f32.powf(db[i] / 20.0);
        if linear.is_finite() {
            sum += linear;
        }
        count += 1;
    }
    if count > 0 {
        sum / count as f32
    } else {
        0.0
    }
}

fn ema(previous: f32, sample: f32) -> f32 {
    previous * (1.0 - BAND_EMA_ALPHA) + sample * BAND_EMA_ALPHA
}

/// `x / (1 + |x|)`: bounded, order-preserving, no hard knee
fn soft_clip(x: f32) -> f32 {
    if !x.is_finite() {
        return if x > 0.0 { BELOW_ONE } else { 0.0 };
    }
    (x / (1.0 + x.abs())).min(BELOW_ONE)
}

/// Peak level of log-spaced bin groups, normalised to `[0, 1]`
fn log_spectrum(db: &[f32], groups: usize) -> Vec<f32> {
    if db.len() < 2 {
        return vec![0.0; groups];
    }

    let len = db.len() as f32;
    (0..groups)
        .map(|i| {
            let start = (len.powf(i as f32 / groups as f32) as usize).min(db.len() - 1);
            let end = (len.powf((i + 1) as f32 / groups as f32) as usize)
                .max(start + 1)
                .min(db.len());
            let peak = db[start..end]
                .iter()
                .copied()
                .fold(MIN_DECIBELS, f32::max);
            ((peak - MIN_DECIBELS) / (MAX_DECIBELS - MIN_DECIBELS)).clamp(0.0, 1.0)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedSpectrum;

    fn extractor(source: &ScriptedSpectrum) -> SignalExtractor {
        SignalExtractor::new(Box::new(source.clone()))
    }

    #[test]
    fn test_inactive_returns_neutral_values() {
        let config = AppConfig::default();
        let mut extractor = SignalExtractor::inactive();
        assert!(!extractor.is_active());
        assert_eq!(extractor.audio_bands(&config), AudioBands::default());
        assert_eq!(extractor.rms(), 0.0);
        assert_eq!(
            extractor.check_silence(&config, 10_000.0),
            SilenceState::default()
        );
        assert_eq!(extractor.detailed(AudioBands::default()).spectrum.len(), 32);
    }

    #[test]
    fn test_bands_stay_below_one_for_any_magnitude() {
        let config = AppConfig::default();
        for db in [-1000.0, -90.0, 0.0, 60.0, 300.0, 700.0, f32::INFINITY] {
            let source = ScriptedSpectrum::new();
            source.set_level_db(db);
            let mut extractor = extractor(&source);
            for _ in 0..50 {
                let bands = extractor.audio_bands(&config);
                for v in [bands.low, bands.mid, bands.high] {
                    assert!((0.0..1.0).contains(&v), "db={} gave {}", db, v);
                }
            }
        }
    }

    #[test]
    fn test_ema_rises_smoothly() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        // 0 dB -> linear 1.0 in every bin
        source.set_level_db(0.0);
        let mut extractor = extractor(&source);

        let first = extractor.audio_bands(&config);
        // ema = 0.1 -> 0.1 / 1.1
        assert!((first.low - 0.1 / 1.1).abs() < 1e-5);

        let mut prev = first.low;
        for _ in 0..100 {
            let bands = extractor.audio_bands(&config);
            assert!(bands.low >= prev);
            // Each step moves the average by at most alpha
            assert!(bands.low - prev < 0.1);
            prev = bands.low;
        }
        // Converges toward soft_clip(1.0) = 0.5
        assert!((prev - 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_bands_are_separated() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        source.set_level_db(-200.0);
        // 48 kHz / 2048 -> 23.4375 Hz per bin; 100 Hz is bin 4
        source.set_bin_db(4, 0.0);
        let mut extractor = extractor(&source);

        let bands = extractor.audio_bands(&config);
        assert!(bands.low > 0.0);
        assert!(bands.mid < 1e-6);
        assert!(bands.high < 1e-6);
    }

    #[test]
    fn test_rms_of_constant_signal() {
        let source = ScriptedSpectrum::new();
        source.set_amplitude(0.5);
        let mut extractor = extractor(&source);
        assert!((extractor.rms() - 0.5).abs() < 1e-6);
        assert!((extractor.last_rms() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_silence_requires_hold() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        source.set_amplitude(0.005);
        let mut extractor = extractor(&source);

        assert!(!extractor.check_silence(&config, 0.0).is_silent);
        assert!(!extractor.check_silence(&config, 2999.0).is_silent);
        assert!(extractor.check_silence(&config, 3000.0).is_silent);
    }

    #[test]
    fn test_resume_requires_hysteresis_and_hold() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        // Above the silence threshold but below 1.25x: no resume timer
        source.set_amplitude(0.011);
        let mut extractor = extractor(&source);
        let state = extractor.check_silence(&config, 0.0);
        assert!(!state.should_resume);
        assert!(!extractor.check_silence(&config, 10_000.0).should_resume);

        source.set_amplitude(0.02);
        assert!(!extractor.check_silence(&config, 10_000.0).should_resume);
        assert!(!extractor.check_silence(&config, 10_499.0).should_resume);
        assert!(extractor.check_silence(&config, 10_500.0).should_resume);
    }

    #[test]
    fn test_mid_band_preserves_running_timer() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        source.set_amplitude(0.005);
        let mut extractor = extractor(&source);
        extractor.check_silence(&config, 0.0);

        // Between thresholds: silence timer keeps running, repeatedly
        source.set_amplitude(0.011);
        for t in [1000.0, 1500.0, 2000.0] {
            let state = extractor.check_silence(&config, t);
            assert!(!state.is_silent);
            assert!(!state.should_resume);
        }
        let state = extractor.check_silence(&config, 3000.0);
        assert!(state.is_silent);
        assert_eq!(extractor.check_silence(&config, 3000.0), state);
    }

    #[test]
    fn test_never_silent_and_resuming_together() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        let mut extractor = extractor(&source);
        let levels = [0.0, 0.005, 0.011, 0.02, 0.3, 0.011, 0.001, 0.012, 0.5];
        let mut now = 0.0;
        for round in 0..40 {
            source.set_amplitude(levels[round % levels.len()]);
            for _ in 0..(round % 5 + 1) {
                now += 400.0;
                let state = extractor.check_silence(&config, now);
                assert!(!(state.is_silent && state.should_resume));
            }
        }
    }

    #[test]
    fn test_detailed_spectrum_is_normalised() {
        let config = AppConfig::default();
        let source = ScriptedSpectrum::new();
        source.set_level_db(-50.0);
        let mut extractor = extractor(&source);
        let bands = extractor.audio_bands(&config);
        let detailed = extractor.detailed(bands);
        assert_eq!(detailed.spectrum.len(), SPECTRUM_BINS);
        // (-50 - -90) / 80 = 0.5
        for v in detailed.spectrum {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_soft_clip_preserves_order() {
        let values = [0.0, 0.01, 0.5, 1.0, 10.0, 1e6];
        for pair in values.windows(2) {
            assert!(soft_clip(pair[0]) < soft_clip(pair[1]));
        }
    }
}
