//! Frame clock, easing and FPS bookkeeping.
//!
//! Every time value in the crate is a millisecond timestamp read from a
//! [`Clock`]. The native host uses [`SystemClock`]; tests drive a
//! hand-set clock with synthetic timestamps.

use std::time::Instant;

/// Source of frame timestamps (milliseconds)
pub trait Clock {
    fn now_ms(&self) -> f64;
}

/// Monotonic wall clock measured from construction
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Cubic ease-in-out: `ease(0) = 0`, `ease(0.5) = 0.5`, `ease(1) = 1`
pub fn ease_in_out_cubic(t: f32) -> f32 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

/// Fraction of `duration_ms` elapsed since `start_ms`, clamped to `[0, 1]`.
///
/// A zero duration counts as already complete.
pub fn phase_progress(now_ms: f64, start_ms: f64, duration_ms: f64) -> f32 {
    if duration_ms <= 0.0 {
        return 1.0;
    }
    ((now_ms - start_ms) / duration_ms).clamp(0.0, 1.0) as f32
}

/// Rolling frames-per-second counter over 1000 ms windows
#[derive(Debug, Clone, Default)]
pub struct FpsCounter {
    frames: u32,
    window_start_ms: f64,
    fps: u32,
}

impl FpsCounter {
    const WINDOW_MS: f64 = 1000.0;

    /// Count one frame; returns the FPS of the last completed window
    pub fn update(&mut self, now_ms: f64) -> u32 {
        self.frames += 1;
        let elapsed = now_ms - self.window_start_ms;
        if elapsed >= Self::WINDOW_MS {
            self.fps = (self.frames as f64 * 1000.0 / elapsed).round() as u32;
            self.frames = 0;
            self.window_start_ms = now_ms;
        }
        self.fps
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }
}
