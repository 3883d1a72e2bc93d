//! Status pushed to the UI each frame, and intents coming back from it.

use crate::audio::AudioBands;
use crate::params::ConfigChange;
use crate::state::AppState;

/// Per-frame snapshot for display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStatus {
    pub fps: u32,
    pub rms: f32,
    pub state: AppState,
    pub bands: AudioBands,
}

impl FrameStatus {
    /// One-line summary, e.g. `RUN | 60 fps | rms 0.012 | L 0.20 M 0.10 H 0.05`
    pub fn summary(&self) -> String {
        format!(
            "{} | {} fps | rms {:.3} | L {:.2} M {:.2} H {:.2}",
            self.state, self.fps, self.rms, self.bands.low, self.bands.mid, self.bands.high
        )
    }
}

/// Receiver of status updates; must not block the frame loop
pub trait StatusSink {
    fn push(&mut self, status: &FrameStatus);
}

/// User intent delivered to the director
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    StartAudio,
    StopAudio,
    NextImage,
    FreezeAudio,
    VisualizeWithoutAudio,
    SelectDevice(Option<String>),
    Config(ConfigChange),
}
