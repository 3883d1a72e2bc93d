//! Keyboard input handling and key mappings.

use winit::keyboard::KeyCode;

use crate::audio::AudioDevice;
use crate::params::{AppConfig, ConfigChange, INTENSITY_RANGE};
use crate::status::UiEvent;

const TILE_STEP: u32 = 4;
const DISTORTION_STEP: f32 = 0.1;
const CYCLE_STEP_SECONDS: f64 = 5.0;
const SILENCE_STEP: f32 = 0.005;
const TRIGGER_STEP: f32 = 0.05;
const TRIGGER_HOLD_STEP_MS: f64 = 250.0;
const INTENSITY_STEP: f32 = 0.25;

/// Audio-reactive effects with their own intensity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Ripple,
    Pulse,
    Detail,
    Beat,
    Rotation,
    Flow,
}

/// Actions derived from key presses
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyAction {
    NextImage,
    FreezeAudio,
    StartAudio,
    StopAudio,
    VisualizeWithoutAudio,
    /// Switch to the next input device; resolved by the host
    NextDevice,
    TileSizeDown,
    TileSizeUp,
    DistortionDown,
    DistortionUp,
    CycleShorter,
    CycleLonger,
    SilenceDown,
    SilenceUp,
    TriggerDown,
    TriggerUp,
    TriggerHoldDown,
    TriggerHoldUp,
    /// Raise one effect's intensity, wrapping to the minimum past the maximum
    StepIntensity(Effect),
    ToggleRandomIntensities,
    ToggleRandomTileSize,
    ToggleEnergyRays,
    Quit,
    None,
}

/// Convert a physical key to an action.
pub fn key_to_action(key: KeyCode) -> KeyAction {
    match key {
        KeyCode::Space => KeyAction::NextImage,
        KeyCode::KeyF => KeyAction::FreezeAudio,
        KeyCode::KeyA => KeyAction::StartAudio,
        KeyCode::KeyS => KeyAction::StopAudio,
        KeyCode::KeyV => KeyAction::VisualizeWithoutAudio,
        KeyCode::KeyD => KeyAction::NextDevice,
        KeyCode::BracketLeft => KeyAction::TileSizeDown,
        KeyCode::BracketRight => KeyAction::TileSizeUp,
        KeyCode::Minus => KeyAction::DistortionDown,
        KeyCode::Equal => KeyAction::DistortionUp,
        KeyCode::Comma => KeyAction::CycleShorter,
        KeyCode::Period => KeyAction::CycleLonger,
        KeyCode::Semicolon => KeyAction::SilenceDown,
        KeyCode::Quote => KeyAction::SilenceUp,
        KeyCode::KeyJ => KeyAction::TriggerDown,
        KeyCode::KeyK => KeyAction::TriggerUp,
        KeyCode::KeyN => KeyAction::TriggerHoldDown,
        KeyCode::KeyM => KeyAction::TriggerHoldUp,
        KeyCode::Digit1 => KeyAction::StepIntensity(Effect::Ripple),
        KeyCode::Digit2 => KeyAction::StepIntensity(Effect::Pulse),
        KeyCode::Digit3 => KeyAction::StepIntensity(Effect::Detail),
        KeyCode::Digit4 => KeyAction::StepIntensity(Effect::Beat),
        KeyCode::Digit5 => KeyAction::StepIntensity(Effect::Rotation),
        KeyCode::Digit6 => KeyAction::StepIntensity(Effect::Flow),
        KeyCode::KeyR => KeyAction::ToggleRandomIntensities,
        KeyCode::KeyT => KeyAction::ToggleRandomTileSize,
        KeyCode::KeyE => KeyAction::ToggleEnergyRays,
        KeyCode::Escape => KeyAction::Quit,
        _ => KeyAction::None,
    }
}

/// Translate an action into a director event.
///
/// Parameter steps become absolute whole-field values computed from the
/// current config. `NextDevice`, `Quit` and `None` are handled by the host.
pub fn into_event(action: KeyAction, config: &AppConfig) -> Option<UiEvent> {
    let change = match action {
        KeyAction::NextImage => return Some(UiEvent::NextImage),
        KeyAction::FreezeAudio => return Some(UiEvent::FreezeAudio),
        KeyAction::StartAudio => return Some(UiEvent::StartAudio),
        KeyAction::StopAudio => return Some(UiEvent::StopAudio),
        KeyAction::VisualizeWithoutAudio => return Some(UiEvent::VisualizeWithoutAudio),
        KeyAction::TileSizeDown => {
            ConfigChange::TileSize(config.grid_tile_size.saturating_sub(TILE_STEP).max(1))
        }
        KeyAction::TileSizeUp => ConfigChange::TileSize(config.grid_tile_size + TILE_STEP),
        KeyAction::DistortionDown => ConfigChange::DistortionStrength(
            (config.distortion_strength - DISTORTION_STEP).max(0.0),
        ),
        KeyAction::DistortionUp => {
            ConfigChange::DistortionStrength(config.distortion_strength + DISTORTION_STEP)
        }
        KeyAction::CycleShorter => ConfigChange::CycleSeconds(
            (config.cycle_seconds - CYCLE_STEP_SECONDS).max(CYCLE_STEP_SECONDS),
        ),
        KeyAction::CycleLonger => {
            ConfigChange::CycleSeconds(config.cycle_seconds + CYCLE_STEP_SECONDS)
        }
        KeyAction::SilenceDown => {
            ConfigChange::SilenceRms((config.silence_rms - SILENCE_STEP).max(0.0))
        }
        KeyAction::SilenceUp => ConfigChange::SilenceRms(config.silence_rms + SILENCE_STEP),
        KeyAction::TriggerDown => ConfigChange::AudioTransitionThreshold(
            (config.audio_transition_threshold - TRIGGER_STEP).max(0.0),
        ),
        KeyAction::TriggerUp => ConfigChange::AudioTransitionThreshold(
            config.audio_transition_threshold + TRIGGER_STEP,
        ),
        KeyAction::TriggerHoldDown => ConfigChange::AudioTransitionHoldMs(
            (config.audio_transition_hold_ms - TRIGGER_HOLD_STEP_MS).max(0.0),
        ),
        KeyAction::TriggerHoldUp => ConfigChange::AudioTransitionHoldMs(
            config.audio_transition_hold_ms + TRIGGER_HOLD_STEP_MS,
        ),
        KeyAction::StepIntensity(effect) => step_intensity(effect, config),
        KeyAction::ToggleRandomIntensities => {
            ConfigChange::RandomIntensities(!config.enable_random_intensities)
        }
        KeyAction::ToggleRandomTileSize => {
            ConfigChange::RandomTileSize(!config.enable_random_tile_size)
        }
        KeyAction::ToggleEnergyRays => ConfigChange::EnergyRays(!config.enable_energy_rays),
        KeyAction::NextDevice | KeyAction::Quit | KeyAction::None => return None,
    };
    Some(UiEvent::Config(change))
}

fn step_intensity(effect: Effect, config: &AppConfig) -> ConfigChange {
    let (min, max) = INTENSITY_RANGE;
    let step = |value: f32| {
        let raised = value + INTENSITY_STEP;
        if raised > max + f32::EPSILON {
            min
        } else {
            raised
        }
    };
    match effect {
        Effect::Ripple => ConfigChange::RippleIntensity(step(config.ripple_intensity)),
        Effect::Pulse => ConfigChange::PulseIntensity(step(config.pulse_intensity)),
        Effect::Detail => ConfigChange::DetailIntensity(step(config.detail_intensity)),
        Effect::Beat => ConfigChange::BeatIntensity(step(config.beat_intensity)),
        Effect::Rotation => ConfigChange::RotationIntensity(step(config.rotation_intensity)),
        Effect::Flow => ConfigChange::FlowIntensity(step(config.flow_intensity)),
    }
}

/// Device after `current` in `devices`, cycling through the system default.
///
/// Order: default (`None`), then each listed device, then default again.
/// A current id missing from the list restarts at the first device.
pub fn next_device(devices: &[AudioDevice], current: Option<&str>) -> Option<String> {
    let next = match current {
        None => devices.first(),
        Some(id) => match devices.iter().position(|d| d.id == id) {
            Some(i) => devices.get(i + 1),
            None => devices.first(),
        },
    };
    next.map(|d| d.id.clone())
}
