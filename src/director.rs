//! The per-frame driver tying audio, state machine, images and rendering.
//!
//! Each [`Director::tick`] runs one frame in a fixed order: FPS, audio
//! sampling, silence handling, the audio-triggered transition, time-driven
//! state updates, uniforms, render, status. State-machine listeners only
//! stamp times and raise flags on [`Stage`]; the director acts on those
//! flags right after the transition that raised them, so everything a
//! frame changes is settled before the renderer sees it.

use tracing::{debug, error, info, warn};

use crate::audio::{AudioBands, AudioDevice, AudioError, AudioInput, SignalExtractor};
use crate::gpu::{tile_grid, RenderBackend, TileUniforms};
use crate::images::{ImageError, ImageSource, LoadedImage};
use crate::params::{AppConfig, ConfigChange};
use crate::state::{AppState, StateMachine};
use crate::status::{FrameStatus, StatusSink, UiEvent};
use crate::timing::{ease_in_out_cubic, phase_progress, Clock, FpsCounter};

/// Image size assumed for the grid before any image has loaded
const DEFAULT_IMAGE_SIZE: (u32, u32) = (1920, 1080);

/// Phase timestamps and pending work written by state-enter listeners
#[derive(Debug, Clone, Default)]
pub struct Stage {
    pub fade_start_ms: f64,
    pub cycle_start_ms: f64,
    pub transition_start_ms: f64,
    /// Timestamp of the transition being applied
    pub now_ms: f64,
    pub prefetch_pending: bool,
    pub reroll_pending: bool,
}

fn register_listeners(machine: &mut StateMachine<Stage>) {
    machine.on_state_enter(
        AppState::FadeIn,
        Box::new(|stage: &mut Stage| {
            stage.fade_start_ms = stage.now_ms;
            debug!("Fade in started");
        }),
    );
    machine.on_state_enter(
        AppState::Run,
        Box::new(|stage: &mut Stage| {
            stage.cycle_start_ms = stage.now_ms;
            stage.prefetch_pending = true;
            debug!("Run phase started");
        }),
    );
    machine.on_state_enter(
        AppState::Transition,
        Box::new(|stage: &mut Stage| {
            stage.transition_start_ms = stage.now_ms;
            stage.reroll_pending = true;
            debug!("Transition started");
        }),
    );
    machine.on_state_enter(
        AppState::FadeOut,
        Box::new(|stage: &mut Stage| {
            stage.fade_start_ms = stage.now_ms;
            debug!("Fade out started");
        }),
    );
}

pub struct Director {
    config: AppConfig,
    clock: Box<dyn Clock>,
    machine: StateMachine<Stage>,
    stage: Stage,
    renderer: Box<dyn RenderBackend>,
    images: Box<dyn ImageSource>,
    audio: Box<dyn AudioInput>,
    status: Box<dyn StatusSink>,
    extractor: SignalExtractor,
    audio_device: Option<String>,
    /// Uniform `[0, 1)` samples for intensity and tile-size re-rolls
    sampler: Box<dyn FnMut() -> f64>,
    fps: FpsCounter,
    running: bool,
    frozen: bool,
    last_bands: AudioBands,
    current_image: Option<LoadedImage>,
    next_image: Option<LoadedImage>,
    /// Whether `next_image` already advanced the image sequence
    next_committed: bool,
    audio_transition_start_ms: Option<f64>,
    last_uniforms: Option<TileUniforms>,
}

impl Director {
    pub fn new(
        config: AppConfig,
        clock: Box<dyn Clock>,
        renderer: Box<dyn RenderBackend>,
        images: Box<dyn ImageSource>,
        audio: Box<dyn AudioInput>,
        status: Box<dyn StatusSink>,
    ) -> Self {
        let mut machine = StateMachine::new();
        register_listeners(&mut machine);

        Self {
            config,
            clock,
            machine,
            stage: Stage::default(),
            renderer,
            images,
            audio,
            status,
            extractor: SignalExtractor::inactive(),
            audio_device: None,
            sampler: Box::new(rand::random::<f64>),
            fps: FpsCounter::default(),
            running: false,
            frozen: false,
            last_bands: AudioBands::default(),
            current_image: None,
            next_image: None,
            next_committed: false,
            audio_transition_start_ms: None,
            last_uniforms: None,
        }
    }

    /// Replace the random source used for re-rolls
    pub fn with_sampler(mut self, sampler: Box<dyn FnMut() -> f64>) -> Self {
        self.sampler = sampler;
        self
    }

    /// Preferred audio device for the next `start_audio`
    pub fn with_audio_device(mut self, device_id: Option<String>) -> Self {
        self.audio_device = device_id;
        self
    }

    pub fn state(&self) -> AppState {
        self.machine.current_state()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn audio_active(&self) -> bool {
        self.extractor.is_active()
    }

    pub fn audio_device(&self) -> Option<&str> {
        self.audio_device.as_deref()
    }

    pub fn current_image(&self) -> Option<&LoadedImage> {
        self.current_image.as_ref()
    }

    pub fn next_image(&self) -> Option<&LoadedImage> {
        self.next_image.as_ref()
    }

    /// Uniforms handed to the renderer by the last tick
    pub fn last_uniforms(&self) -> Option<&TileUniforms> {
        self.last_uniforms.as_ref()
    }

    pub fn enumerate_devices(&self) -> Vec<AudioDevice> {
        self.audio.enumerate_devices()
    }

    /// BOOT -> IDLE once the collaborators are in place
    pub fn boot(&mut self) {
        let now = self.clock.now_ms();
        self.transition_to(AppState::Idle, now);
    }

    fn transition_to(&mut self, to: AppState, now_ms: f64) -> bool {
        self.stage.now_ms = now_ms;
        let moved = self.machine.transition_to(to, &mut self.stage);

        if std::mem::take(&mut self.stage.reroll_pending) {
            self.reroll();
        }
        if std::mem::take(&mut self.stage.prefetch_pending) {
            self.prefetch_next();
        }
        moved
    }

    fn reroll(&mut self) {
        let sampler = &mut self.sampler;
        if self.config.randomize_intensities(|| sampler()) {
            info!(
                "Random intensities: ripple {:.2}, pulse {:.2}, detail {:.2}, beat {:.2}, rotation {:.2}, flow {:.2}",
                self.config.ripple_intensity,
                self.config.pulse_intensity,
                self.config.detail_intensity,
                self.config.beat_intensity,
                self.config.rotation_intensity,
                self.config.flow_intensity
            );
        }
        let sample = (self.sampler)();
        if self.config.randomize_tile_size(sample) {
            info!("Random tile size: {}", self.config.grid_tile_size);
        }
    }

    /// Load the upcoming image without moving the sequence pointer
    fn prefetch_next(&mut self) {
        match self.images.preload_next_image() {
            Ok(image) => {
                info!("Next image preloaded: {}", image.url);
                self.renderer.set_next_image(&image);
                self.next_image = Some(image);
                self.next_committed = false;
            }
            Err(e) => error!("Error preloading next image: {}", e),
        }
    }

    /// Open an audio stream and start the cycle.
    ///
    /// Uses `device_id`, else the remembered device, else the system
    /// default. A named device that no longer exists falls back to the
    /// default input. If no stream can be opened the cycle starts without
    /// audio and the error is returned for reporting.
    pub fn start_audio(&mut self, device_id: Option<&str>) -> Result<(), AudioError> {
        let device = device_id
            .map(str::to_string)
            .or_else(|| self.audio_device.clone());

        let attached = match self.attach_audio(device) {
            Err(AudioError::DeviceNotFound(missing)) => {
                warn!("Audio device {} not found, using default input", missing);
                self.attach_audio(None)
            }
            other => other,
        };
        if let Err(e) = attached {
            info!("Visualizing without audio");
            self.visualize_without_audio();
            return Err(e);
        }

        if let Err(e) = self.start_visualization() {
            error!("Error starting visualization: {}", e);
        }
        Ok(())
    }

    fn attach_audio(&mut self, device: Option<String>) -> Result<(), AudioError> {
        self.detach_audio();
        let source = self
            .audio
            .get_stream(device.as_deref(), self.config.fft_size)?;
        self.extractor = SignalExtractor::new(source);
        info!(
            "Audio started on {}",
            device.as_deref().unwrap_or("default input")
        );
        self.audio_device = device;
        Ok(())
    }

    fn detach_audio(&mut self) {
        let extractor = std::mem::replace(&mut self.extractor, SignalExtractor::inactive());
        if let Some(source) = extractor.into_source() {
            self.audio.stop_stream(source);
        }
        self.last_bands = AudioBands::default();
        self.audio_transition_start_ms = None;
    }

    /// Close the audio stream and stop the cycle
    pub fn stop_audio(&mut self) {
        self.detach_audio();
        self.stop_visualization();
    }

    /// Switch input device; a live stream is reopened on the new device
    pub fn select_device(&mut self, device_id: Option<String>) {
        if self.audio_device == device_id {
            return;
        }
        if self.extractor.is_active() {
            if let Err(e) = self.attach_audio(device_id) {
                warn!("Audio unavailable ({}), continuing without audio", e);
            }
        } else {
            self.audio_device = device_id;
        }
    }

    /// Start the cycle with no audio source; silence logic stays inactive
    pub fn visualize_without_audio(&mut self) {
        if let Err(e) = self.start_visualization() {
            error!("Error starting visualization: {}", e);
        }
    }

    /// Show a random image and fade in. A no-op while already running.
    pub fn start_visualization(&mut self) -> Result<(), ImageError> {
        if self.running {
            return Ok(());
        }

        let image = self.images.load_random_image()?;
        info!("Current image loaded: {}", image.url);
        self.renderer
            .set_current_image(&image, self.config.grid_tile_size);
        self.current_image = Some(image);

        let now = self.clock.now_ms();
        if self.state() == AppState::Boot {
            self.transition_to(AppState::Idle, now);
        }
        self.transition_to(AppState::FadeIn, now);
        self.running = true;
        Ok(())
    }

    /// Stop the frame loop and return to BOOT
    pub fn stop_visualization(&mut self) {
        self.running = false;
        self.audio_transition_start_ms = None;
        self.machine.reset();
        info!("Visualization stopped");
    }

    /// Leave BLACK with the next image in sequence, without restarting the loop
    fn resume_visualization(&mut self, now_ms: f64) {
        info!("Resuming visualization");
        self.reroll();

        match self.images.load_next_image() {
            Ok(image) => {
                info!("Resume image loaded: {}", image.url);
                self.renderer
                    .set_current_image(&image, self.config.grid_tile_size);
                self.current_image = Some(image);
                self.transition_to(AppState::FadeIn, now_ms);
            }
            Err(e) => error!("Error resuming visualization: {}", e),
        }
    }

    /// Skip to the next image in sequence. Only honoured in RUN.
    pub fn force_next_image(&mut self) -> bool {
        if self.state() != AppState::Run {
            debug!("Ignoring next-image request in {}", self.state());
            return false;
        }

        match self.images.load_next_image() {
            Ok(image) => {
                info!("Next image loaded: {}", image.url);
                self.renderer.set_next_image(&image);
                self.next_image = Some(image);
                self.next_committed = true;
                let now = self.clock.now_ms();
                self.transition_to(AppState::Transition, now)
            }
            Err(e) => {
                error!("Error loading next image: {}", e);
                false
            }
        }
    }

    pub fn toggle_freeze(&mut self) {
        self.frozen = !self.frozen;
        info!("Audio frozen: {}", self.frozen);
    }

    pub fn apply_config(&mut self, change: ConfigChange) {
        self.config.apply(change);
        debug!("Config change: {:?}", change);
    }

    pub fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::StartAudio => {
                if let Err(e) = self.start_audio(None) {
                    error!("Error starting audio: {}", e);
                }
            }
            UiEvent::StopAudio => self.stop_audio(),
            UiEvent::NextImage => {
                self.force_next_image();
            }
            UiEvent::FreezeAudio => self.toggle_freeze(),
            UiEvent::VisualizeWithoutAudio => self.visualize_without_audio(),
            UiEvent::SelectDevice(device_id) => self.select_device(device_id),
            UiEvent::Config(change) => self.apply_config(change),
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.renderer.resize(width, height);
    }

    /// Release audio, GPU and cached images
    pub fn shutdown(&mut self) {
        self.detach_audio();
        self.stop_visualization();
        self.renderer.destroy();
        self.images.clear_cache();
        self.current_image = None;
        self.next_image = None;
        info!("Director shut down");
    }

    /// Run one frame. Returns whether another frame should be scheduled.
    pub fn tick(&mut self) -> bool {
        if !self.running {
            return false;
        }

        let now = self.clock.now_ms();
        let fps = self.fps.update(now);

        let bands = self.sample_bands();
        let mut rms = 0.0;
        if self.extractor.is_active() {
            let silence = self.extractor.check_silence(&self.config, now);
            rms = self.extractor.last_rms();

            // Silence first: FADE_OUT leaves RUN, which disarms the audio trigger
            let state = self.state();
            if silence.is_silent && matches!(state, AppState::Run | AppState::Transition) {
                info!("Fading out on silence");
                self.transition_to(AppState::FadeOut, now);
            } else if silence.should_resume && state == AppState::Black {
                self.resume_visualization(now);
            }

            self.check_audio_transition(bands, rms, now);
        }

        self.update_state(now);

        let energy = self
            .config
            .enable_energy_rays
            .then(|| rms + bands.mean());
        if let Some(overlay) = self.renderer.overlay() {
            overlay.set_energy(energy);
        }

        let uniforms = self.build_uniforms(now);
        self.last_uniforms = Some(uniforms);
        self.render(&uniforms, bands);

        self.status.push(&FrameStatus {
            fps,
            rms,
            state: self.state(),
            bands,
        });

        self.running
    }

    /// Neutral without a source; held at the last reading while frozen
    fn sample_bands(&mut self) -> AudioBands {
        if !self.extractor.is_active() {
            return AudioBands::default();
        }
        if !self.frozen {
            self.last_bands = self.extractor.audio_bands(&self.config);
        }
        self.last_bands
    }

    /// RUN -> TRANSITION once combined intensity stays above threshold
    fn check_audio_transition(&mut self, bands: AudioBands, rms: f32, now_ms: f64) {
        if self.state() != AppState::Run {
            self.audio_transition_start_ms = None;
            return;
        }

        let intensity = rms + bands.mean();
        if intensity < self.config.audio_transition_threshold {
            self.audio_transition_start_ms = None;
            return;
        }

        let start = *self.audio_transition_start_ms.get_or_insert_with(|| {
            debug!("Audio transition threshold reached: {:.3}", intensity);
            now_ms
        });
        if now_ms - start >= self.config.audio_transition_hold_ms {
            info!("Audio transition triggered after {:.0} ms", now_ms - start);
            self.audio_transition_start_ms = None;
            self.transition_to(AppState::Transition, now_ms);
        }
    }

    fn update_state(&mut self, now_ms: f64) {
        let stage = self.stage.clone();
        match self.machine.current_state() {
            AppState::FadeIn if now_ms - stage.fade_start_ms >= self.config.fade_in_ms => {
                self.transition_to(AppState::Run, now_ms);
            }
            AppState::Run if now_ms - stage.cycle_start_ms >= self.config.cycle_ms() => {
                self.transition_to(AppState::Transition, now_ms);
            }
            AppState::Transition
                if now_ms - stage.transition_start_ms >= self.config.transition_ms =>
            {
                self.complete_transition(now_ms);
            }
            AppState::FadeOut if now_ms - stage.fade_start_ms >= self.config.fade_out_ms => {
                self.transition_to(AppState::Black, now_ms);
            }
            _ => {}
        }
    }

    /// Promote next to current and return to RUN
    fn complete_transition(&mut self, now_ms: f64) {
        match self.next_image.take() {
            Some(next) => {
                if !self.next_committed {
                    // Prefetched image: advance the sequence to it
                    if let Err(e) = self.images.load_next_image() {
                        warn!("Could not advance image sequence: {}", e);
                    }
                }
                self.renderer.swap_textures();
                info!(
                    "Swapped images: {} -> {}",
                    self.current_image
                        .as_ref()
                        .map_or("none", |image| image.url.as_str()),
                    next.url
                );
                self.current_image = Some(next);
            }
            None => warn!("Transition finished without a next image, keeping current"),
        }
        self.next_committed = false;
        self.transition_to(AppState::Run, now_ms);
    }

    fn build_uniforms(&self, now_ms: f64) -> TileUniforms {
        let state = self.state();
        let alpha = match state {
            AppState::FadeIn => ease_in_out_cubic(phase_progress(
                now_ms,
                self.stage.fade_start_ms,
                self.config.fade_in_ms,
            )),
            AppState::Transition => ease_in_out_cubic(phase_progress(
                now_ms,
                self.stage.transition_start_ms,
                self.config.transition_ms,
            )),
            AppState::FadeOut => {
                1.0 - ease_in_out_cubic(phase_progress(
                    now_ms,
                    self.stage.fade_start_ms,
                    self.config.fade_out_ms,
                ))
            }
            AppState::Black => 0.0,
            AppState::Boot | AppState::Idle | AppState::Run => 1.0,
        };

        let (img_w, img_h) = self
            .current_image
            .as_ref()
            .map_or(DEFAULT_IMAGE_SIZE, |image| (image.width, image.height));
        let grid = tile_grid(img_w, img_h, self.config.grid_tile_size);

        TileUniforms {
            time: (now_ms / 1000.0) as f32,
            alpha,
            cross_blend: if state == AppState::Transition { 1.0 } else { 0.0 },
            cols: grid.x,
            rows: grid.y,
            img_w: img_w as f32,
            img_h: img_h as f32,
            strength: self.config.distortion_strength,
            ripple_intensity: self.config.ripple_intensity,
            pulse_intensity: self.config.pulse_intensity,
            detail_intensity: self.config.detail_intensity,
            beat_intensity: self.config.beat_intensity,
            rotation_intensity: self.config.rotation_intensity,
            flow_intensity: self.config.flow_intensity,
        }
    }

    fn render(&mut self, uniforms: &TileUniforms, bands: AudioBands) {
        if self.current_image.is_none() {
            debug!("No image loaded yet, skipping frame");
            return;
        }

        let detailed = self.extractor.is_active() && self.renderer.detailed().is_some();
        if detailed {
            let audio = self.extractor.detailed(bands);
            if let Some(renderer) = self.renderer.detailed() {
                renderer.render_detailed(uniforms, &audio);
            }
        } else {
            self.renderer.render(uniforms, bands);
        }
    }
}
