//! Music Mosaic - photographs dissolving into tiles that move with the music
//!
//! Captures the microphone, cycles through a folder of images and renders
//! each as an audio-reactive grayscale mosaic, fading to black on silence.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::PhysicalKey,
    window::{Window, WindowId},
};

use music_mosaic::audio::{enumerate_devices, CpalInput};
use music_mosaic::cli::Args;
use music_mosaic::director::Director;
use music_mosaic::gpu::create_renderer;
use music_mosaic::images::ImageLoader;
use music_mosaic::keybindings::{into_event, key_to_action, next_device, KeyAction};
use music_mosaic::params::AppConfig;
use music_mosaic::prefs::PreferenceStore;
use music_mosaic::status::{FrameStatus, StatusSink, UiEvent};
use music_mosaic::timing::SystemClock;

const WINDOW_TITLE: &str = "Music Mosaic";
const TITLE_INTERVAL_SECS: f32 = 0.5;

/// Shows frame status in the window title, at most twice per second
struct TitleStatus {
    window: Arc<Window>,
    last_update: Option<Instant>,
}

impl StatusSink for TitleStatus {
    fn push(&mut self, status: &FrameStatus) {
        if self
            .last_update
            .is_some_and(|t| t.elapsed().as_secs_f32() < TITLE_INTERVAL_SECS)
        {
            return;
        }
        self.last_update = Some(Instant::now());
        self.window
            .set_title(&format!("{} | {}", WINDOW_TITLE, status.summary()));
    }
}

/// Main application state
struct App {
    args: Args,
    config: AppConfig,
    prefs: PreferenceStore,

    window: Option<Arc<Window>>,
    director: Option<Director>,

    /// Set when startup failed; reported as the exit status
    failed: bool,
}

impl App {
    fn new(args: Args, config: AppConfig) -> Self {
        Self {
            args,
            config,
            prefs: PreferenceStore::load(),
            window: None,
            director: None,
            failed: false,
        }
    }

    fn start(&mut self, event_loop: &ActiveEventLoop) -> Result<(), String> {
        let window_attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(winit::dpi::LogicalSize::new(1280.0, 720.0));
        let window = Arc::new(
            event_loop
                .create_window(window_attributes)
                .map_err(|e| format!("failed to create window: {}", e))?,
        );

        let renderer = create_renderer(Arc::clone(&window), self.args.fallback_renderer)
            .map_err(|e| e.to_string())?;

        let images = ImageLoader::from_manifest(&self.args.manifest)
            .with_cache_capacity(self.config.image_cache_capacity)
            .with_max_side(self.config.max_texture_side);

        let status = TitleStatus {
            window: Arc::clone(&window),
            last_update: None,
        };

        let preferred = self
            .args
            .device
            .clone()
            .or_else(|| self.prefs.audio_input_device().map(str::to_string));

        let mut director = Director::new(
            self.config.clone(),
            Box::new(SystemClock::new()),
            renderer,
            Box::new(images),
            Box::new(CpalInput),
            Box::new(status),
        )
        .with_audio_device(preferred);
        director.boot();

        if self.args.no_audio {
            director.visualize_without_audio();
        } else {
            match director.start_audio(None) {
                Ok(()) => remember_device(&mut self.prefs, &director),
                Err(e) => warn!("Audio unavailable, running without audio: {}", e),
            }
        }

        info!("Music Mosaic is running");
        info!("Space: next image | F: freeze | A/S: audio on/off | V: no audio | D: next device");
        info!("[ ]: tile size | - =: distortion | , .: cycle | ; ': silence | J K: trigger | N M: hold");
        info!("1-6: effect intensity | R: random intensities | T: random tiles | E: rays | Esc: quit");

        window.request_redraw();
        self.window = Some(window);
        self.director = Some(director);
        Ok(())
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, key: PhysicalKey) {
        let PhysicalKey::Code(code) = key else {
            return;
        };
        let Some(director) = self.director.as_mut() else {
            return;
        };

        let action = key_to_action(code);
        if action == KeyAction::Quit {
            director.shutdown();
            event_loop.exit();
            return;
        }

        let event = if action == KeyAction::NextDevice {
            let next = next_device(&director.enumerate_devices(), director.audio_device());
            info!("Switching audio input to {}", next.as_deref().unwrap_or("default"));
            Some(UiEvent::SelectDevice(next))
        } else {
            into_event(action, director.config())
        };

        if let Some(event) = event {
            let starts_audio = matches!(event, UiEvent::StartAudio | UiEvent::SelectDevice(_));
            director.handle_event(event);
            if starts_audio && director.audio_active() {
                remember_device(&mut self.prefs, director);
            }
        }

        // The loop stops on stop-audio; restart it when something resumes it
        if let (Some(window), Some(director)) = (&self.window, &self.director) {
            if director.is_running() {
                window.request_redraw();
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        if let Err(e) = self.start(event_loop) {
            error!("Startup failed: {}", e);
            self.failed = true;
            event_loop.exit();
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                if let Some(director) = self.director.as_mut() {
                    director.shutdown();
                }
                event_loop.exit();
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(event_loop, physical_key),
            WindowEvent::Resized(size) => {
                if let Some(director) = self.director.as_mut() {
                    director.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let Some(director) = self.director.as_mut() else {
                    return;
                };
                if director.tick() {
                    if let Some(window) = &self.window {
                        window.request_redraw();
                    }
                }
            }
            _ => {}
        }
    }
}

/// Persist the device the director ended up using
fn remember_device(prefs: &mut PreferenceStore, director: &Director) {
    let device = director.audio_device().map(str::to_string);
    if let Err(e) = prefs.set_audio_input_device(device) {
        warn!("Could not save preferences: {}", e);
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if args.list_devices {
        for device in enumerate_devices() {
            println!("{}\t{}", device.id, device.label);
        }
        return ExitCode::SUCCESS;
    }

    let config = match args.build_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            error!("Failed to create event loop: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut app = App::new(args, config);
    if let Err(e) = event_loop.run_app(&mut app) {
        error!("Event loop error: {}", e);
        return ExitCode::FAILURE;
    }

    if app.failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
