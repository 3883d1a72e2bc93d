//! GPU rendering: two interchangeable mosaic renderers behind one trait.
//!
//! The compute renderer converts images to grayscale once, in a compute
//! pre-pass, and adds an additive star and ray overlay. The inline renderer
//! computes luminance per fragment and runs on adapters without compute
//! shaders. [`create_renderer`] picks one and falls back to the inline
//! renderer if the first choice fails to start.

mod compute;
mod context;
mod inline;
mod pipeline;
mod rays;
mod textures;
mod uniforms;

pub use compute::ComputeRenderer;
pub use context::{GpuContext, GpuProfile};
pub use inline::InlineRenderer;
pub use uniforms::{
    build_tile_instances, tile_grid, EffectBlock, RaysBlock, TileBlock, TileInstance,
    TileUniforms,
};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use winit::window::Window;

use crate::audio::{AudioBands, DetailedAudio};
use crate::images::LoadedImage;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("surface reports no usable format")]
    NoSurfaceFormat,
    #[error("no compatible GPU adapter")]
    NoAdapter,
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("adapter lacks {0}")]
    MissingCapability(&'static str),
    #[error("renderer panicked during initialization: {0}")]
    Panicked(String),
    #[error("no renderer could start (primary: {primary}; fallback: {fallback})")]
    Exhausted { primary: String, fallback: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Compute,
    Inline,
}

/// A mosaic renderer the director drives once per frame
pub trait RenderBackend {
    fn kind(&self) -> BackendKind;

    /// Acquire GPU resources. Called once before any other method.
    fn initialize(&mut self) -> Result<(), RenderError>;

    fn set_current_image(&mut self, image: &LoadedImage, tile_size: u32);

    fn set_next_image(&mut self, image: &LoadedImage);

    /// Draw one frame; a no-op until a current image is set
    fn render(&mut self, uniforms: &TileUniforms, bands: AudioBands);

    /// Promote the next image to current. A no-op when no next image is set.
    fn swap_textures(&mut self);

    fn resize(&mut self, width: u32, height: u32);

    /// Release GPU resources; safe to call more than once
    fn destroy(&mut self);

    /// Spectrum-aware rendering, when the renderer supports it
    fn detailed(&mut self) -> Option<&mut dyn DetailedRender> {
        None
    }

    /// Star and ray overlay, when the renderer draws one
    fn overlay(&mut self) -> Option<&mut dyn EnergyOverlay> {
        None
    }
}

/// Optional capability: per-tile pulses driven by the full spectrum
pub trait DetailedRender {
    fn render_detailed(&mut self, uniforms: &TileUniforms, audio: &DetailedAudio);
}

/// Optional capability: additive overlay brightened by audio intensity
pub trait EnergyOverlay {
    /// Intensity for the coming frames; `None` hides the overlay
    fn set_energy(&mut self, intensity: Option<f32>);
}

/// What the platform offers, detected without a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub primary_adapter: bool,
    pub compute_shaders: bool,
}

/// Look for a Vulkan/Metal/DX12 adapter and check for compute support
pub fn detect_capabilities() -> Capabilities {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }));

    match adapter {
        Some(adapter) => Capabilities {
            primary_adapter: true,
            compute_shaders: adapter
                .get_downlevel_capabilities()
                .flags
                .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
        },
        None => Capabilities {
            primary_adapter: false,
            compute_shaders: false,
        },
    }
}

/// Preferred renderer for the detected platform
pub fn select_backend(caps: Capabilities, force_fallback: bool) -> BackendKind {
    if !force_fallback && caps.primary_adapter && caps.compute_shaders {
        BackendKind::Compute
    } else {
        BackendKind::Inline
    }
}

fn try_initialize(renderer: &mut dyn RenderBackend) -> Result<(), RenderError> {
    match catch_unwind(AssertUnwindSafe(|| renderer.initialize())) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RenderError::Panicked(message))
        }
    }
}

/// Start `primary` if given, otherwise or on failure start `fallback`.
///
/// Initialization errors and panics both count as failure.
pub fn initialize_with_fallback(
    primary: Option<Box<dyn RenderBackend>>,
    mut fallback: Box<dyn RenderBackend>,
) -> Result<Box<dyn RenderBackend>, RenderError> {
    let primary_error = match primary {
        Some(mut renderer) => match try_initialize(renderer.as_mut()) {
            Ok(()) => {
                info!("Using {:?} renderer", renderer.kind());
                return Ok(renderer);
            }
            Err(e) => {
                warn!("{:?} renderer failed: {}, falling back", renderer.kind(), e);
                renderer.destroy();
                e.to_string()
            }
        },
        None => "not attempted".to_string(),
    };

    match try_initialize(fallback.as_mut()) {
        Ok(()) => {
            info!("Using {:?} renderer", fallback.kind());
            Ok(fallback)
        }
        Err(e) => Err(RenderError::Exhausted {
            primary: primary_error,
            fallback: e.to_string(),
        }),
    }
}

/// Build and initialize the best renderer for `window`
pub fn create_renderer(
    window: Arc<Window>,
    force_fallback: bool,
) -> Result<Box<dyn RenderBackend>, RenderError> {
    let caps = detect_capabilities();
    info!(
        "GPU capabilities: primary adapter {}, compute shaders {}",
        caps.primary_adapter, caps.compute_shaders
    );

    let primary: Option<Box<dyn RenderBackend>> = match select_backend(caps, force_fallback) {
        BackendKind::Compute => Some(Box::new(ComputeRenderer::new(Arc::clone(&window)))),
        BackendKind::Inline => None,
    };
    initialize_with_fallback(primary, Box::new(InlineRenderer::new(window)))
}
