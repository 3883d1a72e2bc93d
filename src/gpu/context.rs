//! Surface, adapter and device setup shared by both renderers.

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use winit::window::Window;

use super::RenderError;

/// What a renderer asks of the platform
#[derive(Debug, Clone)]
pub struct GpuProfile {
    pub label: &'static str,
    pub backends: wgpu::Backends,
    pub limits: wgpu::Limits,
    pub require_compute: bool,
}

impl GpuProfile {
    /// Vulkan/Metal/DX12 with compute shaders
    pub fn primary() -> Self {
        Self {
            label: "Compute Renderer",
            backends: wgpu::Backends::PRIMARY,
            limits: wgpu::Limits::default(),
            require_compute: true,
        }
    }

    /// Any backend, GL included, under WebGL2-class limits
    pub fn fallback() -> Self {
        Self {
            label: "Inline Renderer",
            backends: wgpu::Backends::all(),
            limits: wgpu::Limits::downlevel_webgl2_defaults(),
            require_compute: false,
        }
    }
}

/// Configured surface plus device and queue
pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>, profile: &GpuProfile) -> Result<Self, RenderError> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: profile.backends,
            ..Default::default()
        });

        // Window must have 'static lifetime via Arc
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        if profile.require_compute
            && !adapter
                .get_downlevel_capabilities()
                .flags
                .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS)
        {
            return Err(RenderError::MissingCapability("compute shaders"));
        }

        let info = adapter.get_info();
        info!("{}: {} ({:?})", profile.label, info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some(profile.label),
                    required_features: wgpu::Features::empty(),
                    required_limits: profile.limits.clone().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|e| error!("GPU error: {}", e)));

        // Non-sRGB target so grayscale values land unchanged on screen
        let surface_caps = surface.get_capabilities(&adapter);
        let format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(RenderError::NoSurfaceFormat)?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
        })
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    pub fn max_texture_side(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
    }

    /// Next swapchain texture, or `None` when this frame must be skipped.
    ///
    /// A lost or outdated surface is reconfigured for the next frame.
    pub fn acquire_frame(&mut self) -> Option<wgpu::SurfaceTexture> {
        match self.surface.get_current_texture() {
            Ok(frame) => Some(frame),
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface lost or outdated, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                None
            }
            Err(wgpu::SurfaceError::Timeout) => {
                debug!("Surface timeout, skipping frame");
                None
            }
            Err(e) => {
                error!("Surface error: {}", e);
                None
            }
        }
    }
}
