//! Primary renderer: grayscale compute pre-pass, the mosaic draw, then the
//! energy-ray overlay.

use std::sync::Arc;
use tracing::{info, warn};
use winit::window::Window;

use super::context::{GpuContext, GpuProfile};
use super::pipeline::{MosaicPass, MosaicTextures};
use super::rays::EnergyRaysPass;
use super::textures::{ImageTexture, IMAGE_FORMAT};
use super::uniforms::{EffectBlock, RaysBlock, TileBlock, TileUniforms};
use super::{BackendKind, DetailedRender, EnergyOverlay, RenderBackend, RenderError};
use crate::audio::{AudioBands, DetailedAudio};
use crate::images::LoadedImage;

const WORKGROUP_SIZE: u32 = 8;

/// Compute pipeline writing luminance into a storage texture
struct GrayscalePass {
    pipeline: wgpu::ComputePipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

impl GrayscalePass {
    fn new(device: &wgpu::Device) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Grayscale Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/grayscale.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Grayscale Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: IMAGE_FORMAT,
                        view_dimension: wgpu::TextureViewDimension::D2,
                    },
                    count: None,
                },
            ],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Grayscale Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Grayscale Pipeline"),
            layout: Some(&layout),
            module: &shader,
            entry_point: Some("cs_main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
        }
    }

    /// Upload `image` and return its grayscale copy
    fn prepare(&self, ctx: &GpuContext, image: &LoadedImage) -> ImageTexture {
        let source = ImageTexture::upload(ctx, image, "Source Image Texture");
        let target = ImageTexture::storage(ctx, source.width, source.height, "Grayscale Texture");

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Grayscale Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&target.view),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Grayscale Encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Grayscale Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(
                source.width.div_ceil(WORKGROUP_SIZE),
                source.height.div_ceil(WORKGROUP_SIZE),
                1,
            );
        }
        ctx.queue.submit(std::iter::once(encoder.finish()));

        target
    }
}

struct ComputeGpu {
    ctx: GpuContext,
    mosaic: MosaicPass,
    grayscale: GrayscalePass,
    rays: EnergyRaysPass,
    /// Overlay intensity; `None` skips the overlay
    energy: Option<f32>,
    /// Grayscale copies; sources are released once converted
    current: Option<ImageTexture>,
    next: Option<ImageTexture>,
}

/// Renderer for adapters with compute shader support
pub struct ComputeRenderer {
    window: Arc<Window>,
    gpu: Option<ComputeGpu>,
}

impl ComputeRenderer {
    /// GPU resources are created by [`RenderBackend::initialize`]
    pub fn new(window: Arc<Window>) -> Self {
        Self { window, gpu: None }
    }

    fn draw(&mut self, uniforms: &TileUniforms, bands: AudioBands, spectrum: &[f32]) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let Some(current) = gpu.current.as_ref() else {
            return;
        };
        let next = gpu.next.as_ref().unwrap_or(current);

        let tile = TileBlock::new(uniforms, bands);
        let effect = EffectBlock::new(uniforms.cross_blend, spectrum);
        if let Some(intensity) = gpu.energy {
            let block = RaysBlock::new(
                gpu.ctx.config.width,
                gpu.ctx.config.height,
                intensity,
                uniforms.time,
            );
            gpu.rays.update(&gpu.ctx.queue, &block);
        }
        let overlay = gpu.energy.map(|_| &gpu.rays);
        gpu.mosaic.draw(
            &mut gpu.ctx,
            MosaicTextures {
                current: &current.view,
                next: &next.view,
            },
            &tile,
            &effect,
            overlay,
        );
    }
}

impl RenderBackend for ComputeRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::Compute
    }

    fn initialize(&mut self) -> Result<(), RenderError> {
        let ctx = pollster::block_on(GpuContext::new(
            Arc::clone(&self.window),
            &GpuProfile::primary(),
        ))?;
        let mosaic = MosaicPass::new(&ctx, "fs_prepared");
        let grayscale = GrayscalePass::new(&ctx.device);
        let rays = EnergyRaysPass::new(&ctx);

        self.gpu = Some(ComputeGpu {
            ctx,
            mosaic,
            grayscale,
            rays,
            energy: None,
            current: None,
            next: None,
        });
        info!("Compute renderer initialized");
        Ok(())
    }

    fn set_current_image(&mut self, image: &LoadedImage, _tile_size: u32) {
        let Some(gpu) = self.gpu.as_mut() else {
            warn!("Renderer not initialized, dropping image {}", image.url);
            return;
        };
        gpu.current = Some(gpu.grayscale.prepare(&gpu.ctx, image));
        gpu.mosaic.invalidate_bindings();
    }

    fn set_next_image(&mut self, image: &LoadedImage) {
        let Some(gpu) = self.gpu.as_mut() else {
            warn!("Renderer not initialized, dropping image {}", image.url);
            return;
        };
        gpu.next = Some(gpu.grayscale.prepare(&gpu.ctx, image));
        gpu.mosaic.invalidate_bindings();
    }

    fn render(&mut self, uniforms: &TileUniforms, bands: AudioBands) {
        self.draw(uniforms, bands, &[]);
    }

    fn swap_textures(&mut self) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        if gpu.next.is_none() {
            warn!("No next texture to swap in");
            return;
        }
        std::mem::swap(&mut gpu.current, &mut gpu.next);
        gpu.mosaic.invalidate_bindings();
    }

    fn resize(&mut self, width: u32, height: u32) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.ctx.resize(width, height);
        }
    }

    fn destroy(&mut self) {
        if self.gpu.take().is_some() {
            info!("Compute renderer destroyed");
        }
    }

    fn detailed(&mut self) -> Option<&mut dyn DetailedRender> {
        Some(self)
    }

    fn overlay(&mut self) -> Option<&mut dyn EnergyOverlay> {
        Some(self)
    }
}

impl DetailedRender for ComputeRenderer {
    fn render_detailed(&mut self, uniforms: &TileUniforms, audio: &DetailedAudio) {
        self.draw(uniforms, audio.bands, &audio.spectrum);
    }
}

impl EnergyOverlay for ComputeRenderer {
    fn set_energy(&mut self, intensity: Option<f32>) {
        if let Some(gpu) = self.gpu.as_mut() {
            gpu.energy = intensity;
        }
    }
}
