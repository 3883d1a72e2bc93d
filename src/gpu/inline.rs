//! Fallback renderer: grayscale computed while shading, no compute stage.

use std::sync::Arc;
use tracing::{info, warn};
use winit::window::Window;

use super::context::{GpuContext, GpuProfile};
use super::pipeline::{MosaicPass, MosaicTextures};
use super::textures::ImageTexture;
use super::uniforms::{EffectBlock, TileBlock, TileUniforms};
use super::{BackendKind, RenderBackend, RenderError};
use crate::audio::AudioBands;
use crate::images::LoadedImage;

struct InlineGpu {
    ctx: GpuContext,
    mosaic: MosaicPass,
    current: Option<ImageTexture>,
    next: Option<ImageTexture>,
}

/// Renderer that runs on any wgpu backend, GL included
pub struct InlineRenderer {
    window: Arc<Window>,
    gpu: Option<InlineGpu>,
}

impl InlineRenderer {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window, gpu: None }
    }
}

impl RenderBackend for InlineRenderer {
    fn kind(&self) -> BackendKind {
        BackendKind::Inline
    }

    fn initialize(&mut self) -> Result<(), RenderError> {
        let ctx = pollster::block_on(GpuContext::new(
            Arc::clone(&self.window),
            &GpuProfile::fallback(),
        ))?;
        let mosaic = MosaicPass::new(&ctx, "fs_inline");

        self.gpu = Some(InlineGpu {
            ctx,
            mosaic,
            current: None,
            next: None,
        });
        info!("Inline renderer initialized");
        Ok(())
    }

    fn set_current_image(&mut self, image: &LoadedImage, _tile_size: u32) {
        let Some(gpu) = self.gpu.as_mut() else {
            warn!("Renderer not initialized, dropping image {}", image.url);
            return;
        };
        gpu.current = Some(ImageTexture::upload(&gpu.ctx, image, "Current Image Texture"));
        gpu.mosaic.invalidate_bindings();
    }

    fn set_next_image(&mut self, image: &LoadedImage) {
        let Some(gpu) = self.gpu.as_mut() else {
            warn!("Renderer not initialized, dropping image {}", image.url);
            return;
        };
        gpu.next = Some(ImageTexture::upload(&gpu.ctx, image, "Next Image Texture"));
        gpu.mosaic.invalidate_bindings();
    }

    fn render(&mut self, uniforms: &TileUniforms, bands: AudioBands) {
        let Some(gpu) = self.gpu.as_mut() else {
            return;
        };
        let Some(current) = gpu.current.as_ref() else {
            return;
        };
        let next = gpu.next.as_ref().unwrap_or(current);

        let tile = TileBlock::new(uniforms, bands);
        // Per-tile spectrum pulses need the detailed capability
        let effect = EffectBlock::new(uniforms.cross_blend, &[]);
        gpu.mosaic.draw(
            &mut gpu.ctx,
            MosaicTextures {
                current: &current.view,
                next: &next.view,
            },
            &tile,
            &effect,
            None,
        );
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
            info!("Inline renderer destroyed");
        }
    }
}
