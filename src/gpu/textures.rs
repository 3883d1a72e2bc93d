//! Image textures and the grayscale storage targets.

use image::imageops::FilterType;
use tracing::warn;

use crate::images::LoadedImage;

use super::context::GpuContext;

/// Texture format for both source images and grayscale copies
pub const IMAGE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

pub struct ImageTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
}

impl ImageTexture {
    fn create(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        usage: wgpu::TextureUsages,
        label: &str,
    ) -> Self {
        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: IMAGE_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            width,
            height,
        }
    }

    /// Upload `image`, shrinking it first if it exceeds the device limit
    pub fn upload(ctx: &GpuContext, image: &LoadedImage, label: &str) -> Self {
        let limit = ctx.max_texture_side();
        let resized;
        let bitmap = if image.width > limit || image.height > limit {
            warn!(
                "{} ({}x{}) exceeds texture limit {}, downscaling",
                image.url, image.width, image.height, limit
            );
            let scale = limit as f64 / image.width.max(image.height) as f64;
            let w = ((image.width as f64 * scale) as u32).clamp(1, limit);
            let h = ((image.height as f64 * scale) as u32).clamp(1, limit);
            resized = image::imageops::resize(&*image.bitmap, w, h, FilterType::Triangle);
            &resized
        } else {
            &*image.bitmap
        };

        let (width, height) = bitmap.dimensions();
        let width = width.max(1);
        let height = height.max(1);
        let target = Self::create(
            ctx,
            width,
            height,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            label,
        );

        if !bitmap.is_empty() {
            ctx.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &target.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                bitmap.as_raw(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(height),
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }

        target
    }

    /// Write-only storage target the compute pre-pass fills
    pub fn storage(ctx: &GpuContext, width: u32, height: u32, label: &str) -> Self {
        Self::create(
            ctx,
            width.max(1),
            height.max(1),
            wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            label,
        )
    }
}
