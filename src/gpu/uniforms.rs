//! Per-frame render parameters and their GPU layouts.

use bytemuck::{Pod, Zeroable};
use glam::UVec2;

use crate::audio::AudioBands;
use crate::params::analyser_constants::SPECTRUM_BINS;

/// Per-frame render parameter snapshot built by the director
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TileUniforms {
    /// Seconds since the clock origin
    pub time: f32,
    /// Fade opacity, or crossfade progress while `cross_blend` is 1
    pub alpha: f32,
    /// 1 during TRANSITION, 0 otherwise
    pub cross_blend: f32,
    pub cols: u32,
    pub rows: u32,
    pub img_w: f32,
    pub img_h: f32,
    /// Distortion strength
    pub strength: f32,
    pub ripple_intensity: f32,
    pub pulse_intensity: f32,
    pub detail_intensity: f32,
    pub beat_intensity: f32,
    pub rotation_intensity: f32,
    pub flow_intensity: f32,
}

impl TileUniforms {
    pub fn tile_count(&self) -> u32 {
        self.cols * self.rows
    }
}

/// Tile uniform block (binding 0), 64 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct TileBlock {
    pub time: f32,
    pub alpha: f32,
    pub cols: f32,
    pub rows: f32,
    pub img_w: f32,
    pub img_h: f32,
    pub strength: f32,
    pub ripple: f32,
    pub pulse: f32,
    pub detail: f32,
    pub beat: f32,
    pub rotation: f32,
    pub flow: f32,
    pub low: f32,
    pub mid: f32,
    pub high: f32,
}

impl TileBlock {
    pub fn new(uniforms: &TileUniforms, bands: AudioBands) -> Self {
        Self {
            time: uniforms.time,
            alpha: uniforms.alpha,
            cols: uniforms.cols as f32,
            rows: uniforms.rows as f32,
            img_w: uniforms.img_w,
            img_h: uniforms.img_h,
            strength: uniforms.strength,
            ripple: uniforms.ripple_intensity,
            pulse: uniforms.pulse_intensity,
            detail: uniforms.detail_intensity,
            beat: uniforms.beat_intensity,
            rotation: uniforms.rotation_intensity,
            flow: uniforms.flow_intensity,
            low: bands.low,
            mid: bands.mid,
            high: bands.high,
        }
    }
}

/// Effect uniform block (binding 1), 144 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct EffectBlock {
    pub cross_blend: f32,
    /// Number of valid entries in `spectrum`
    pub spectrum_len: u32,
    pub _padding: [u32; 2],
    /// Spectrum bins packed four per vec4
    pub spectrum: [[f32; 4]; SPECTRUM_BINS / 4],
}

impl EffectBlock {
    /// Pack `spectrum`, truncated to [`SPECTRUM_BINS`] entries
    pub fn new(cross_blend: f32, spectrum: &[f32]) -> Self {
        let mut block = Self {
            cross_blend,
            spectrum_len: spectrum.len().min(SPECTRUM_BINS) as u32,
            _padding: [0; 2],
            spectrum: [[0.0; 4]; SPECTRUM_BINS / 4],
        };
        for (i, &value) in spectrum.iter().take(SPECTRUM_BINS).enumerate() {
            block.spectrum[i / 4][i % 4] = value;
        }
        block
    }
}

/// Unit quad corner
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
}

/// Two triangles covering `[-1, 1]²`, UV origin at the top-left
pub const QUAD_VERTICES: [QuadVertex; 6] = [
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, -1.0],
        uv: [1.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, -1.0],
        uv: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        uv: [1.0, 0.0],
    },
    QuadVertex {
        position: [-1.0, 1.0],
        uv: [0.0, 0.0],
    },
];

/// Energy-ray overlay block, 16 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct RaysBlock {
    /// Surface size in pixels
    pub resolution: [f32; 2],
    /// Combined intensity, `rms + mean band energy`
    pub intensity: f32,
    pub time: f32,
}

impl RaysBlock {
    pub fn new(width: u32, height: u32, intensity: f32, time: f32) -> Self {
        Self {
            resolution: [width.max(1) as f32, height.max(1) as f32],
            intensity: intensity.max(0.0),
            time,
        }
    }
}

/// Per-instance tile data
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TileInstance {
    /// Column, row
    pub tile: [f32; 2],
    pub brightness: f32,
    pub _padding: f32,
}

/// Row-major tile instances for a `cols` x `rows` grid
pub fn build_tile_instances(cols: u32, rows: u32) -> Vec<TileInstance> {
    let mut instances = Vec::with_capacity((cols * rows) as usize);
    for row in 0..rows {
        for col in 0..cols {
            instances.push(TileInstance {
                tile: [col as f32, row as f32],
                brightness: 0.5 + 0.5 * ((col + row) as f32 * 0.1).sin(),
                _padding: 0.0,
            });
        }
    }
    instances
}

/// Grid size covering `width` x `height` with square tiles, rounded up
pub fn tile_grid(width: u32, height: u32, tile_size: u32) -> UVec2 {
    let tile = tile_size.max(1);
    UVec2::new(width.div_ceil(tile), height.div_ceil(tile))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes_match_shader_layout() {
        assert_eq!(std::mem::size_of::<TileBlock>(), 64);
        assert_eq!(std::mem::size_of::<EffectBlock>(), 144);
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
        assert_eq!(std::mem::size_of::<TileInstance>(), 16);
        assert_eq!(std::mem::size_of::<RaysBlock>(), 16);
    }

    #[test]
    fn test_rays_block_clamps_inputs() {
        let block = RaysBlock::new(0, 720, -0.5, 2.0);
        assert_eq!(block.resolution, [1.0, 720.0]);
        assert_eq!(block.intensity, 0.0);
        assert_eq!(block.time, 2.0);
    }

    #[test]
    fn test_tile_grid_rounds_up() {
        assert_eq!(tile_grid(1920, 1080, 32), UVec2::new(60, 34));
        assert_eq!(tile_grid(100, 100, 33), UVec2::new(4, 4));
        assert_eq!(tile_grid(10, 10, 0), UVec2::new(10, 10));
    }

    #[test]
    fn test_instances_are_row_major() {
        let instances = build_tile_instances(3, 2);
        assert_eq!(instances.len(), 6);
        assert_eq!(instances[0].tile, [0.0, 0.0]);
        assert_eq!(instances[2].tile, [2.0, 0.0]);
        assert_eq!(instances[3].tile, [0.0, 1.0]);
        assert!((instances[0].brightness - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_effect_block_packs_spectrum() {
        let spectrum: Vec<f32> = (0..40).map(|i| i as f32).collect();
        let block = EffectBlock::new(1.0, &spectrum);
        assert_eq!(block.spectrum_len, 32);
        assert_eq!(block.spectrum[0], [0.0, 1.0, 2.0, 3.0]);
        assert_eq!(block.spectrum[7][3], 31.0);

        let empty = EffectBlock::new(0.0, &[]);
        assert_eq!(empty.spectrum_len, 0);
    }

    #[test]
    fn test_tile_block_carries_bands() {
        let uniforms = TileUniforms {
            cols: 4,
            rows: 3,
            alpha: 0.5,
            ..Default::default()
        };
        let bands = AudioBands {
            low: 0.1,
            mid: 0.2,
            high: 0.3,
        };
        let block = TileBlock::new(&uniforms, bands);
        assert_eq!(block.cols, 4.0);
        assert_eq!(block.high, 0.3);
        assert_eq!(uniforms.tile_count(), 12);
    }
}
