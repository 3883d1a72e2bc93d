//! The instanced mosaic render pass shared by both renderers.

use glam::UVec2;
use tracing::debug;
use wgpu::util::DeviceExt;

use super::context::GpuContext;
use super::rays::EnergyRaysPass;
use super::uniforms::{
    build_tile_instances, EffectBlock, QuadVertex, TileBlock, TileInstance, QUAD_VERTICES,
};

/// Render pipeline, buffers and the texture bind group for one mosaic draw
pub struct MosaicPass {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    vertex_buffer: wgpu::Buffer,
    instance_buffer: Option<wgpu::Buffer>,
    grid: UVec2,
    tile_buffer: wgpu::Buffer,
    effect_buffer: wgpu::Buffer,
    /// Dropped whenever the bound textures change; rebuilt on next draw
    bind_group: Option<wgpu::BindGroup>,
}

/// Textures sampled by one draw
pub struct MosaicTextures<'a> {
    pub current: &'a wgpu::TextureView,
    pub next: &'a wgpu::TextureView,
}

impl MosaicPass {
    /// Build the pass using fragment entry point `fragment_entry`
    pub fn new(ctx: &GpuContext, fragment_entry: &'static str) -> Self {
        let device = &ctx.device;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mosaic Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/mosaic.wgsl").into()),
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&QUAD_VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let tile_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Tile Uniform Buffer"),
            size: std::mem::size_of::<TileBlock>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let effect_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Effect Uniform Buffer"),
            size: std::mem::size_of::<EffectBlock>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Mosaic Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mosaic Bind Group Layout"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                texture_entry(2),
                texture_entry(3),
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Mosaic Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Mosaic Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &[
                            wgpu::VertexAttribute {
                                offset: 0,
                                shader_location: 0,
                                format: wgpu::VertexFormat::Float32x2,
                            },
                            wgpu::VertexAttribute {
                                offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                                shader_location: 1,
                                format: wgpu::VertexFormat::Float32x2,
                            },
                        ],
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<TileInstance>() as wgpu::BufferAddress,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 2,
                            format: wgpu::VertexFormat::Float32x4,
                        }],
                    },
                ],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(fragment_entry),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.format(),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group_layout,
            sampler,
            vertex_buffer,
            instance_buffer: None,
            grid: UVec2::ZERO,
            tile_buffer,
            effect_buffer,
            bind_group: None,
        }
    }

    /// Forget the texture bindings; the next draw rebuilds them
    pub fn invalidate_bindings(&mut self) {
        self.bind_group = None;
    }

    /// Recreate the instance buffer when the grid size changes
    fn ensure_grid(&mut self, device: &wgpu::Device, cols: u32, rows: u32) {
        let grid = UVec2::new(cols, rows);
        if self.grid == grid && self.instance_buffer.is_some() {
            return;
        }

        self.grid = grid;
        if cols == 0 || rows == 0 {
            self.instance_buffer = None;
            return;
        }

        let instances = build_tile_instances(cols, rows);
        self.instance_buffer = Some(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tile Instance Buffer"),
            contents: bytemuck::cast_slice(&instances),
            usage: wgpu::BufferUsages::VERTEX,
        }));
        debug!("Rebuilt tile grid: {}x{}", cols, rows);
    }

    fn ensure_bindings(&mut self, device: &wgpu::Device, textures: &MosaicTextures<'_>) {
        if self.bind_group.is_some() {
            return;
        }
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mosaic Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.tile_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.effect_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(textures.current),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(textures.next),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        }));
    }

    /// Upload this frame's blocks and draw every tile into the next
    /// swapchain texture, then `overlay` if given. Skips the frame if the
    /// surface is unavailable.
    pub fn draw(
        &mut self,
        ctx: &mut GpuContext,
        textures: MosaicTextures<'_>,
        tile: &TileBlock,
        effect: &EffectBlock,
        overlay: Option<&EnergyRaysPass>,
    ) {
        self.ensure_grid(&ctx.device, tile.cols as u32, tile.rows as u32);
        self.ensure_bindings(&ctx.device, &textures);

        ctx.queue
            .write_buffer(&self.tile_buffer, 0, bytemuck::cast_slice(&[*tile]));
        ctx.queue
            .write_buffer(&self.effect_buffer, 0, bytemuck::cast_slice(&[*effect]));

        let Some(output) = ctx.acquire_frame() else {
            return;
        };
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Mosaic Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Mosaic Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if let (Some(bind_group), Some(instances)) = (&self.bind_group, &self.instance_buffer)
            {
                render_pass.set_pipeline(&self.pipeline);
                render_pass.set_bind_group(0, bind_group, &[]);
                render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
                render_pass.set_vertex_buffer(1, instances.slice(..));
                render_pass.draw(0..QUAD_VERTICES.len() as u32, 0..self.grid.x * self.grid.y);
            }
            if let Some(overlay) = overlay {
                overlay.record(&mut render_pass);
            }
        }

        ctx.queue.submit(std::iter::once(encoder.finish()));
        output.present();
    }
}
