use std::borrow::Cow;
use std::num::NonZeroU64;

use tracing::{debug, error};

use crate::shader::{ShaderError, ShaderPaths, ShaderProgram, UniformSet, UniformValue};

use super::geometry::QuadGeometry;

/// A linked program on the GPU: the render pipeline plus one uniform buffer
/// per stage that declares uniforms.
pub(crate) struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group: Option<wgpu::BindGroup>,
    buffers: Vec<wgpu::Buffer>,
    uniforms: UniformSet,
}

impl GpuProgram {
    /// Uploads a linked [`ShaderProgram`]. Pipeline validation failures from
    /// the driver are reported as link errors.
    pub fn new(
        device: &wgpu::Device,
        program: &ShaderProgram,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let [vertex, fragment] = program.stages().map(|stage| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(stage.stage().label()),
                source: wgpu::ShaderSource::Glsl {
                    shader: Cow::Borrowed(stage.glsl()),
                    stage: stage.stage().naga(),
                    defines: &[],
                },
            })
        });

        let uniforms = program.uniform_set();
        let layout_entries: Vec<wgpu::BindGroupLayoutEntry> = uniforms
            .blocks()
            .iter()
            .map(|block| wgpu::BindGroupLayoutEntry {
                binding: block.layout().stage().uniform_binding(),
                visibility: block.layout().stage().visibility(),
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(block.layout().size()),
                },
                count: None,
            })
            .collect();

        let buffers: Vec<wgpu::Buffer> = uniforms
            .blocks()
            .iter()
            .map(|block| {
                device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(block.layout().stage().uniform_block_name()),
                    size: block.layout().size(),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                })
            })
            .collect();

        let bind_group_layout = (!layout_entries.is_empty()).then(|| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("program uniform layout"),
                entries: &layout_entries,
            })
        });

        let bind_group = bind_group_layout.as_ref().map(|layout| {
            let entries: Vec<wgpu::BindGroupEntry<'_>> = uniforms
                .blocks()
                .iter()
                .zip(&buffers)
                .map(|(block, buffer)| wgpu::BindGroupEntry {
                    binding: block.layout().stage().uniform_binding(),
                    resource: buffer.as_entire_binding(),
                })
                .collect();
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("program uniforms"),
                layout,
                entries: &entries,
            })
        });

        let bind_group_layouts: Vec<&wgpu::BindGroupLayout> =
            bind_group_layout.iter().collect();
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("program pipeline layout"),
            bind_group_layouts: &bind_group_layouts,
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("program pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex,
                entry_point: Some("main"),
                buffers: &[QuadGeometry::vertex_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
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
            fragment: Some(wgpu::FragmentState {
                module: &fragment,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: target_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            let log = err.to_string();
            error!("program linking failed\n{log}");
            return Err(ShaderError::Link { log });
        }

        debug!(
            uniform_blocks = uniforms.blocks().len(),
            ?target_format,
            "created GPU program"
        );
        Ok(Self {
            pipeline,
            bind_group,
            buffers,
            uniforms,
        })
    }

    /// Compiles both stage files from disk and uploads the result.
    pub fn load(
        device: &wgpu::Device,
        paths: &ShaderPaths,
        target_format: wgpu::TextureFormat,
    ) -> Result<Self, ShaderError> {
        let program = ShaderProgram::create(&paths.vertex, &paths.fragment)?;
        Self::new(device, &program, target_format)
    }

    /// Stages `value` for the next upload. Unknown names are ignored.
    pub fn set_uniform(&mut self, name: &str, value: UniformValue) -> bool {
        self.uniforms.set(name, value)
    }

    /// Writes every changed uniform block to its GPU buffer.
    pub fn upload(&mut self, queue: &wgpu::Queue) {
        for (block, buffer) in self.uniforms.blocks_mut().iter_mut().zip(&self.buffers) {
            if let Some(bytes) = block.take_dirty() {
                queue.write_buffer(buffer, 0, bytes);
            }
        }
    }

    /// Makes this program the one used by subsequent draws in `pass`.
    pub fn use_in(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_pipeline(&self.pipeline);
        if let Some(bind_group) = &self.bind_group {
            pass.set_bind_group(0, bind_group, &[]);
        }
    }
}
