//! The engine's compiled program set.
//!
//! Every render and compute pipeline is compiled once per engine instance
//! and owned here together with its bind group layout - the explicitly
//! constructed replacement for a process-wide program registry.

use crate::error::ReliefError;
use crate::gpu::context::GpuContext;
use crate::gpu::pipeline_helpers::{
    clamp_linear_sampler, compute_filtering_sampler, compute_texture_2d,
    filtering_sampler, storage_buffer, storage_texture_r32f, texture_2d,
    uniform_buffer,
};
use crate::gpu::shader_composer::{Shader, ShaderComposer};

/// Vertex layout for projection passes: position only.
fn position_vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] =
        wgpu::vertex_attr_array![0 => Float32x3];
    wgpu::VertexBufferLayout {
        array_stride: 12,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

fn projection_depth_stencil() -> wgpu::DepthStencilState {
    wgpu::DepthStencilState {
        format: wgpu::TextureFormat::Depth32Float,
        depth_write_enabled: true,
        depth_compare: wgpu::CompareFunction::Less,
        stencil: wgpu::StencilState::default(),
        bias: wgpu::DepthBiasState::default(),
    }
}

/// All compiled pipelines, their layouts, and the shared sampler.
pub struct ProgramSet {
    /// Uniform-only layout shared by the three projection passes.
    pub projection_layout: wgpu::BindGroupLayout,
    /// Flat heightmap projection pipeline.
    pub flat: wgpu::RenderPipeline,
    /// Equirectangular hemisphere pipeline.
    pub equirect: wgpu::RenderPipeline,
    /// Polar-cap pipeline.
    pub polar: wgpu::RenderPipeline,
    /// Texture + sampler layout for the resize pass.
    pub resize_layout: wgpu::BindGroupLayout,
    /// Bilinear resample pipeline.
    pub resize: wgpu::RenderPipeline,
    /// Layout for the scaled-add kernel.
    pub scaled_add_layout: wgpu::BindGroupLayout,
    /// `scale * (A + factor * B)` kernel.
    pub scaled_add: wgpu::ComputePipeline,
    /// Layout for the polar remap kernel.
    pub polar_remap_layout: wgpu::BindGroupLayout,
    /// Polar-band remap kernel.
    pub polar_remap: wgpu::ComputePipeline,
    /// Layout for the min-max reduction kernel.
    pub minmax_layout: wgpu::BindGroupLayout,
    /// Sentinel-aware min-max reduction kernel.
    pub minmax: wgpu::ComputePipeline,
    /// Layout for the rescale kernel.
    pub rescale_layout: wgpu::BindGroupLayout,
    /// Affine rescale kernel.
    pub rescale: wgpu::ComputePipeline,
    /// Layout for the linearize kernel.
    pub linearize_layout: wgpu::BindGroupLayout,
    /// In-place sRGB linearization kernel.
    pub linearize: wgpu::ComputePipeline,
    /// ClampToEdge bilinear sampler shared by resize and remap.
    pub clamp_sampler: wgpu::Sampler,
}

impl ProgramSet {
    /// Compile every pipeline the engine uses.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ShaderCompose`] when a WGSL source fails to
    /// compose.
    pub fn new(gpu: &GpuContext) -> Result<Self, ReliefError> {
        let device = &gpu.device;
        let mut composer = ShaderComposer::new()?;

        let projection_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Projection Bind Group Layout"),
                entries: &[uniform_buffer(
                    0,
                    wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                )],
            },
        );

        let flat = Self::projection_pipeline(
            device,
            &mut composer,
            &projection_layout,
            Shader::HeightFlat,
            "Flat Projection",
        )?;
        let equirect = Self::projection_pipeline(
            device,
            &mut composer,
            &projection_layout,
            Shader::HeightEquirect,
            "Equirect Projection",
        )?;
        let polar = Self::projection_pipeline(
            device,
            &mut composer,
            &projection_layout,
            Shader::HeightPolar,
            "Polar Projection",
        )?;

        let resize_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Resize Bind Group Layout"),
                entries: &[texture_2d(0), filtering_sampler(1)],
            },
        );
        let resize = Self::resize_pipeline(
            device,
            &mut composer,
            &resize_layout,
        )?;

        let scaled_add_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Scaled Add Bind Group Layout"),
                entries: &[
                    uniform_buffer(0, wgpu::ShaderStages::COMPUTE),
                    storage_texture_r32f(
                        1,
                        wgpu::StorageTextureAccess::ReadWrite,
                    ),
                    storage_texture_r32f(
                        2,
                        wgpu::StorageTextureAccess::ReadOnly,
                    ),
                ],
            },
        );
        let scaled_add = Self::compute_pipeline(
            device,
            &mut composer,
            &scaled_add_layout,
            Shader::ScaledAdd,
            "Scaled Add",
        )?;

        let polar_remap_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Polar Remap Bind Group Layout"),
                entries: &[
                    uniform_buffer(0, wgpu::ShaderStages::COMPUTE),
                    compute_texture_2d(1),
                    compute_filtering_sampler(2),
                    storage_texture_r32f(
                        3,
                        wgpu::StorageTextureAccess::WriteOnly,
                    ),
                ],
            },
        );
        let polar_remap = Self::compute_pipeline(
            device,
            &mut composer,
            &polar_remap_layout,
            Shader::PolarRemap,
            "Polar Remap",
        )?;

        let minmax_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("MinMax Bind Group Layout"),
                entries: &[compute_texture_2d(0), storage_buffer(1)],
            },
        );
        let minmax = Self::compute_pipeline(
            device,
            &mut composer,
            &minmax_layout,
            Shader::MinMax,
            "MinMax",
        )?;

        let rescale_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Rescale Bind Group Layout"),
                entries: &[
                    uniform_buffer(0, wgpu::ShaderStages::COMPUTE),
                    storage_texture_r32f(
                        1,
                        wgpu::StorageTextureAccess::ReadWrite,
                    ),
                ],
            },
        );
        let rescale = Self::compute_pipeline(
            device,
            &mut composer,
            &rescale_layout,
            Shader::Rescale,
            "Rescale",
        )?;

        let linearize_layout = device.create_bind_group_layout(
            &wgpu::BindGroupLayoutDescriptor {
                label: Some("Linearize Bind Group Layout"),
                entries: &[storage_texture_r32f(
                    0,
                    wgpu::StorageTextureAccess::ReadWrite,
                )],
            },
        );
        let linearize = Self::compute_pipeline(
            device,
            &mut composer,
            &linearize_layout,
            Shader::Linearize,
            "Linearize",
        )?;

        let clamp_sampler = clamp_linear_sampler(device, "Clamp Sampler");

        Ok(Self {
            projection_layout,
            flat,
            equirect,
            polar,
            resize_layout,
            resize,
            scaled_add_layout,
            scaled_add,
            polar_remap_layout,
            polar_remap,
            minmax_layout,
            minmax,
            rescale_layout,
            rescale,
            linearize_layout,
            linearize,
            clamp_sampler,
        })
    }

    fn projection_pipeline(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        bind_group_layout: &wgpu::BindGroupLayout,
        shader: Shader,
        label: &str,
    ) -> Result<wgpu::RenderPipeline, ReliefError> {
        let module = composer.compose(device, shader)?;

        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} Pipeline Layout")),
                bind_group_layouts: &[bind_group_layout],
                push_constant_ranges: &[],
            });

        Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("{label} Pipeline")),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[position_vertex_layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R32Float,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(projection_depth_stencil()),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        }))
    }

    fn resize_pipeline(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Result<wgpu::RenderPipeline, ReliefError> {
        let module = composer.compose(device, Shader::Resize)?;

        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Resize Pipeline Layout"),
                bind_group_layouts: &[bind_group_layout],
                push_constant_ranges: &[],
            });

        Ok(device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Resize Pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::R32Float,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        }))
    }

    fn compute_pipeline(
        device: &wgpu::Device,
        composer: &mut ShaderComposer,
        bind_group_layout: &wgpu::BindGroupLayout,
        shader: Shader,
        label: &str,
    ) -> Result<wgpu::ComputePipeline, ReliefError> {
        let module = composer.compose(device, shader)?;

        let layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{label} Pipeline Layout")),
                bind_group_layouts: &[bind_group_layout],
                push_constant_ranges: &[],
            });

        Ok(device.create_compute_pipeline(
            &wgpu::ComputePipelineDescriptor {
                label: Some(&format!("{label} Pipeline")),
                layout: Some(&layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            },
        ))
    }
}
