//! Heightmap projection: GPU rasterization of mesh geometry into height
//! rasters, flat or equirectangular.

pub mod equirect;
pub mod matrix;

use glam::Vec3;
use wgpu::util::DeviceExt;

use crate::error::ReliefError;
use crate::gpu::context::GpuContext;
use crate::gpu::programs::ProgramSet;
use crate::gpu::texture::{create_depth_texture, create_height_texture};
use crate::heightmap::{HeightMap, BACKGROUND};
use crate::projection::matrix::{
    flat_resize_matrix, recalculate_scales, Aabb,
};
use crate::settings::{ScaleMode, TerrainSettings};

/// Maximum dimension of an automatically derived flat resolution.
pub const MAX_AUTO_DIMENSION: u32 = 1024;
/// Minimal fixed size used when the bounding box is degenerate.
pub const FALLBACK_SIZE: [u32; 2] = [32, 32];
/// Default 2:1 resolution for equirectangular maps.
pub const EQUIRECT_DEFAULT_SIZE: [u32; 2] = [1024, 512];

/// Parameters of one projection request.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionParams {
    /// Explicit output size; wins over cached and derived sizes.
    pub size: Option<[u32; 2]>,
    /// Height scale mode.
    pub scale_mode: ScaleMode,
    /// Equirectangular ("planet") projection instead of flat.
    pub equirect: bool,
    /// Keep the pipeline in logarithmic height domain (for maps that will
    /// be linearly resampled by a downstream simulation).
    pub internal: bool,
}

/// Uniform block shared by the flat, hemisphere, and polar passes.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct ProjectionUniforms {
    pub resize_matrix: [[f32; 4]; 4],
    pub scale: f32,
    pub logarithmic: f32,
    pub u_offset: f32,
    pub cap_sin: f32,
}

/// Uploaded mesh geometry for one projection call.
pub(crate) struct MeshBuffers {
    pub vertex: wgpu::Buffer,
    pub index: wgpu::Buffer,
    pub index_count: u32,
}

pub(crate) fn upload_mesh(
    gpu: &GpuContext,
    positions: &[[f32; 3]],
    indices: &[u32],
) -> MeshBuffers {
    // Zero-size buffers are not bindable; degenerate meshes keep a
    // one-entry placeholder and draw nothing.
    let vertex_data: &[[f32; 3]] = if positions.is_empty() {
        &[[0.0, 0.0, 0.0]]
    } else {
        positions
    };
    let index_data: &[u32] = if indices.is_empty() { &[0] } else { indices };

    let vertex =
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Projection Vertices"),
                contents: bytemuck::cast_slice(vertex_data),
                usage: wgpu::BufferUsages::VERTEX,
            });
    let index =
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Projection Indices"),
                contents: bytemuck::cast_slice(index_data),
                usage: wgpu::BufferUsages::INDEX,
            });

    MeshBuffers {
        vertex,
        index,
        index_count: indices.len() as u32,
    }
}

pub(crate) fn uniform_bind_group(
    gpu: &GpuContext,
    programs: &ProgramSet,
    uniforms: &ProjectionUniforms,
) -> wgpu::BindGroup {
    let buffer =
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Projection Uniforms"),
                contents: bytemuck::cast_slice(std::slice::from_ref(
                    uniforms,
                )),
                usage: wgpu::BufferUsages::UNIFORM,
            });
    gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Projection Bind Group"),
        layout: &programs.projection_layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

/// Encode one depth-tested height pass. `clear` selects whether the
/// attachments start from the background sentinel or keep prior contents.
pub(crate) fn encode_height_pass(
    encoder: &mut wgpu::CommandEncoder,
    pipeline: &wgpu::RenderPipeline,
    bind_group: &wgpu::BindGroup,
    color_view: &wgpu::TextureView,
    depth_view: &wgpu::TextureView,
    mesh: &MeshBuffers,
    clear: bool,
    instances: u32,
) {
    let color_load = if clear {
        wgpu::LoadOp::Clear(wgpu::Color {
            r: f64::from(BACKGROUND),
            g: 0.0,
            b: 0.0,
            a: 1.0,
        })
    } else {
        wgpu::LoadOp::Load
    };
    let depth_load = if clear {
        wgpu::LoadOp::Clear(1.0)
    } else {
        wgpu::LoadOp::Load
    };

    let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("Height Pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: color_view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: color_load,
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: Some(
            wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: depth_load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            },
        ),
        ..Default::default()
    });

    if mesh.index_count > 0 {
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.set_vertex_buffer(0, mesh.vertex.slice(..));
        pass.set_index_buffer(mesh.index.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..mesh.index_count, 0, 0..instances);
    }
}

/// Resolve the output resolution: explicit size wins, then cached
/// settings, then a derived size preserving the XY aspect ratio (flat) or
/// the default 2:1 raster (equirect); degenerate bounds use the minimal
/// fixed fallback.
fn resolve_size(
    settings: &TerrainSettings,
    bounds: &Aabb,
    params: &ProjectionParams,
) -> [u32; 2] {
    if let Some(size) = params.size {
        return size;
    }
    if let Some(size) = settings.img_size {
        return size;
    }
    if params.equirect {
        return EQUIRECT_DEFAULT_SIZE;
    }
    if bounds.is_degenerate() {
        return FALLBACK_SIZE;
    }

    let e = bounds.extent();
    if e.x >= e.y {
        let w = MAX_AUTO_DIMENSION;
        let h = ((e.y / e.x) * w as f32).ceil() as u32;
        [w, h.max(2)]
    } else {
        let h = MAX_AUTO_DIMENSION;
        let w = ((e.x / e.y) * h as f32).ceil() as u32;
        [w.max(2), h]
    }
}

/// Height scale factor applied inside the flat pass.
fn flat_scale(
    mode: ScaleMode,
    settings: &TerrainSettings,
    object_scale: Vec3,
) -> f32 {
    match mode {
        ScaleMode::Normalized => 1.0,
        ScaleMode::World => settings.org_scale * object_scale.z,
        ScaleMode::Local => settings.org_scale,
        ScaleMode::Proportional => settings.height_scale,
    }
}

/// Project evaluated mesh geometry into a heightmap.
///
/// Recalculates the target's derived scales, resolves the output size
/// (writing it back into unset settings), and runs the flat or
/// equirectangular pipeline. Degenerate geometry is absorbed by the
/// fallback size - no raised failures.
///
/// # Errors
///
/// Returns [`ReliefError`] only for GPU infrastructure failures
/// (readback during equirect normalization).
pub fn project(
    gpu: &GpuContext,
    programs: &ProgramSet,
    label: &str,
    positions: &[[f32; 3]],
    indices: &[u32],
    object_scale: Vec3,
    settings: &mut TerrainSettings,
    params: &ProjectionParams,
) -> Result<HeightMap, ReliefError> {
    log::debug!("Preparing heightmap generation for '{label}'.");

    let bounds = Aabb::from_positions(positions).unwrap_or(Aabb {
        min: Vec3::splat(-0.5),
        max: Vec3::splat(0.5),
    });
    recalculate_scales(settings, &bounds, object_scale);

    let size = resolve_size(settings, &bounds, params);
    if settings.img_size.is_none() {
        // First generation establishes the resolution.
        settings.img_size = Some(size);
    }

    let map = if params.equirect {
        equirect::project_equirect(
            gpu,
            programs,
            label,
            positions,
            indices,
            object_scale,
            &bounds,
            size,
            params,
        )?
    } else {
        project_flat(
            gpu,
            programs,
            label,
            positions,
            indices,
            object_scale,
            &bounds,
            size,
            settings,
            params.scale_mode,
        )
    };

    log::debug!("Generation finished for '{label}'.");
    Ok(map)
}

fn project_flat(
    gpu: &GpuContext,
    programs: &ProgramSet,
    label: &str,
    positions: &[[f32; 3]],
    indices: &[u32],
    object_scale: Vec3,
    bounds: &Aabb,
    size: [u32; 2],
    settings: &TerrainSettings,
    mode: ScaleMode,
) -> HeightMap {
    let texture = create_height_texture(&gpu.device, label, size);
    let color_view =
        texture.create_view(&wgpu::TextureViewDescriptor::default());
    let depth = create_depth_texture(&gpu.device, size);
    let depth_view =
        depth.create_view(&wgpu::TextureViewDescriptor::default());

    let mesh = upload_mesh(gpu, positions, indices);
    let uniforms = ProjectionUniforms {
        resize_matrix: flat_resize_matrix(bounds).to_cols_array_2d(),
        scale: flat_scale(mode, settings, object_scale),
        logarithmic: 0.0,
        u_offset: 0.0,
        cap_sin: 1.0,
    };
    let bind_group = uniform_bind_group(gpu, programs, &uniforms);

    let mut encoder = gpu.create_encoder();
    encode_height_pass(
        &mut encoder,
        &programs.flat,
        &bind_group,
        &color_view,
        &depth_view,
        &mesh,
        true,
        1,
    );
    gpu.submit_and_wait(encoder);
    depth.destroy();

    HeightMap::new(texture, label, false)
}
