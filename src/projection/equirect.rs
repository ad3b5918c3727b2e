//! Equirectangular ("planet") projection.
//!
//! Two hemisphere passes cover most of the 2:1 raster; the polar
//! singularities are unrenderable by direct projection, so each pole is
//! rasterized into a square auxiliary raster and remapped into its
//! equirectangular band by a compute kernel. With `internal` set the
//! whole pipeline stays in logarithmic height domain so vertical angle
//! survives later linear resampling (an approximation - no true
//! spherical-aware filtering is performed).

use std::f32::consts::PI;

use glam::Vec3;

use crate::compositing::{min_max, rescale_in_place};
use crate::error::ReliefError;
use crate::gpu::context::GpuContext;
use crate::gpu::programs::ProgramSet;
use crate::gpu::texture::{create_depth_texture, create_height_texture};
use crate::heightmap::{HeightMap, MIN_RADIUS};
use crate::projection::matrix::{
    reflected, south_polar, spherical_resize_matrix, Aabb,
};
use crate::projection::{
    encode_height_pass, uniform_bind_group, upload_mesh, ProjectionParams,
    ProjectionUniforms,
};
use crate::settings::ScaleMode;

/// Fraction of the raster height covered by each polar band.
pub const CAP_FRACTION: f32 = 0.1;

/// Angular margin of the rendered cap beyond its band, for filter support.
const CAP_MARGIN: f32 = 1.1;

/// Uniform block of the polar remap kernel.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RemapUniforms {
    width: u32,
    height: u32,
    band_rows: u32,
    north: u32,
    decode: u32,
    _pad0: u32,
    cap_sin: f32,
    _pad1: f32,
}

pub(crate) fn project_equirect(
    gpu: &GpuContext,
    programs: &ProgramSet,
    label: &str,
    positions: &[[f32; 3]],
    indices: &[u32],
    object_scale: Vec3,
    bounds: &Aabb,
    size: [u32; 2],
    params: &ProjectionParams,
) -> Result<HeightMap, ReliefError> {
    let texture = create_height_texture(&gpu.device, label, size);
    let color_view =
        texture.create_view(&wgpu::TextureViewDescriptor::default());
    let depth = create_depth_texture(&gpu.device, size);
    let depth_view =
        depth.create_view(&wgpu::TextureViewDescriptor::default());

    let mesh = upload_mesh(gpu, positions, indices);
    let m = spherical_resize_matrix(bounds);
    let log_flag = if params.internal { 1.0 } else { 0.0 };

    // Hemisphere passes: front covers the central half of the longitude
    // range; the back hemisphere renders through the reflected matrix as
    // two instances at U offsets +-0.5 so both seam halves are filled.
    let front = uniform_bind_group(
        gpu,
        programs,
        &ProjectionUniforms {
            resize_matrix: m.to_cols_array_2d(),
            scale: 1.0,
            logarithmic: log_flag,
            u_offset: 0.0,
            cap_sin: 1.0,
        },
    );
    let back = uniform_bind_group(
        gpu,
        programs,
        &ProjectionUniforms {
            resize_matrix: reflected(m).to_cols_array_2d(),
            scale: 1.0,
            logarithmic: log_flag,
            u_offset: 1.0,
            cap_sin: 1.0,
        },
    );

    let mut encoder = gpu.create_encoder();
    encode_height_pass(
        &mut encoder,
        &programs.equirect,
        &front,
        &color_view,
        &depth_view,
        &mesh,
        true,
        1,
    );
    encode_height_pass(
        &mut encoder,
        &programs.equirect,
        &back,
        &color_view,
        &depth_view,
        &mesh,
        false,
        2,
    );
    gpu.submit_and_wait(encoder);
    depth.destroy();

    // Polar caps: a square raster of fixed unit directions per pole,
    // remapped into the top and bottom bands.
    let side = size[0].min(size[1]);
    let band_rows = ((size[1] as f32 * CAP_FRACTION).ceil() as u32)
        .clamp(1, (size[1] / 2).max(1));
    let cap_sin = (CAP_FRACTION * PI * CAP_MARGIN).sin();

    let cap = create_height_texture(&gpu.device, "Polar Cap", [side, side]);
    let cap_view = cap.create_view(&wgpu::TextureViewDescriptor::default());
    let cap_depth = create_depth_texture(&gpu.device, [side, side]);
    let cap_depth_view =
        cap_depth.create_view(&wgpu::TextureViewDescriptor::default());

    for north in [true, false] {
        let matrix = if north { m } else { south_polar(m) };
        let cap_bind = uniform_bind_group(
            gpu,
            programs,
            &ProjectionUniforms {
                resize_matrix: matrix.to_cols_array_2d(),
                scale: 1.0,
                logarithmic: 1.0,
                u_offset: 0.0,
                cap_sin,
            },
        );

        let mut encoder = gpu.create_encoder();
        encode_height_pass(
            &mut encoder,
            &programs.polar,
            &cap_bind,
            &cap_view,
            &cap_depth_view,
            &mesh,
            true,
            1,
        );
        gpu.submit_and_wait(encoder);

        remap_band(
            gpu,
            programs,
            &cap_view,
            &color_view,
            RemapUniforms {
                width: size[0],
                height: size[1],
                band_rows,
                north: u32::from(north),
                decode: u32::from(!params.internal),
                _pad0: 0,
                cap_sin,
                _pad1: 0.0,
            },
        );
    }
    cap.destroy();
    cap_depth.destroy();

    post_process(gpu, programs, &texture, params, object_scale, m)?;

    Ok(HeightMap::new(texture, label, params.internal))
}

/// Dispatch the polar-to-equirect remap over one band, 32x32 workgroups.
fn remap_band(
    gpu: &GpuContext,
    programs: &ProgramSet,
    cap_view: &wgpu::TextureView,
    out_view: &wgpu::TextureView,
    uniforms: RemapUniforms,
) {
    use wgpu::util::DeviceExt;

    let buffer =
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Remap Uniforms"),
                contents: bytemuck::cast_slice(std::slice::from_ref(
                    &uniforms,
                )),
                usage: wgpu::BufferUsages::UNIFORM,
            });
    let bind_group =
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Polar Remap Bind Group"),
            layout: &programs.polar_remap_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(cap_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(
                        &programs.clamp_sampler,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(out_view),
                },
            ],
        });

    let mut encoder = gpu.create_encoder();
    {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Polar Remap"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&programs.polar_remap);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            uniforms.width.div_ceil(32),
            uniforms.band_rows.div_ceil(32),
            1,
        );
    }
    gpu.submit_and_wait(encoder);
}

/// Scale-mode post-processing of the assembled equirect raster.
fn post_process(
    gpu: &GpuContext,
    programs: &ProgramSet,
    texture: &wgpu::Texture,
    params: &ProjectionParams,
    object_scale: Vec3,
    m: glam::Mat4,
) -> Result<(), ReliefError> {
    match params.scale_mode {
        ScaleMode::Proportional => Ok(()),
        ScaleMode::Normalized => {
            let (lo, hi) = min_max(gpu, programs, texture)?;
            if hi - lo > f32::EPSILON {
                let mul = 1.0 / (hi - lo);
                rescale_in_place(
                    gpu,
                    programs,
                    texture,
                    mul,
                    -lo * mul,
                    true,
                );
            }
            Ok(())
        }
        ScaleMode::World | ScaleMode::Local => {
            // The spherical matrix scales uniformly off the X diagonal;
            // non-uniform world scale beyond the Z factor is unsupported.
            let mut scale = 1.0 / m.x_axis.x;
            if params.scale_mode == ScaleMode::World {
                scale *= object_scale.z;
            }
            if params.internal {
                // Multiplicative radial scale is additive in log domain.
                rescale_in_place(
                    gpu,
                    programs,
                    texture,
                    1.0,
                    scale.max(MIN_RADIUS).ln(),
                    true,
                );
            } else {
                rescale_in_place(gpu, programs, texture, scale, 0.0, true);
            }
            Ok(())
        }
    }
}
