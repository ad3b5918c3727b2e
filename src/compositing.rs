//! Texture arithmetic for layering elevation states: scaled addition,
//! bilinear resize, and subresolution delta recompositing.
//!
//! Operands must share a resolution unless stated otherwise; combining a
//! logarithmic map with a linear one without the exponential path is not
//! detected and produces numerically wrong (but non-crashing) output.

use wgpu::util::DeviceExt;

use crate::error::ReliefError;
use crate::gpu::context::GpuContext;
use crate::gpu::programs::ProgramSet;
use crate::gpu::texture::{create_height_texture, read_buffer_f32};
use crate::heightmap::HeightMap;

/// Uniform block of the scaled-add kernel.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct AddUniforms {
    factor: f32,
    scale: f32,
    exp_domain: u32,
    _pad: u32,
}

/// Uniform block of the rescale kernel.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct RescaleUniforms {
    mul: f32,
    add: f32,
    keep_background: u32,
    _pad: u32,
}

/// Compute `scale * (A + factor * B)` into a clone of `A`.
///
/// With `exp` set, both operands are exponentiated out of log domain
/// before combining and the result is re-encoded - required when mixing a
/// logarithmic base with a linear delta. The result is then flagged
/// logarithmic; otherwise it inherits `a`'s domain flag.
#[must_use]
pub fn add(
    gpu: &GpuContext,
    programs: &ProgramSet,
    a: &HeightMap,
    b: &HeightMap,
    factor: f32,
    scale: f32,
    exp: bool,
) -> HeightMap {
    let result = a.clone_map(gpu, a.name());
    let uniforms = AddUniforms {
        factor,
        scale,
        exp_domain: u32::from(exp),
        _pad: 0,
    };
    let buffer =
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Scaled Add Uniforms"),
                contents: bytemuck::cast_slice(std::slice::from_ref(
                    &uniforms,
                )),
                usage: wgpu::BufferUsages::UNIFORM,
            });

    let result_view = result.create_view();
    let b_view = b.create_view();
    let bind_group =
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scaled Add Bind Group"),
            layout: &programs.scaled_add_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(
                        &result_view,
                    ),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&b_view),
                },
            ],
        });

    let size = result.size();
    let mut encoder = gpu.create_encoder();
    {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Scaled Add"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&programs.scaled_add);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            size[0].div_ceil(32),
            size[1].div_ceil(32),
            1,
        );
    }
    gpu.submit_and_wait(encoder);

    let logarithmic = exp || a.logarithmic();
    HeightMap::new(
        result.into_texture(),
        a.name(),
        logarithmic,
    )
}

/// Compute `scale * (A - factor * B)` into a clone of `A`.
#[must_use]
pub fn subtract(
    gpu: &GpuContext,
    programs: &ProgramSet,
    a: &HeightMap,
    b: &HeightMap,
    factor: f32,
    scale: f32,
) -> HeightMap {
    add(gpu, programs, a, b, -factor, scale, false)
}

/// Bilinear, clamped (non-repeating) resample to a new resolution.
///
/// `resize(T, T.size)` is the identity within resampling tolerance. The
/// domain flag carries over - resampling log-encoded maps is exactly the
/// approximation the planet encoding exists for.
#[must_use]
pub fn resize(
    gpu: &GpuContext,
    programs: &ProgramSet,
    map: &HeightMap,
    new_size: [u32; 2],
) -> HeightMap {
    let texture = create_height_texture(&gpu.device, map.name(), new_size);
    let target_view =
        texture.create_view(&wgpu::TextureViewDescriptor::default());
    let src_view = map.create_view();

    let bind_group =
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Resize Bind Group"),
            layout: &programs.resize_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&src_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(
                        &programs.clamp_sampler,
                    ),
                },
            ],
        });

    let mut encoder = gpu.create_encoder();
    {
        let mut pass =
            encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Resize Pass"),
                color_attachments: &[Some(
                    wgpu::RenderPassColorAttachment {
                        view: &target_view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                        depth_slice: None,
                    },
                )],
                depth_stencil_attachment: None,
                ..Default::default()
            });
        pass.set_pipeline(&programs.resize);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
    gpu.submit_and_wait(encoder);

    HeightMap::new(texture, map.name(), map.logarithmic())
}

/// Project a reduced-resolution simulation result back onto the
/// full-resolution original: `height_prior_fullres + resize(height -
/// height_prior)`.
///
/// Resampling only the delta avoids the artifacts of resampling absolute
/// heights. Consumes (and releases) `height` and `height_prior`;
/// ownership of `height_prior_fullres` stays with the caller.
#[must_use]
pub fn add_subres(
    gpu: &GpuContext,
    programs: &ProgramSet,
    height: HeightMap,
    height_prior: HeightMap,
    height_prior_fullres: &HeightMap,
) -> HeightMap {
    let diff = subtract(gpu, programs, &height, &height_prior, 1.0, 1.0);
    height_prior.destroy();
    height.destroy();

    let diff_full =
        resize(gpu, programs, &diff, height_prior_fullres.size());
    diff.destroy();

    let result =
        add(gpu, programs, &diff_full, height_prior_fullres, 1.0, 1.0, false);
    diff_full.destroy();

    result
}

/// Sentinel-aware min and max of a height raster.
///
/// Reduces per workgroup on the GPU, then folds the partial results on
/// the CPU. Background pixels are skipped; an all-background raster
/// reports `(0.0, 0.0)`.
///
/// # Errors
///
/// Returns [`ReliefError::Readback`] if the partial-result readback fails.
pub fn min_max(
    gpu: &GpuContext,
    programs: &ProgramSet,
    texture: &wgpu::Texture,
) -> Result<(f32, f32), ReliefError> {
    let groups_x = texture.width().div_ceil(16);
    let groups_y = texture.height().div_ceil(16);
    let pair_count = (groups_x * groups_y) as usize;

    let results = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("MinMax Results"),
        size: (pair_count * 8) as u64,
        usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        mapped_at_creation: false,
    });

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group =
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("MinMax Bind Group"),
            layout: &programs.minmax_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: results.as_entire_binding(),
                },
            ],
        });

    let mut encoder = gpu.create_encoder();
    {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("MinMax"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&programs.minmax);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(groups_x, groups_y, 1);
    }
    gpu.submit_and_wait(encoder);

    let pairs = read_buffer_f32(gpu, &results, pair_count * 2)?;
    let mut lo = f32::MAX;
    let mut hi = f32::MIN;
    for pair in pairs.chunks_exact(2) {
        // Workgroups that saw only background report the fold identity.
        if pair[0] < f32::MAX {
            lo = lo.min(pair[0]);
            hi = hi.max(pair[1]);
        }
    }
    if lo > hi {
        return Ok((0.0, 0.0));
    }
    Ok((lo, hi))
}

/// In-place affine rescale `h * mul + add`. With `keep_background` set,
/// sentinel pixels are left untouched.
pub fn rescale_in_place(
    gpu: &GpuContext,
    programs: &ProgramSet,
    texture: &wgpu::Texture,
    mul: f32,
    add: f32,
    keep_background: bool,
) {
    let uniforms = RescaleUniforms {
        mul,
        add,
        keep_background: u32::from(keep_background),
        _pad: 0,
    };
    let buffer =
        gpu.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Rescale Uniforms"),
                contents: bytemuck::cast_slice(std::slice::from_ref(
                    &uniforms,
                )),
                usage: wgpu::BufferUsages::UNIFORM,
            });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group =
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Rescale Bind Group"),
            layout: &programs.rescale_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
            ],
        });

    let mut encoder = gpu.create_encoder();
    {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Rescale"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&programs.rescale);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            texture.width().div_ceil(32),
            texture.height().div_ceil(32),
            1,
        );
    }
    gpu.submit_and_wait(encoder);
}

/// In-place sRGB-to-linear conversion of an ingested image raster.
pub(crate) fn linearize_in_place(
    gpu: &GpuContext,
    programs: &ProgramSet,
    texture: &wgpu::Texture,
) {
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group =
        gpu.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Linearize Bind Group"),
            layout: &programs.linearize_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            }],
        });

    let mut encoder = gpu.create_encoder();
    {
        let mut pass =
            encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Linearize"),
                timestamp_writes: None,
            });
        pass.set_pipeline(&programs.linearize);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(
            texture.width().div_ceil(32),
            texture.height().div_ceil(32),
            1,
        );
    }
    gpu.submit_and_wait(encoder);
}
