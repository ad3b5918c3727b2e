//! Height-raster texture helpers.
//!
//! All elevation data lives in single-channel `R32Float` 2-D textures
//! created with the full usage set the engine needs: render target,
//! sampled binding, storage binding for compute kernels, and copy
//! source/destination for cloning and readback.

use crate::error::ReliefError;
use crate::gpu::context::GpuContext;

/// Readback rows must be padded to this alignment (wgpu requirement).
const ROW_ALIGN: u32 = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

/// Allocate an `R32Float` height raster of the given size.
#[must_use]
pub fn create_height_texture(
    device: &wgpu::Device,
    label: &str,
    size: [u32; 2],
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Allocate a `Depth32Float` target for depth-tested projection passes.
#[must_use]
pub fn create_depth_texture(
    device: &wgpu::Device,
    size: [u32; 2],
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Projection Depth"),
        size: wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Depth32Float,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Allocate a height raster and fill it from single-channel pixel data.
///
/// `pixels` is row-major, one `f32` per texel, `size[0] * size[1]` long.
#[must_use]
pub fn upload_height_texture(
    gpu: &GpuContext,
    label: &str,
    size: [u32; 2],
    pixels: &[f32],
) -> wgpu::Texture {
    let texture = create_height_texture(&gpu.device, label, size);
    gpu.queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytemuck::cast_slice(pixels),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(size[0] * 4),
            rows_per_image: Some(size[1]),
        },
        wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
    );
    texture
}

/// Clone a height raster texel-for-texel on the GPU.
#[must_use]
pub fn clone_texture(
    gpu: &GpuContext,
    src: &wgpu::Texture,
    label: &str,
) -> wgpu::Texture {
    let size = [src.width(), src.height()];
    let dst = create_height_texture(&gpu.device, label, size);
    let mut encoder = gpu.create_encoder();
    encoder.copy_texture_to_texture(
        src.as_image_copy(),
        dst.as_image_copy(),
        wgpu::Extent3d {
            width: size[0],
            height: size[1],
            depth_or_array_layers: 1,
        },
    );
    gpu.submit_and_wait(encoder);
    dst
}

/// Read a height raster back to the CPU as row-major `f32` texels.
///
/// Copies through a padded staging buffer (rows aligned to 256 bytes) and
/// blocks until the device has finished.
///
/// # Errors
///
/// Returns [`ReliefError::Readback`] if buffer mapping fails.
pub fn read_height_texture(
    gpu: &GpuContext,
    texture: &wgpu::Texture,
) -> Result<Vec<f32>, ReliefError> {
    let width = texture.width();
    let height = texture.height();
    let unpadded_row = width * 4;
    let padded_row = unpadded_row.div_ceil(ROW_ALIGN) * ROW_ALIGN;

    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Height Readback"),
        size: u64::from(padded_row) * u64::from(height),
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = gpu.create_encoder();
    encoder.copy_texture_to_buffer(
        texture.as_image_copy(),
        wgpu::TexelCopyBufferInfo {
            buffer: &staging,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    gpu.submit_and_wait(encoder);

    map_and_unpad(gpu, &staging, width, height, padded_row)
}

/// Read a small storage buffer back to the CPU (min-max reduction results).
///
/// # Errors
///
/// Returns [`ReliefError::Readback`] if buffer mapping fails.
pub fn read_buffer_f32(
    gpu: &GpuContext,
    buffer: &wgpu::Buffer,
    count: usize,
) -> Result<Vec<f32>, ReliefError> {
    let size = (count * 4) as u64;
    let staging = gpu.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Buffer Readback"),
        size,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });
    let mut encoder = gpu.create_encoder();
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    gpu.submit_and_wait(encoder);

    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = gpu.device.poll(wgpu::PollType::Wait);
    rx.recv()
        .map_err(|e| ReliefError::Readback(e.to_string()))?
        .map_err(|e| ReliefError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let values = bytemuck::cast_slice::<u8, f32>(&data).to_vec();
    drop(data);
    staging.unmap();
    Ok(values)
}

fn map_and_unpad(
    gpu: &GpuContext,
    staging: &wgpu::Buffer,
    width: u32,
    height: u32,
    padded_row: u32,
) -> Result<Vec<f32>, ReliefError> {
    let slice = staging.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    let _ = gpu.device.poll(wgpu::PollType::Wait);
    rx.recv()
        .map_err(|e| ReliefError::Readback(e.to_string()))?
        .map_err(|e| ReliefError::Readback(e.to_string()))?;

    let data = slice.get_mapped_range();
    let mut pixels = Vec::with_capacity((width * height) as usize);
    for row in 0..height {
        let start = (row * padded_row) as usize;
        let end = start + (width * 4) as usize;
        pixels.extend_from_slice(bytemuck::cast_slice(&data[start..end]));
    }
    drop(data);
    staging.unmap();
    Ok(pixels)
}
