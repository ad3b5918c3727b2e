//! The heightmap primitive: an exclusively-owned GPU elevation raster.

use crate::error::ReliefError;
use crate::gpu::context::GpuContext;
use crate::gpu::texture::{clone_texture, read_height_texture};

/// Reserved clear value carried by unprojected background pixels.
///
/// Matches the depth-clear sentinel of the projection passes, so "outside
/// the projected footprint" stays distinguishable from a legitimate zero
/// height. Compared bit-exactly; reductions skip it.
pub const BACKGROUND: f32 = 2.0;

/// Radii are clamped away from zero before logarithmic encoding.
pub const MIN_RADIUS: f32 = 1.0e-6;

/// Logarithmic ("planet") domain encoding.
///
/// Makes multiplicative radial scale behave additively under linear
/// texture arithmetic and resampling. CPU mirror of the WGSL helper.
#[must_use]
pub fn log_encode(height: f32) -> f32 {
    height.max(MIN_RADIUS).ln()
}

/// Inverse of [`log_encode`].
#[must_use]
pub fn log_decode(encoded: f32) -> f32 {
    encoded.exp()
}

/// A single-channel 32-bit float elevation raster on the GPU.
///
/// The texture is exclusively owned: by a [`crate::registry::MapRegistry`]
/// entry once registered, or by the local scope that created it. The
/// logarithmic flag is fixed at creation; combining maps with differing
/// flags requires the explicit exponential-domain path of
/// [`crate::compositing::add`].
pub struct HeightMap {
    texture: wgpu::Texture,
    name: String,
    logarithmic: bool,
    size: [u32; 2],
}

impl HeightMap {
    /// Wrap an `R32Float` texture as a heightmap.
    #[must_use]
    pub fn new(
        texture: wgpu::Texture,
        name: impl Into<String>,
        logarithmic: bool,
    ) -> Self {
        let size = [texture.width(), texture.height()];
        Self {
            texture,
            name: name.into(),
            logarithmic,
            size,
        }
    }

    /// The underlying GPU raster (borrow only).
    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    /// Create a default full-texture view.
    #[must_use]
    pub fn create_view(&self) -> wgpu::TextureView {
        self.texture
            .create_view(&wgpu::TextureViewDescriptor::default())
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether heights are stored log-encoded.
    #[must_use]
    pub fn logarithmic(&self) -> bool {
        self.logarithmic
    }

    /// Raster size in texels.
    #[must_use]
    pub fn size(&self) -> [u32; 2] {
        self.size
    }

    /// Clone this map texel-for-texel on the GPU.
    #[must_use]
    pub fn clone_map(&self, gpu: &GpuContext, name: &str) -> Self {
        let texture = clone_texture(gpu, &self.texture, name);
        Self::new(texture, name, self.logarithmic)
    }

    /// Read the raster back to the CPU as row-major `f32` texels.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::Readback`] if buffer mapping fails.
    pub fn read(&self, gpu: &GpuContext) -> Result<Vec<f32>, ReliefError> {
        read_height_texture(gpu, &self.texture)
    }

    /// Unwrap into the owned GPU raster.
    #[must_use]
    pub fn into_texture(self) -> wgpu::Texture {
        self.texture
    }

    /// Release the GPU raster immediately.
    pub fn destroy(self) {
        self.texture.destroy();
    }
}
