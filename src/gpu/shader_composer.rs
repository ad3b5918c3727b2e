//! WGSL composition via `naga_oil` with `#import` support.
//!
//! Shared modules (fullscreen vertex helper, height-domain conversions)
//! are pre-loaded at construction; entry shaders pull them in with
//! `#import relief::...`. Composition produces `naga::Module` IR directly,
//! skipping a WGSL re-parse at runtime.

use std::borrow::Cow;

use naga_oil::compose::{
    ComposableModuleDescriptor, Composer, NagaModuleDescriptor,
    ShaderLanguage, ShaderType,
};

use crate::error::ReliefError;

/// Every WGSL entry shader the engine compiles, by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shader {
    /// Flat depth-tested heightmap projection pass.
    HeightFlat,
    /// Equirectangular hemisphere pass.
    HeightEquirect,
    /// Polar-cap pass into the square auxiliary raster.
    HeightPolar,
    /// Bilinear clamped resample pass.
    Resize,
    /// `scale * (A + factor * B)` arithmetic kernel.
    ScaledAdd,
    /// Polar-cap to equirectangular band remap kernel.
    PolarRemap,
    /// Sentinel-aware min-max reduction kernel.
    MinMax,
    /// Affine `h * mul + add` rescale kernel.
    Rescale,
    /// In-place sRGB linearization kernel.
    Linearize,
}

impl Shader {
    fn source(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::HeightFlat => (
                include_str!("../../assets/shaders/height.wgsl"),
                "height.wgsl",
                "Height Flat",
            ),
            Self::HeightEquirect => (
                include_str!("../../assets/shaders/height_equirect.wgsl"),
                "height_equirect.wgsl",
                "Height Equirect",
            ),
            Self::HeightPolar => (
                include_str!("../../assets/shaders/height_polar.wgsl"),
                "height_polar.wgsl",
                "Height Polar",
            ),
            Self::Resize => (
                include_str!("../../assets/shaders/resize.wgsl"),
                "resize.wgsl",
                "Resize",
            ),
            Self::ScaledAdd => (
                include_str!("../../assets/shaders/scaled_add.wgsl"),
                "scaled_add.wgsl",
                "Scaled Add",
            ),
            Self::PolarRemap => (
                include_str!("../../assets/shaders/polar_remap.wgsl"),
                "polar_remap.wgsl",
                "Polar Remap",
            ),
            Self::MinMax => (
                include_str!("../../assets/shaders/minmax.wgsl"),
                "minmax.wgsl",
                "MinMax",
            ),
            Self::Rescale => (
                include_str!("../../assets/shaders/rescale.wgsl"),
                "rescale.wgsl",
                "Rescale",
            ),
            Self::Linearize => (
                include_str!("../../assets/shaders/linearize.wgsl"),
                "linearize.wgsl",
                "Linearize",
            ),
        }
    }
}

/// Shared module definition: source plus its registration path.
struct ModuleDef {
    source: &'static str,
    file_path: &'static str,
}

/// Wraps `naga_oil::compose::Composer` for the engine's shader set.
pub struct ShaderComposer {
    composer: Composer,
}

impl ShaderComposer {
    /// Create a composer with every shared module registered.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ShaderCompose`] when a shared module fails
    /// to parse.
    pub fn new() -> Result<Self, ReliefError> {
        let mut composer = Composer::default();

        // Register shared modules in dependency order.
        let modules: &[ModuleDef] = &[
            ModuleDef {
                source: include_str!(
                    "../../assets/shaders/modules/fullscreen.wgsl"
                ),
                file_path: "modules/fullscreen.wgsl",
            },
            ModuleDef {
                source: include_str!(
                    "../../assets/shaders/modules/height_domain.wgsl"
                ),
                file_path: "modules/height_domain.wgsl",
            },
        ];

        for m in modules {
            let _ = composer
                .add_composable_module(ComposableModuleDescriptor {
                    source: m.source,
                    file_path: m.file_path,
                    language: ShaderLanguage::Wgsl,
                    ..Default::default()
                })
                .map_err(|e| {
                    ReliefError::ShaderCompose(format!(
                        "module '{}': {e:?}",
                        m.file_path
                    ))
                })?;
        }

        Ok(Self { composer })
    }

    /// Compose an entry shader into a `wgpu::ShaderModule` ready for
    /// pipeline creation.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ShaderCompose`] when composition fails.
    pub fn compose(
        &mut self,
        device: &wgpu::Device,
        shader: Shader,
    ) -> Result<wgpu::ShaderModule, ReliefError> {
        let (source, file_path, label) = shader.source();
        let naga_module = self
            .composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(|e| {
                ReliefError::ShaderCompose(format!("'{file_path}': {e}"))
            })?;

        Ok(device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Naga(Cow::Owned(naga_module)),
        }))
    }

    /// Compose an entry shader into a `naga::Module` without creating a
    /// wgpu shader module. Useful for testing shader composition without
    /// a GPU device.
    ///
    /// # Errors
    ///
    /// Returns [`ReliefError::ShaderCompose`] when composition fails.
    pub fn compose_naga(
        &mut self,
        shader: Shader,
    ) -> Result<naga::Module, ReliefError> {
        let (source, file_path, _) = shader.source();
        self.composer
            .make_naga_module(NagaModuleDescriptor {
                source,
                file_path,
                shader_type: ShaderType::Wgsl,
                ..Default::default()
            })
            .map_err(|e| {
                ReliefError::ShaderCompose(format!("'{file_path}': {e}"))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_shader_composes() {
        let mut composer = ShaderComposer::new().unwrap();
        for shader in [
            Shader::HeightFlat,
            Shader::HeightEquirect,
            Shader::HeightPolar,
            Shader::Resize,
            Shader::ScaledAdd,
            Shader::PolarRemap,
            Shader::MinMax,
            Shader::Rescale,
            Shader::Linearize,
        ] {
            let module = composer.compose_naga(shader);
            assert!(module.is_ok(), "{shader:?}: {:?}", module.err());
        }
    }
}
