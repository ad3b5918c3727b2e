//! GPU plumbing: device context, raster allocation, pipelines, shaders.

pub mod context;
pub mod pipeline_helpers;
pub mod programs;
pub mod shader_composer;
pub mod texture;

pub use context::GpuContext;
pub use programs::ProgramSet;
