//! Crate-level error types.

use std::fmt;

use crate::gpu::context::GpuContextError;

/// Errors produced by the relief crate.
#[derive(Debug)]
pub enum ReliefError {
    /// GPU context initialization failure.
    Gpu(GpuContextError),
    /// WGSL shader composition failure.
    ShaderCompose(String),
    /// GPU readback failure (buffer mapping or device loss).
    Readback(String),
    /// A named scene object, image, or node group does not exist.
    TargetNotFound(String),
    /// Image pixel data is missing or inconsistent with its size.
    ImageData(String),
    /// Generic I/O failure.
    Io(std::io::Error),
    /// TOML settings parsing/serialization failure.
    SettingsParse(String),
}

impl fmt::Display for ReliefError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpu(e) => write!(f, "GPU error: {e}"),
            Self::ShaderCompose(msg) => {
                write!(f, "shader composition error: {msg}")
            }
            Self::Readback(msg) => write!(f, "GPU readback error: {msg}"),
            Self::TargetNotFound(name) => {
                write!(f, "target not found: {name}")
            }
            Self::ImageData(msg) => write!(f, "image data error: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::SettingsParse(msg) => {
                write!(f, "settings parse error: {msg}")
            }
        }
    }
}

impl std::error::Error for ReliefError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gpu(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuContextError> for ReliefError {
    fn from(e: GpuContextError) -> Self {
        Self::Gpu(e)
    }
}

impl From<std::io::Error> for ReliefError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}
