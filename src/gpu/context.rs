//! Explicitly constructed GPU device object.
//!
//! The engine holds one [`GpuContext`] and threads it through every
//! operation; there is no process-wide device or program registry.
//! Headless by design - heightmap generation renders off-screen only.

use std::fmt;

/// Errors that can occur during GPU context initialization.
#[derive(Debug)]
pub enum GpuContextError {
    /// No compatible GPU adapter found.
    AdapterRequest(wgpu::RequestAdapterError),
    /// GPU device request failed (limits or features not met).
    DeviceRequest(wgpu::RequestDeviceError),
}

impl fmt::Display for GpuContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AdapterRequest(e) => {
                write!(f, "no compatible GPU adapter found: {e}")
            }
            Self::DeviceRequest(e) => write!(f, "device request failed: {e}"),
        }
    }
}

impl std::error::Error for GpuContextError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::AdapterRequest(e) => Some(e),
            Self::DeviceRequest(e) => Some(e),
        }
    }
}

/// Owns the core wgpu resources: device and queue (no surface).
pub struct GpuContext {
    /// The wgpu logical device.
    pub device: wgpu::Device,
    /// The wgpu command queue.
    pub queue: wgpu::Queue,
}

impl GpuContext {
    /// Create a headless render context.
    ///
    /// Requests `FLOAT32_FILTERABLE` (bilinear resampling of R32Float
    /// rasters) and compute limits sufficient for 32x32 workgroups.
    ///
    /// # Errors
    ///
    /// Returns [`GpuContextError`] if no adapter is available or the device
    /// request fails.
    pub async fn new() -> Result<Self, GpuContextError> {
        let instance = wgpu::Instance::default();

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                ..Default::default()
            })
            .await
            .map_err(GpuContextError::AdapterRequest)?;

        // Polar remap and texture arithmetic dispatch 32x32 workgroups.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: adapter_limits
                .max_compute_invocations_per_workgroup
                .min(1024),
            max_compute_workgroup_size_x: adapter_limits
                .max_compute_workgroup_size_x
                .min(1024),
            max_compute_workgroup_size_y: adapter_limits
                .max_compute_workgroup_size_y
                .min(1024),
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Relief Device"),
                required_features: wgpu::Features::FLOAT32_FILTERABLE,
                required_limits,
                ..Default::default()
            })
            .await
            .map_err(GpuContextError::DeviceRequest)?;

        log::info!(
            "GPU context created on adapter '{}'",
            adapter.get_info().name
        );

        Ok(Self { device, queue })
    }

    /// Blocking variant of [`GpuContext::new`] for the synchronous engine.
    ///
    /// # Errors
    ///
    /// Same as [`GpuContext::new`].
    pub fn new_blocking() -> Result<Self, GpuContextError> {
        pollster::block_on(Self::new())
    }

    /// Create a context from an externally-owned device and queue.
    #[must_use]
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Create a new command encoder for recording GPU commands.
    pub fn create_encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Relief Encoder"),
            })
    }

    /// Submit the encoder and block until the device has finished all work.
    ///
    /// Every engine operation ends here: atomicity granularity is one call.
    pub fn submit_and_wait(&self, encoder: wgpu::CommandEncoder) {
        let _ = self.queue.submit(std::iter::once(encoder.finish()));
        let _ = self.device.poll(wgpu::PollType::Wait);
    }
}
