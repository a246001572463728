use anyhow::{Context, Result};

use super::GpuInit;

/// Owns the wgpu core objects for headless rendering.
///
/// - creates and stores Instance/Adapter/Device/Queue
/// - remembers the requested offscreen target configuration
pub struct Gpu {
    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,

    target_size: (u32, u32),
    target_format: wgpu::TextureFormat,
}

impl Gpu {
    /// Creates a GPU context without a surface.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu.
    pub async fn new(init: GpuInit) -> Result<Self> {
        let GpuInit {
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
            target_size,
            target_format,
        } = init;
        anyhow::ensure!(
            target_size.0 > 0 && target_size.1 > 0,
            "render target has zero size"
        );

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("nabu device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        Ok(Self {
            adapter,
            device,
            queue,
            target_size,
            target_format,
        })
    }

    /// Blocking wrapper around [`Gpu::new`] for callers without an executor.
    pub fn new_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::new(init))
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn target_size(&self) -> (u32, u32) {
        self.target_size
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }
}
