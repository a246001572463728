/// Initialization parameters for the headless GPU layer.
///
/// Add configuration flags only when a concrete backend requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub power_preference: wgpu::PowerPreference,

    /// Accept a software adapter when no hardware adapter is available.
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    pub required_limits: wgpu::Limits,

    /// Offscreen color target size in pixels.
    pub target_size: (u32, u32),

    pub target_format: wgpu::TextureFormat,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            target_size: (640, 480),
            target_format: wgpu::TextureFormat::Rgba8UnormSrgb,
        }
    }
}
