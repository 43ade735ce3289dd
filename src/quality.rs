// src/quality.rs
//! Device capability probing and the texture resolutions derived from it.
//!
//! [`QualityManager`] is the only place texture sizes are decided. The
//! settings are computed once on first use and memoised.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use log::info;
use serde::{Deserialize, Serialize};

use crate::config::QualityConfig;

const MIB: u64 = 1024 * 1024;

/// Floor for the derived cache byte budget.
const MIN_CACHE_BUDGET: u64 = 32 * MIB;

/// Coarse GPU performance class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuTier {
    Low,
    Medium,
    High,
}

impl GpuTier {
    pub fn step_down(self) -> Self {
        match self {
            GpuTier::High => GpuTier::Medium,
            GpuTier::Medium | GpuTier::Low => GpuTier::Low,
        }
    }

    /// (texture, low-res placeholder, shadow map, pixel ratio cap)
    fn table(self) -> (u32, u32, u32, f32) {
        match self {
            GpuTier::Low => (512, 64, 1024, 1.0),
            GpuTier::Medium => (1024, 128, 2048, 1.5),
            GpuTier::High => (2048, 256, 4096, 2.0),
        }
    }

    fn cache_budget(self) -> u64 {
        match self {
            GpuTier::Low => 128 * MIB,
            GpuTier::Medium => 256 * MIB,
            GpuTier::High => 512 * MIB,
        }
    }
}

impl fmt::Display for GpuTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            GpuTier::Low => "low",
            GpuTier::Medium => "medium",
            GpuTier::High => "high",
        })
    }
}

/// What the device reports about itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Capabilities {
    pub device_pixel_ratio: f32,
    pub gpu_tier: GpuTier,
    pub max_texture_dimension: u32,
    /// Total system memory, when the platform exposes it.
    pub system_memory_bytes: Option<u64>,
}

pub trait CapabilityProbe: Send + Sync {
    fn probe(&self) -> Capabilities;
}

/// Fixed capabilities, for tests and headless runs.
#[derive(Debug, Clone)]
pub struct StaticProbe(pub Capabilities);

impl StaticProbe {
    pub fn headless() -> Self {
        Self(Capabilities {
            device_pixel_ratio: 1.0,
            gpu_tier: GpuTier::Low,
            max_texture_dimension: 2048,
            system_memory_bytes: None,
        })
    }
}

impl CapabilityProbe for StaticProbe {
    fn probe(&self) -> Capabilities {
        self.0.clone()
    }
}

/// Classifies a wgpu adapter.
pub struct AdapterProbe {
    info: wgpu::AdapterInfo,
    limits: wgpu::Limits,
    device_pixel_ratio: f32,
}

impl AdapterProbe {
    pub fn new(adapter: &wgpu::Adapter, device_pixel_ratio: f64) -> Self {
        Self {
            info: adapter.get_info(),
            limits: adapter.limits(),
            device_pixel_ratio: device_pixel_ratio as f32,
        }
    }

    fn classify(&self) -> GpuTier {
        let max_dim = self.limits.max_texture_dimension_2d;
        let tier = match self.info.device_type {
            wgpu::DeviceType::DiscreteGpu if max_dim >= 16384 => GpuTier::High,
            wgpu::DeviceType::DiscreteGpu => GpuTier::Medium,
            wgpu::DeviceType::IntegratedGpu if max_dim < 8192 => GpuTier::Low,
            wgpu::DeviceType::IntegratedGpu => GpuTier::Medium,
            wgpu::DeviceType::Cpu | wgpu::DeviceType::VirtualGpu | wgpu::DeviceType::Other => {
                GpuTier::Low
            }
        };
        // WebGL2 and desktop GL fall short of the high tier's shadow sizes.
        if self.info.backend == wgpu::Backend::Gl {
            tier.min(GpuTier::Medium)
        } else {
            tier
        }
    }
}

impl CapabilityProbe for AdapterProbe {
    fn probe(&self) -> Capabilities {
        Capabilities {
            device_pixel_ratio: self.device_pixel_ratio,
            gpu_tier: self.classify(),
            max_texture_dimension: self.limits.max_texture_dimension_2d,
            system_memory_bytes: system_memory(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn system_memory() -> Option<u64> {
    let mut sys = sysinfo::System::new();
    sys.refresh_memory();
    match sys.total_memory() {
        0 => None,
        bytes => Some(bytes),
    }
}

#[cfg(target_arch = "wasm32")]
fn system_memory() -> Option<u64> {
    None
}

/// Resolutions and budgets every other component reads.
#[derive(Debug, Clone, PartialEq)]
pub struct QualitySettings {
    pub gpu_tier: GpuTier,
    /// Edge length of high-resolution generated textures.
    pub texture_resolution: u32,
    /// Edge length of placeholders.
    pub low_res_resolution: u32,
    /// Shadow map edge length for renderers that run a shadow pass.
    pub shadow_map_resolution: u32,
    /// Highest device pixel ratio the swapchain is rendered at.
    pub pixel_ratio_cap: f32,
    pub cache_budget_bytes: u64,
}

impl QualitySettings {
    pub fn derive(caps: &Capabilities, config: &QualityConfig) -> Self {
        let tier = match config.tier_override {
            Some(tier) => tier,
            // Dense displays multiply fill cost; back off one tier.
            None if caps.device_pixel_ratio > 2.5 && caps.gpu_tier != GpuTier::High => {
                caps.gpu_tier.step_down()
            }
            None => caps.gpu_tier,
        };
        let (texture, low, shadow, ratio_cap) = tier.table();

        let mut ceiling = pow2_floor(caps.max_texture_dimension.max(1));
        if let Some(max) = config.max_texture_resolution {
            ceiling = ceiling.min(pow2_floor(max.max(1)));
        }
        let texture_resolution = texture.min(ceiling);
        let low_res_resolution = low.min(texture_resolution);
        let shadow_map_resolution = shadow.min(pow2_floor(caps.max_texture_dimension.max(1)));

        let mut pixel_ratio_cap = ratio_cap.min(caps.device_pixel_ratio.max(1.0));
        if let Some(max) = config.max_pixel_ratio {
            pixel_ratio_cap = pixel_ratio_cap.min(max);
        }

        let mut cache_budget_bytes = tier.cache_budget();
        if let Some(mem) = caps.system_memory_bytes {
            cache_budget_bytes = cache_budget_bytes.min(mem / 16);
        }
        let cache_budget_bytes = cache_budget_bytes.max(MIN_CACHE_BUDGET);

        Self {
            gpu_tier: tier,
            texture_resolution,
            low_res_resolution,
            shadow_map_resolution,
            pixel_ratio_cap,
            cache_budget_bytes,
        }
    }

    /// Swapchain size for a window of `width` x `height` physical pixels.
    ///
    /// Past the pixel ratio cap the surface is rendered smaller and the
    /// compositor scales it up.
    pub fn surface_size(&self, width: u32, height: u32, scale_factor: f64) -> (u32, u32) {
        let cap = f64::from(self.pixel_ratio_cap.max(1.0));
        if scale_factor <= cap {
            return (width.max(1), height.max(1));
        }
        let scale = cap / scale_factor;
        let shrink = |n: u32| ((f64::from(n) * scale).round() as u32).max(1);
        (shrink(width), shrink(height))
    }
}

fn pow2_floor(n: u32) -> u32 {
    1 << (31 - n.leading_zeros())
}

/// Lazily probes the device once and hands out the derived settings.
pub struct QualityManager {
    probe: Box<dyn CapabilityProbe>,
    config: QualityConfig,
    settings: OnceLock<QualitySettings>,
    probes: AtomicU64,
}

impl QualityManager {
    pub fn new(probe: impl CapabilityProbe + 'static, config: QualityConfig) -> Self {
        Self {
            probe: Box::new(probe),
            config,
            settings: OnceLock::new(),
            probes: AtomicU64::new(0),
        }
    }

    /// Memoised settings. The probe runs on the first call only.
    pub fn settings(&self) -> &QualitySettings {
        self.settings.get_or_init(|| {
            let settings = self.rederive();
            info!(
                "quality: tier={} texture={} low={} shadow={} cache={} MiB",
                settings.gpu_tier,
                settings.texture_resolution,
                settings.low_res_resolution,
                settings.shadow_map_resolution,
                settings.cache_budget_bytes / MIB
            );
            settings
        })
    }

    /// Probes again and returns fresh settings without touching the memo.
    pub fn rederive(&self) -> QualitySettings {
        self.probes.fetch_add(1, Ordering::Relaxed);
        QualitySettings::derive(&self.probe.probe(), &self.config)
    }

    pub fn probe_count(&self) -> u64 {
        self.probes.load(Ordering::Relaxed)
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(tier: GpuTier, dpr: f32, max_dim: u32) -> Capabilities {
        Capabilities {
            device_pixel_ratio: dpr,
            gpu_tier: tier,
            max_texture_dimension: max_dim,
            system_memory_bytes: None,
        }
    }

    #[test]
    fn settings_are_memoised() {
        let qm = QualityManager::new(StaticProbe::headless(), QualityConfig::default());
        let a = qm.settings().clone();
        let b = qm.settings().clone();
        assert_eq!(a, b);
        assert_eq!(qm.probe_count(), 1);
        qm.rederive();
        assert_eq!(qm.probe_count(), 2);
    }

    #[test]
    fn tier_table_drives_resolutions() {
        let cfg = QualityConfig::default();
        let low = QualitySettings::derive(&caps(GpuTier::Low, 1.0, 16384), &cfg);
        let mid = QualitySettings::derive(&caps(GpuTier::Medium, 1.0, 16384), &cfg);
        let high = QualitySettings::derive(&caps(GpuTier::High, 2.0, 16384), &cfg);
        assert_eq!((low.texture_resolution, low.low_res_resolution), (512, 64));
        assert_eq!((mid.texture_resolution, mid.shadow_map_resolution), (1024, 2048));
        assert_eq!((high.texture_resolution, high.shadow_map_resolution), (2048, 4096));
        assert_eq!(high.pixel_ratio_cap, 2.0);
    }

    #[test]
    fn resolutions_never_exceed_device_limit() {
        let s = QualitySettings::derive(&caps(GpuTier::High, 1.0, 1500), &QualityConfig::default());
        assert_eq!(s.texture_resolution, 1024);
        assert_eq!(s.shadow_map_resolution, 1024);
        assert!(s.low_res_resolution <= s.texture_resolution);
    }

    #[test]
    fn config_caps_and_overrides_apply() {
        let cfg = QualityConfig::default()
            .with_tier(GpuTier::High)
            .with_max_texture_resolution(700);
        let s = QualitySettings::derive(&caps(GpuTier::Low, 1.0, 16384), &cfg);
        assert_eq!(s.gpu_tier, GpuTier::High);
        assert_eq!(s.texture_resolution, 512);
        assert_eq!(s.low_res_resolution, 256);
    }

    #[test]
    fn dense_displays_step_down_below_high() {
        let cfg = QualityConfig::default();
        let s = QualitySettings::derive(&caps(GpuTier::Medium, 3.0, 16384), &cfg);
        assert_eq!(s.gpu_tier, GpuTier::Low);
        let s = QualitySettings::derive(&caps(GpuTier::High, 3.0, 16384), &cfg);
        assert_eq!(s.gpu_tier, GpuTier::High);
    }

    #[test]
    fn cache_budget_follows_memory_with_floor() {
        let cfg = QualityConfig::default();
        let mut c = caps(GpuTier::High, 1.0, 16384);
        c.system_memory_bytes = Some(4096 * MIB);
        assert_eq!(QualitySettings::derive(&c, &cfg).cache_budget_bytes, 256 * MIB);
        c.system_memory_bytes = Some(64 * MIB);
        assert_eq!(QualitySettings::derive(&c, &cfg).cache_budget_bytes, MIN_CACHE_BUDGET);
        c.system_memory_bytes = None;
        assert_eq!(QualitySettings::derive(&c, &cfg).cache_budget_bytes, 512 * MIB);
    }

    #[test]
    fn surface_is_shrunk_past_the_pixel_ratio_cap() {
        let cfg = QualityConfig::default();
        let low = QualitySettings::derive(&caps(GpuTier::Low, 3.0, 16384), &cfg);
        assert_eq!(low.pixel_ratio_cap, 1.0);
        assert_eq!(low.surface_size(3000, 1500, 3.0), (1000, 500));

        let high = QualitySettings::derive(&caps(GpuTier::High, 2.0, 16384), &cfg);
        assert_eq!(high.surface_size(1600, 900, 2.0), (1600, 900));
        assert_eq!(high.surface_size(1600, 900, 1.0), (1600, 900));
        assert_eq!(high.surface_size(0, 0, 4.0), (1, 1));
    }

    #[test]
    fn pow2_floor_rounds_down() {
        assert_eq!(pow2_floor(1), 1);
        assert_eq!(pow2_floor(1500), 1024);
        assert_eq!(pow2_floor(2048), 2048);
    }
}
