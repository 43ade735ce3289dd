// src/environment.rs
//! Detects whether GPU work is possible at all.
//!
//! Headless runs (tests, server-side rendering, CI) skip texture synthesis
//! entirely instead of failing.

use log::info;

/// Environment variable that forces headless mode on native targets.
pub const HEADLESS_ENV: &str = "YARD_GFX_HEADLESS";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuEnvironment {
    /// A window/canvas and a GPU adapter can be created.
    Capable,
    /// No display surface; generators return nothing.
    Headless,
}

impl GpuEnvironment {
    /// Best-effort detection without creating any GPU objects.
    pub fn detect() -> Self {
        let env = Self::detect_inner();
        info!("GPU environment: {:?}", env);
        env
    }

    #[cfg(target_arch = "wasm32")]
    fn detect_inner() -> Self {
        match web_sys::window().and_then(|w| w.document()) {
            Some(_) => GpuEnvironment::Capable,
            None => GpuEnvironment::Headless,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    fn detect_inner() -> Self {
        match std::env::var(HEADLESS_ENV) {
            Ok(v) if is_truthy(&v) => GpuEnvironment::Headless,
            _ => GpuEnvironment::Capable,
        }
    }

    /// Headless when no adapter could be obtained.
    pub fn from_adapter(adapter: Option<&wgpu::Adapter>) -> Self {
        match adapter {
            Some(_) => GpuEnvironment::Capable,
            None => GpuEnvironment::Headless,
        }
    }

    #[inline]
    pub fn is_gpu_capable(self) -> bool {
        self == GpuEnvironment::Capable
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn is_truthy(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
