// src/lib.rs
//! Resource lifecycle for a procedurally textured industrial yard: one GPU
//! context at a time, cached procedural textures that arrive as
//! low-resolution placeholders first, and device-derived quality settings.

pub mod cache;
pub mod cancel;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod environment;
pub mod error;
pub mod fractal;
pub mod generators;
pub mod gpu;
pub mod loader;
pub mod material;
pub mod pixels;
pub mod quality;
pub mod registry;
pub mod scene;
pub mod scheduler;
pub mod synthesis;
pub mod textures;
pub mod viewer;

pub use cache::{CacheStats, Footprint, ResolutionTier, TextureCache};
pub use config::YardConfig;
pub use descriptor::{CacheKey, GeneratorParams, MapKind, MaterialFamily, TextureDescriptor};
pub use environment::GpuEnvironment;
pub use error::{Error, Result};
pub use loader::{FrameBudget, LoadOptions, LoadState, Loaded, Progressive, ProgressiveLoader, Upgrade};
pub use material::{MapSlot, Material, PendingMaps, SharedMaterial};
pub use quality::{Capabilities, GpuTier, QualityManager, QualitySettings};
pub use registry::{ContextRegistry, GpuResource, RenderBackend, SurfaceLease, TeardownHook};
pub use scheduler::Priority;
pub use textures::{ProceduralTextures, TextureRequest};

#[cfg(target_arch = "wasm32")]
pub use viewer::run;
#[cfg(not(target_arch = "wasm32"))]
pub use viewer::run_native;

/// Installs the platform logger. Safe to call more than once.
#[cfg(not(target_arch = "wasm32"))]
pub fn init_logging() {
    use log::LevelFilter;

    let _ = env_logger::Builder::new()
        .filter_level(if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .format_timestamp_millis()
        .format_target(false)
        .parse_default_env()
        .try_init();
}

#[cfg(target_arch = "wasm32")]
pub fn init_logging() {
    std::panic::set_hook(Box::new(console_error_panic_hook::hook));
    let _ = console_log::init_with_level(log::Level::Debug);
}
