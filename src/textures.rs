// src/textures.rs
//! Front door for procedural textures: sizes requests from the quality
//! settings and wires the generators into the progressive loader.

use std::sync::Arc;

use log::debug;

use crate::config::{LoaderConfig, YardConfig};
use crate::descriptor::{GeneratorParams, MapKind, MaterialFamily, TextureDescriptor};
use crate::environment::GpuEnvironment;
use crate::error::Result;
use crate::generators::{synthesize, GenerationJob};
use crate::gpu::TextureUploader;
use crate::loader::{LoadOptions, Progressive, ProgressiveLoader, PumpReport};
use crate::material::{IntoMaterialMap, PendingMaps, SharedMaterial};
use crate::quality::QualityManager;
use crate::scheduler::Priority;
use crate::synthesis::Synthesis;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureRequest {
    pub family: MaterialFamily,
    pub map: MapKind,
    pub params: GeneratorParams,
    pub priority: Priority,
}

impl TextureRequest {
    pub fn new(family: MaterialFamily, map: MapKind) -> Self {
        Self {
            family,
            map,
            params: GeneratorParams::default(),
            priority: Priority::Medium,
        }
    }

    pub fn with_params(mut self, params: GeneratorParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

pub struct ProceduralTextures<U: TextureUploader> {
    env: GpuEnvironment,
    quality: Arc<QualityManager>,
    loader: Arc<ProgressiveLoader<U::Output>>,
    uploader: Arc<U>,
    config: LoaderConfig,
}

impl<U> ProceduralTextures<U>
where
    U: TextureUploader + 'static,
{
    /// The cache byte budget comes from the config when set, otherwise from
    /// the quality settings.
    pub fn new(env: GpuEnvironment, quality: Arc<QualityManager>, uploader: U, config: &YardConfig) -> Self {
        let max_bytes = config
            .cache
            .max_bytes
            .unwrap_or_else(|| quality.settings().cache_budget_bytes);
        let loader = ProgressiveLoader::with_limits(config.cache.max_entries(), max_bytes);
        Self {
            env,
            quality,
            loader: Arc::new(loader),
            uploader: Arc::new(uploader),
            config: config.loader.clone(),
        }
    }

    /// Placeholder now, high resolution later. `None` when headless.
    pub fn request(&self, request: TextureRequest) -> Option<Progressive<U::Output>> {
        if !self.env.is_gpu_capable() {
            debug!("{}/{}: headless, no texture", request.family, request.map);
            return None;
        }
        let settings = self.quality.settings();
        let desc = TextureDescriptor::new(
            request.family,
            request.map,
            settings.texture_resolution,
            request.params,
        );
        let options = LoadOptions::default()
            .with_priority(request.priority)
            .with_sizes(settings.low_res_resolution, settings.texture_resolution);

        let uploader = self.uploader.clone();
        let low = move |size: u32| -> Result<U::Output> {
            let desc = desc.at_size(size);
            uploader.upload(desc.cache_key().as_str(), synthesize(&desc)?)
        };

        let uploader = self.uploader.clone();
        let rows = self.config.rows_per_step;
        let high = move |size: u32| -> Result<_> {
            let desc = desc.at_size(size);
            let label = desc.cache_key();
            let job = GenerationJob::new(desc, rows)?;
            Ok(job.map_output(move |pixels| uploader.upload(label.as_str(), pixels)))
        };

        Some(self.loader.load_progressive(desc.cache_key(), low, high, options))
    }

    /// Requests every map of `family` and tracks the upgrades for `material`.
    pub fn request_set(
        &self,
        family: MaterialFamily,
        params: GeneratorParams,
        priority: Priority,
        material: SharedMaterial,
    ) -> Option<PendingMaps<U::Output>>
    where
        U::Output: IntoMaterialMap,
    {
        let mut pending = PendingMaps::new(material);
        for map in MapKind::ALL {
            let request = TextureRequest::new(family, map)
                .with_params(params)
                .with_priority(priority);
            let progressive = self.request(request)?;
            pending.track(map, progressive.placeholder, progressive.upgrade);
        }
        Some(pending)
    }

    /// Runs queued synthesis within the configured frame budget.
    pub fn pump(&self) -> PumpReport {
        self.loader.pump(self.config.frame_budget())
    }

    pub fn loader(&self) -> &Arc<ProgressiveLoader<U::Output>> {
        &self.loader
    }

    pub fn quality(&self) -> &QualityManager {
        &self.quality
    }
}
