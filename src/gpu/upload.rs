// src/gpu/upload.rs
//! Turning generated pixels into renderer resources.

use std::sync::Arc;

use crate::cache::Footprint;
use crate::error::{Error, Result};
use crate::pixels::PixelBuffer;
use crate::registry::GpuResource;

use super::texture::{GpuTexture, UploadConfig};

/// Converts a finished [`PixelBuffer`] into whatever the renderer samples.
pub trait TextureUploader: Send + Sync {
    type Output: Clone + Footprint + Send + Sync + 'static;

    fn upload(&self, label: &str, pixels: PixelBuffer) -> Result<Self::Output>;
}

impl<U: TextureUploader + ?Sized> TextureUploader for Arc<U> {
    type Output = U::Output;

    fn upload(&self, label: &str, pixels: PixelBuffer) -> Result<Self::Output> {
        (**self).upload(label, pixels)
    }
}

pub struct WgpuUploader {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: UploadConfig,
}

impl WgpuUploader {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>, config: UploadConfig) -> Self {
        Self { device, queue, config }
    }
}

impl TextureUploader for WgpuUploader {
    type Output = Arc<GpuTexture>;

    fn upload(&self, label: &str, pixels: PixelBuffer) -> Result<Self::Output> {
        GpuTexture::from_pixels(&self.device, &self.queue, label, &pixels, &self.config)
            .map(Arc::new)
            .map_err(|err| Error::from(err).context(format!("uploading {label}")))
    }
}

/// Keeps textures on the CPU. Used headless and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuUploader;

impl TextureUploader for CpuUploader {
    type Output = Arc<PixelBuffer>;

    fn upload(&self, _label: &str, pixels: PixelBuffer) -> Result<Self::Output> {
        Ok(Arc::new(pixels))
    }
}

// CPU-side maps own no GPU memory.
impl GpuResource for PixelBuffer {
    fn label(&self) -> &str {
        "cpu-pixels"
    }

    fn dispose(&self) -> Result<()> {
        Ok(())
    }
}
