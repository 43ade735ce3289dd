// src/gpu/texture.rs
//! GPU-resident textures built from generator output.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{ensure, Context as _};
use image::{ImageBuffer, Rgba};
use log::trace;

use crate::cache::Footprint;
use crate::error::Result;
use crate::pixels::PixelBuffer;
use crate::registry::GpuResource;

/// How generated textures are uploaded and sampled.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub generate_mipmaps: bool,
    pub anisotropy_clamp: u16,
    pub filter: wgpu::FilterMode,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            anisotropy_clamp: 1,
            filter: wgpu::FilterMode::Linear,
        }
    }
}

impl UploadConfig {
    pub fn with_mipmaps(mut self, generate: bool) -> Self {
        self.generate_mipmaps = generate;
        self
    }

    pub fn with_anisotropy(mut self, clamp: u16) -> Self {
        self.anisotropy_clamp = clamp.clamp(1, 16);
        self
    }
}

pub struct GpuTexture {
    label: String,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    size: wgpu::Extent3d,
    format: wgpu::TextureFormat,
    mip_level_count: u32,
    bytes: u64,
    destroyed: AtomicBool,
}

impl GpuTexture {
    pub fn max_mip_levels(width: u32, height: u32) -> u32 {
        32 - width.max(height).max(1).leading_zeros()
    }

    /// Uploads `pixels` with a repeating sampler; procedural textures tile.
    pub fn from_pixels(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        label: &str,
        pixels: &PixelBuffer,
        config: &UploadConfig,
    ) -> anyhow::Result<Self> {
        let (width, height) = (pixels.width(), pixels.height());
        ensure!(width > 0 && height > 0, "cannot upload empty texture `{label}`");
        let data = pixels.as_bytes();
        let expected = width as usize * height as usize * 4;
        ensure!(
            data.len() == expected,
            "RGBA data for `{label}` has {} bytes, expected {expected}",
            data.len()
        );

        let mip_level_count = if config.generate_mipmaps {
            Self::max_mip_levels(width, height)
        } else {
            1
        };
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let format = pixels.format().wgpu_format();

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        write_level(queue, &texture, 0, data, width, height);
        let mut bytes = data.len() as u64;
        if mip_level_count > 1 {
            let base = ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, data.to_vec())
                .context("failed to wrap pixel data for mipmapping")?;
            bytes += generate_mipmaps_cpu(queue, &texture, base, mip_level_count);
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: config.filter,
            min_filter: config.filter,
            mipmap_filter: config.filter,
            anisotropy_clamp: if config.filter == wgpu::FilterMode::Linear {
                config.anisotropy_clamp
            } else {
                1
            },
            ..Default::default()
        });

        trace!("uploaded {label}: {width}x{height}, {mip_level_count} mips, {bytes} B");
        Ok(Self {
            label: label.to_string(),
            texture,
            view,
            sampler,
            size,
            format,
            mip_level_count,
            bytes,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.sampler
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn mip_level_count(&self) -> u32 {
        self.mip_level_count
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl Footprint for GpuTexture {
    fn footprint(&self) -> u64 {
        self.bytes
    }
}

impl GpuResource for GpuTexture {
    fn label(&self) -> &str {
        &self.label
    }

    fn dispose(&self) -> Result<()> {
        if !self.destroyed.swap(true, Ordering::AcqRel) {
            self.texture.destroy();
        }
        Ok(())
    }
}

fn write_level(queue: &wgpu::Queue, texture: &wgpu::Texture, level: u32, data: &[u8], width: u32, height: u32) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: level,
            origin: wgpu::Origin3d::ZERO,
        },
        data,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
}

/// Downsamples on the CPU and uploads every level below the base.
/// Returns the bytes uploaded.
fn generate_mipmaps_cpu(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    base: ImageBuffer<Rgba<u8>, Vec<u8>>,
    levels: u32,
) -> u64 {
    let mut src = base;
    let mut bytes = 0;
    for level in 1..levels {
        let w = (src.width() / 2).max(1);
        let h = (src.height() / 2).max(1);
        let dst = image::imageops::resize(&src, w, h, image::imageops::FilterType::Triangle);
        write_level(queue, texture, level, &dst, w, h);
        bytes += dst.len() as u64;
        src = dst;
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_cover_down_to_one_texel() {
        assert_eq!(GpuTexture::max_mip_levels(1, 1), 1);
        assert_eq!(GpuTexture::max_mip_levels(256, 256), 9);
        assert_eq!(GpuTexture::max_mip_levels(300, 16), 9);
    }

    #[test]
    fn anisotropy_is_clamped() {
        assert_eq!(UploadConfig::default().with_anisotropy(64).anisotropy_clamp, 16);
        assert_eq!(UploadConfig::default().with_anisotropy(0).anisotropy_clamp, 1);
    }
}
