// src/pixels.rs
//! CPU-side RGBA8 pixel buffers produced by the generators.

use std::path::Path;

use bytemuck::{Pod, Zeroable};
use image::{ImageBuffer, Rgba as ImageRgba};

use crate::context::{Context, OptionContext};
use crate::error::Result;

/// Colour space of the stored bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// sRGB encoded colour (albedo).
    Rgba8Srgb,
    /// Linear data (normals, packed ORM).
    Rgba8Unorm,
}

impl PixelFormat {
    pub fn wgpu_format(self) -> wgpu::TextureFormat {
        match self {
            PixelFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            PixelFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
        }
    }
}

/// One RGBA8 texel.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct Rgba(pub [u8; 4]);

impl Rgba {
    pub const BLACK: Rgba = Rgba([0, 0, 0, 255]);

    #[inline]
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Rgba([r, g, b, 255])
    }

    /// Adds a signed delta to the colour channels, clamping each to `0..=255`.
    #[inline]
    pub fn add(&mut self, delta: [f32; 3]) {
        for (c, d) in self.0.iter_mut().take(3).zip(delta) {
            *c = clamp_channel(*c as f32 + d);
        }
    }

    /// Adds the same delta to all colour channels.
    #[inline]
    pub fn add_luma(&mut self, delta: f32) {
        self.add([delta; 3]);
    }

    /// Linear blend towards `target` by `t` in `[0, 1]`.
    #[inline]
    pub fn mix(&mut self, target: [u8; 3], t: f32) {
        let t = t.clamp(0.0, 1.0);
        for (c, goal) in self.0.iter_mut().take(3).zip(target) {
            *c = clamp_channel(*c as f32 + (goal as f32 - *c as f32) * t);
        }
    }

    /// Multiplies colour channels by `factor`, clamped.
    #[inline]
    pub fn scale(&mut self, factor: f32) {
        for c in self.0.iter_mut().take(3) {
            *c = clamp_channel(*c as f32 * factor);
        }
    }
}

/// Rounds and clamps a channel value into `0..=255`.
#[inline]
pub fn clamp_channel(v: f32) -> u8 {
    if v.is_nan() {
        0
    } else {
        v.round().clamp(0.0, 255.0) as u8
    }
}

/// Square-or-rectangular RGBA8 image in row-major order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * 4;
        Self {
            width,
            height,
            format,
            data: vec![0; len],
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Byte footprint once uploaded (single mip).
    #[inline]
    pub fn byte_len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn texels(&self) -> &[Rgba] {
        bytemuck::cast_slice(&self.data)
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> Rgba {
        self.texels()[self.index(x, y)]
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, texel: Rgba) {
        let i = self.index(x, y);
        bytemuck::cast_slice_mut::<u8, Rgba>(&mut self.data)[i] = texel;
    }

    /// Mutable view of one row.
    pub fn row_mut(&mut self, y: u32) -> &mut [Rgba] {
        let w = self.width as usize;
        let start = y as usize * w;
        &mut bytemuck::cast_slice_mut::<u8, Rgba>(&mut self.data)[start..start + w]
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Writes the buffer out as a PNG, for inspecting generator output.
    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let img: ImageBuffer<ImageRgba<u8>, _> =
            ImageBuffer::from_raw(self.width, self.height, self.data.clone())
                .context("pixel buffer length does not match its dimensions")?;
        img.save(path)
            .with_context(|| format!("failed to save PNG to {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_saturates_in_both_directions() {
        let mut t = Rgba::rgb(250, 5, 128);
        t.add([40.0, -40.0, 0.4]);
        assert_eq!(t, Rgba::rgb(255, 0, 128));
        t.add_luma(1e9);
        assert_eq!(t, Rgba::rgb(255, 255, 255));
    }

    #[test]
    fn mix_and_scale_stay_in_range() {
        let mut t = Rgba::rgb(100, 100, 100);
        t.mix([200, 0, 100], 2.0);
        assert_eq!(t, Rgba::rgb(200, 0, 100));
        t.scale(3.0);
        assert_eq!(t, Rgba::rgb(255, 0, 255));
    }

    #[test]
    fn set_and_get_roundtrip_through_rows() {
        let mut buf = PixelBuffer::new(4, 3, PixelFormat::Rgba8Unorm);
        buf.set(3, 2, Rgba::rgb(1, 2, 3));
        buf.row_mut(0)[1] = Rgba::rgb(9, 9, 9);
        assert_eq!(buf.get(3, 2), Rgba::rgb(1, 2, 3));
        assert_eq!(buf.get(1, 0), Rgba::rgb(9, 9, 9));
        assert_eq!(buf.byte_len(), 4 * 3 * 4);
    }

    #[test]
    fn nan_clamps_to_zero() {
        assert_eq!(clamp_channel(f32::NAN), 0);
        assert_eq!(clamp_channel(-3.0), 0);
        assert_eq!(clamp_channel(300.0), 255);
    }
}
