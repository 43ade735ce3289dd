// src/generators/normal.rs
//! Tangent-space normals from a height field.

use glam::Vec3;

use crate::pixels::{clamp_channel, PixelBuffer, PixelFormat, Rgba};

/// Encodes one row of normals using wrapped central differences.
pub(crate) fn normal_row(heights: &[f32], size: u32, y: u32, strength: f32) -> Vec<Rgba> {
    let n = size as usize;
    let at = |x: usize, y: usize| heights[(y % n) * n + (x % n)];
    let y = y as usize;
    let up = (y + n - 1) % n;
    let down = (y + 1) % n;
    // Gradients are per texel; scale by size so strength is resolution independent.
    let k = strength * size as f32 / 64.0;

    (0..n)
        .map(|x| {
            let left = (x + n - 1) % n;
            let right = (x + 1) % n;
            let dx = (at(right, y) - at(left, y)) * 0.5 * k;
            let dy = (at(x, down) - at(x, up)) * 0.5 * k;
            encode(Vec3::new(-dx, -dy, 1.0))
        })
        .collect()
}

fn encode(normal: Vec3) -> Rgba {
    let n = normal.normalize_or_zero();
    let n = if n == Vec3::ZERO { Vec3::Z } else { n };
    let c = (n * 0.5 + Vec3::splat(0.5)) * 255.0;
    Rgba([clamp_channel(c.x), clamp_channel(c.y), clamp_channel(c.z), 255])
}

/// Full normal map for a square height field. Returns `None` if the slice
/// length does not match `size²`.
pub fn height_to_normal(heights: &[f32], size: u32, strength: f32) -> Option<PixelBuffer> {
    if size == 0 || heights.len() != size as usize * size as usize {
        return None;
    }
    let mut out = PixelBuffer::new(size, size, PixelFormat::Rgba8Unorm);
    for y in 0..size {
        let row = normal_row(heights, size, y, strength);
        out.row_mut(y).copy_from_slice(&row);
    }
    Some(out)
}
