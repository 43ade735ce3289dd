// src/fractal.rs
//! Layered coherent noise used by every generator.
//!
//! Samples are taken on a 4D torus so the resulting textures tile seamlessly
//! in both directions. Each octave halves its amplitude and doubles its
//! frequency.

use std::f64::consts::TAU;

use ::noise::{NoiseFn, Perlin};
use xxhash_rust::xxh3::xxh3_64;

/// Fractal sum of Perlin octaves over the unit square, wrapping at the edges.
pub struct TileableFbm {
    octaves: Vec<Perlin>,
    frequency: f64,
    persistence: f64,
    lacunarity: f64,
    norm: f64,
}

impl TileableFbm {
    /// `frequency` is the number of base features across the unit square.
    pub fn new(seed: u64, octaves: usize, frequency: f64) -> Self {
        let octaves = octaves.max(1);
        let layers = (0..octaves)
            .map(|i| Perlin::new(derive_seed(seed, i as u64)))
            .collect();
        let mut fbm = Self {
            octaves: layers,
            frequency: frequency.max(1e-3),
            persistence: 0.5,
            lacunarity: 2.0,
            norm: 1.0,
        };
        fbm.norm = fbm.amplitude_sum();
        fbm
    }

    pub fn with_persistence(mut self, persistence: f64) -> Self {
        self.persistence = persistence;
        self.norm = self.amplitude_sum();
        self
    }

    fn amplitude_sum(&self) -> f64 {
        let mut amp = 1.0;
        let mut sum = 0.0;
        for _ in 0..self.octaves.len() {
            sum += amp;
            amp *= self.persistence;
        }
        sum.max(1e-9)
    }

    /// Roughly `[-1, 1]`; not strictly bounded.
    pub fn sample(&self, u: f64, v: f64) -> f64 {
        let mut amp = 1.0;
        let mut freq = self.frequency;
        let mut total = 0.0;
        for perlin in &self.octaves {
            total += perlin.get(torus(u, v, freq)) * amp;
            amp *= self.persistence;
            freq *= self.lacunarity;
        }
        total / self.norm
    }

    /// `sample` remapped to `[0, 1]` and clamped.
    #[inline]
    pub fn sample01(&self, u: f64, v: f64) -> f32 {
        ((self.sample(u, v) * 0.5 + 0.5) as f32).clamp(0.0, 1.0)
    }
}

/// Maps `(u, v)` on the unit square onto a 4D torus.
///
/// Feature frequency must be an integer for the wrap to be seamless, so the
/// radius is rounded to whole features.
#[inline]
fn torus(u: f64, v: f64, frequency: f64) -> [f64; 4] {
    let r = frequency.round().max(1.0) / TAU;
    let (su, cu) = (u * TAU).sin_cos();
    let (sv, cv) = (v * TAU).sin_cos();
    [cu * r, su * r, cv * r, sv * r]
}

/// Derives an independent 32-bit seed for a sub-layer.
#[inline]
pub fn derive_seed(seed: u64, layer: u64) -> u32 {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..].copy_from_slice(&layer.to_le_bytes());
    xxh3_64(&bytes) as u32
}

/// Deterministic hash of an integer lattice point to `[0, 1)`.
#[inline]
pub fn hash01(seed: u64, x: i64, y: i64) -> f32 {
    let mut bytes = [0u8; 24];
    bytes[..8].copy_from_slice(&seed.to_le_bytes());
    bytes[8..16].copy_from_slice(&x.to_le_bytes());
    bytes[16..].copy_from_slice(&y.to_le_bytes());
    (xxh3_64(&bytes) >> 40) as f32 / (1u64 << 24) as f32
}

/// White noise over a `cells × cells` grid on the unit square, wrapping.
#[inline]
pub fn cell_noise(seed: u64, u: f64, v: f64, cells: u32) -> f32 {
    let n = cells.max(1) as i64;
    let cx = ((u * n as f64).floor() as i64).rem_euclid(n);
    let cy = ((v * n as f64).floor() as i64).rem_euclid(n);
    hash01(seed, cx, cy)
}

/// Shortest distance between two points on the unit torus.
#[inline]
pub fn wrapped_distance(a: (f64, f64), b: (f64, f64)) -> f64 {
    let dx = (a.0 - b.0).abs();
    let dy = (a.1 - b.1).abs();
    let dx = dx.min(1.0 - dx);
    let dy = dy.min(1.0 - dy);
    (dx * dx + dy * dy).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_seed() {
        let a = TileableFbm::new(42, 5, 4.0);
        let b = TileableFbm::new(42, 5, 4.0);
        for i in 0..16 {
            let u = i as f64 / 16.0;
            assert_eq!(a.sample(u, 1.0 - u), b.sample(u, 1.0 - u));
        }
    }

    #[test]
    fn wraps_at_unit_square_edges() {
        let fbm = TileableFbm::new(7, 4, 3.0);
        for i in 0..8 {
            let v = i as f64 / 8.0;
            let left = fbm.sample(0.0, v);
            let right = fbm.sample(1.0, v);
            assert!((left - right).abs() < 1e-9, "seam at v={v}: {left} vs {right}");
        }
    }

    #[test]
    fn sample01_is_bounded() {
        let fbm = TileableFbm::new(3, 6, 8.0).with_persistence(0.9);
        for i in 0..64 {
            let s = fbm.sample01(i as f64 / 64.0, (i * 7 % 64) as f64 / 64.0);
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn hash01_in_unit_interval_and_varies() {
        let a = hash01(1, 0, 0);
        let b = hash01(1, 1, 0);
        assert!((0.0..1.0).contains(&a));
        assert_ne!(a, b);
        assert_eq!(cell_noise(1, 0.99, 0.0, 4), cell_noise(1, -0.01, 0.0, 4));
    }

    #[test]
    fn wrapped_distance_crosses_edges() {
        let d = wrapped_distance((0.95, 0.5), (0.05, 0.5));
        assert!((d - 0.1).abs() < 1e-9);
    }
}
