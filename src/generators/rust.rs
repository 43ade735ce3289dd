// src/generators/rust.rs
//! Steel plate with rust blooms.
//!
//! Blooms are placed one per grid cell (subject to a wear-driven chance) and
//! shaded with a radial gradient from a deep brown core through orange to a
//! faded fringe. Edge noise distorts the radius so blooms are not circles.

use crate::descriptor::GeneratorParams;
use crate::fractal::{hash01, wrapped_distance, TileableFbm};
use crate::pixels::Rgba;

use super::{base_color, lerp, Orm, Recipe, Texel};

const CORE: [u8; 3] = [74, 34, 16];
const ORANGE: [u8; 3] = [168, 82, 32];
const FRINGE: [u8; 3] = [140, 108, 84];

pub(crate) struct Rust {
    steel: Rgba,
    edge: TileableFbm,
    flakes: TileableFbm,
    cells: u32,
    wear: f32,
    seed: u64,
}

impl Rust {
    pub(crate) fn new(seed: u64, params: &GeneratorParams) -> Self {
        let scale = params.effective_scale();
        Self {
            steel: base_color(params.tint, [122, 118, 112]),
            edge: TileableFbm::new(seed, 4, (10.0 * scale).max(1.0)),
            flakes: TileableFbm::new(seed ^ 0xf1a4e, 3, (48.0 * scale).max(1.0)),
            cells: ((5.0 * scale).round() as u32).max(1),
            wear: params.effective_wear(),
            seed,
        }
    }

    /// Corrosion in `[0, 1]`: 1 at a bloom core, 0 on clean steel.
    fn corrosion(&self, u: f64, v: f64) -> f32 {
        let n = self.cells as i64;
        let (cx, cy) = ((u * n as f64).floor() as i64, (v * n as f64).floor() as i64);
        let distortion = self.edge.sample(u, v) * 0.35;
        let mut best = 0.0f32;
        // Blooms can overhang into neighbouring cells.
        for oy in -1..=1 {
            for ox in -1..=1 {
                let (gx, gy) = ((cx + ox).rem_euclid(n), (cy + oy).rem_euclid(n));
                if hash01(self.seed, gx, gy) > 0.3 + self.wear * 0.6 {
                    continue;
                }
                let centre = (
                    (gx as f64 + hash01(self.seed ^ 1, gx, gy) as f64) / n as f64,
                    (gy as f64 + hash01(self.seed ^ 2, gx, gy) as f64) / n as f64,
                );
                let radius = (0.35 + 0.5 * hash01(self.seed ^ 3, gx, gy) as f64) / n as f64;
                let d = wrapped_distance((u, v), centre) / radius + distortion;
                if d < 1.0 {
                    best = best.max((1.0 - d) as f32);
                }
            }
        }
        best
    }
}

fn gradient(c: f32) -> [u8; 3] {
    let blend = |a: [u8; 3], b: [u8; 3], t: f32| {
        let mut out = Rgba::rgb(a[0], a[1], a[2]);
        out.mix(b, t);
        [out.0[0], out.0[1], out.0[2]]
    };
    if c > 0.5 {
        blend(ORANGE, CORE, (c - 0.5) * 2.0)
    } else {
        blend(FRINGE, ORANGE, c * 2.0)
    }
}

impl Recipe for Rust {
    fn height(&self, u: f64, v: f64) -> f32 {
        let c = self.corrosion(u, v);
        0.55 + c * 0.15 + self.flakes.sample(u, v) as f32 * 0.08 * c
    }

    fn albedo(&self, t: &Texel) -> Rgba {
        let mut c = self.steel;
        c.add_luma(self.flakes.sample(t.u, t.v) as f32 * 8.0);
        let corrosion = self.corrosion(t.u, t.v);
        if corrosion > 0.0 {
            // Soft onset so the fringe fades into the steel.
            c.mix(gradient(corrosion), (corrosion * 4.0).min(1.0));
            c.add_luma(self.flakes.sample(t.v, t.u) as f32 * 14.0 * corrosion);
        }
        c
    }

    fn orm(&self, t: &Texel) -> Orm {
        let corrosion = self.corrosion(t.u, t.v);
        Orm {
            occlusion: lerp(0.8, 1.0, t.height),
            roughness: lerp(0.45, 0.95, corrosion * 2.0),
            metalness: lerp(0.9, 0.1, corrosion * 2.0),
        }
    }

    fn normal_strength(&self) -> f32 {
        2.6
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_runs_core_to_fringe() {
        assert_eq!(gradient(1.0), CORE);
        assert_eq!(gradient(0.5), ORANGE);
        assert_eq!(gradient(0.0), FRINGE);
    }

    #[test]
    fn full_wear_corrodes_somewhere() {
        let rust = Rust::new(11, &GeneratorParams::default().with_wear(1.0));
        let corroded = (0..32)
            .flat_map(|y| (0..32).map(move |x| (x as f64 / 32.0, y as f64 / 32.0)))
            .filter(|&(u, v)| rust.corrosion(u, v) > 0.0)
            .count();
        assert!(corroded > 0);
    }
}
