// src/generators/sand.rs
//! Compacted sand and gravel ground.

use crate::descriptor::GeneratorParams;
use crate::fractal::{cell_noise, hash01, wrapped_distance, TileableFbm};
use crate::pixels::Rgba;

use super::{base_color, lerp, Orm, Recipe, Texel};

const PEBBLE_CELLS: u32 = 12;

pub(crate) struct Sand {
    base: Rgba,
    dunes: TileableFbm,
    fine_cells: u32,
    coarse_cells: u32,
    pebble_cells: u32,
    wear: f32,
    seed: u64,
}

impl Sand {
    pub(crate) fn new(seed: u64, params: &GeneratorParams) -> Self {
        let scale = params.effective_scale();
        Self {
            base: base_color(params.tint, [194, 172, 132]),
            dunes: TileableFbm::new(seed, 4, (2.0 * scale).max(1.0)).with_persistence(0.45),
            fine_cells: ((256.0 * scale).round() as u32).max(1),
            coarse_cells: ((64.0 * scale).round() as u32).max(1),
            pebble_cells: ((PEBBLE_CELLS as f64 * scale).round() as u32).max(1),
            wear: params.effective_wear(),
            seed,
        }
    }

    /// Pebble coverage in `[0, 1]`: one candidate pebble per cell, placed and
    /// sized by hash.
    fn pebble(&self, u: f64, v: f64) -> f32 {
        let n = self.pebble_cells as f64;
        let (cx, cy) = ((u * n).floor() as i64, (v * n).floor() as i64);
        let s = self.seed ^ 0x9eb1e;
        if hash01(s, cx, cy) > 0.35 + self.wear * 0.25 {
            return 0.0;
        }
        let centre = (
            (cx as f64 + 0.2 + 0.6 * hash01(s ^ 1, cx, cy) as f64) / n,
            (cy as f64 + 0.2 + 0.6 * hash01(s ^ 2, cx, cy) as f64) / n,
        );
        let radius = (0.08 + 0.14 * hash01(s ^ 3, cx, cy) as f64) / n;
        let d = wrapped_distance((u, v), centre);
        if d >= radius {
            0.0
        } else {
            (1.0 - d / radius).sqrt() as f32
        }
    }

    fn dune(&self, u: f64, v: f64) -> f32 {
        self.dunes.sample01(u, v)
    }
}

impl Recipe for Sand {
    fn height(&self, u: f64, v: f64) -> f32 {
        let grain = cell_noise(self.seed, u, v, self.fine_cells) - 0.5;
        0.4 + self.dune(u, v) * 0.3 + grain * 0.06 + self.pebble(u, v) * 0.25
    }

    fn albedo(&self, t: &Texel) -> Rgba {
        let mut c = self.base;
        c.scale(0.9 + 0.25 * self.dune(t.u, t.v));
        let fine = cell_noise(self.seed ^ 0xf1, t.u, t.v, self.fine_cells);
        let coarse = cell_noise(self.seed ^ 0xc0, t.u, t.v, self.coarse_cells);
        c.add_luma((fine - 0.5) * 40.0);
        c.add_luma((coarse - 0.5) * 18.0);

        let pebble = self.pebble(t.u, t.v);
        if pebble > 0.0 {
            let shade = 90.0 + 60.0 * hash01(self.seed, (t.u * 64.0) as i64, (t.v * 64.0) as i64);
            c.mix([shade as u8, (shade * 0.95) as u8, (shade * 0.88) as u8], pebble);
        }
        c
    }

    fn orm(&self, t: &Texel) -> Orm {
        let pebble = self.pebble(t.u, t.v);
        Orm {
            occlusion: lerp(0.7, 1.0, t.height),
            roughness: lerp(0.95, 0.7, pebble),
            metalness: 0.0,
        }
    }

    fn normal_strength(&self) -> f32 {
        2.2
    }
}
