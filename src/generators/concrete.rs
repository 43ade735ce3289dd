// src/generators/concrete.rs
//! Cast concrete: mottled body, water stains, aggregate and pores.

use crate::descriptor::GeneratorParams;
use crate::fractal::{cell_noise, TileableFbm};
use crate::pixels::Rgba;

use super::{base_color, lerp, Orm, Recipe, Texel};

pub(crate) struct Concrete {
    base: Rgba,
    body: TileableFbm,
    stains: TileableFbm,
    wear: f32,
    aggregate_cells: u32,
    pore_cells: u32,
    seed: u64,
}

impl Concrete {
    pub(crate) fn new(seed: u64, params: &GeneratorParams) -> Self {
        let scale = params.effective_scale();
        Self {
            base: base_color(params.tint, [152, 150, 144]),
            body: TileableFbm::new(seed, 6, (8.0 * scale).max(1.0)).with_persistence(0.55),
            stains: TileableFbm::new(seed ^ 0x5151_a11e, 4, (3.0 * scale).max(1.0)),
            wear: params.effective_wear(),
            aggregate_cells: ((160.0 * scale).round() as u32).max(1),
            pore_cells: ((96.0 * scale).round() as u32).max(1),
            seed,
        }
    }

    fn stain(&self, u: f64, v: f64) -> f32 {
        // Stains drip downwards: stretch the noise along v.
        let s = self.stains.sample01(u, v * 0.5 + u * 0.1);
        ((s - 0.55) * 2.5 * (0.4 + self.wear)).clamp(0.0, 1.0)
    }

    fn pore(&self, u: f64, v: f64) -> bool {
        cell_noise(self.seed ^ 0x90e5, u, v, self.pore_cells) > 0.985
    }
}

impl Recipe for Concrete {
    fn height(&self, u: f64, v: f64) -> f32 {
        let mut h = 0.5 + self.body.sample(u, v) as f32 * 0.25;
        h += (cell_noise(self.seed, u, v, self.aggregate_cells) - 0.5) * 0.08;
        if self.pore(u, v) {
            h -= 0.25;
        }
        h
    }

    fn albedo(&self, t: &Texel) -> Rgba {
        let mut c = self.base;
        c.add_luma((self.body.sample(t.u, t.v) as f32) * 22.0);

        let speck = cell_noise(self.seed ^ 0xa66, t.u, t.v, self.aggregate_cells);
        if speck > 0.92 {
            c.add_luma(26.0);
        } else if speck < 0.06 {
            c.add([-24.0, -22.0, -18.0]);
        }
        c.mix([92, 86, 74], self.stain(t.u, t.v) * 0.5);
        if self.pore(t.u, t.v) {
            c.scale(0.6);
        }
        c
    }

    fn orm(&self, t: &Texel) -> Orm {
        Orm {
            occlusion: if self.pore(t.u, t.v) { 0.5 } else { lerp(0.75, 1.0, t.height) },
            roughness: lerp(0.82, 0.97, self.stain(t.u, t.v)),
            metalness: 0.0,
        }
    }

    fn normal_strength(&self) -> f32 {
        1.6
    }
}
