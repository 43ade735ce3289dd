// src/generators/metal.rs
//! Brushed steel panels with seams, rivets and grime.

use crate::descriptor::GeneratorParams;
use crate::fractal::{hash01, TileableFbm};
use crate::pixels::Rgba;

use super::{base_color, lerp, Orm, Recipe, Texel};

const PANELS: f64 = 2.0;
const SEAM_WIDTH: f64 = 0.008;
const RIVETS_PER_EDGE: f64 = 8.0;
const RIVET_RADIUS: f64 = 0.012;

pub(crate) struct Metal {
    base: Rgba,
    brushed: TileableFbm,
    grime: TileableFbm,
    dents: TileableFbm,
    wear: f32,
    scale: f64,
    seed: u64,
}

impl Metal {
    pub(crate) fn new(seed: u64, params: &GeneratorParams) -> Self {
        let scale = params.effective_scale();
        Self {
            base: base_color(params.tint, [148, 152, 156]),
            brushed: TileableFbm::new(seed, 3, (64.0 * scale).max(1.0)),
            grime: TileableFbm::new(seed ^ 0x9e37_79b9, 5, (4.0 * scale).max(1.0)),
            dents: TileableFbm::new(seed ^ 0x7f4a_7c15, 4, (6.0 * scale).max(1.0)),
            wear: params.effective_wear(),
            scale,
            seed,
        }
    }

    /// Distance to the nearest panel seam, in unit-square coordinates.
    fn seam_distance(&self, u: f64, v: f64) -> f64 {
        let n = (PANELS * self.scale).round().max(1.0);
        let du = (u * n).fract();
        let dv = (v * n).fract();
        let edge = |f: f64| f.min(1.0 - f) / n;
        edge(du).min(edge(dv))
    }

    /// Rivet head profile and the texel's offset from the rivet centre.
    fn rivet(&self, u: f64, v: f64) -> (f32, f64) {
        let n = (PANELS * self.scale).round().max(1.0) * RIVETS_PER_EDGE;
        let cell = 1.0 / n;
        let (cu, cv) = ((u * n).floor(), (v * n).floor());
        // Rivets only sit on the band just inside each panel edge.
        let panel_cells = RIVETS_PER_EDGE;
        let on_edge = |c: f64| {
            let r = c.rem_euclid(panel_cells);
            r == 0.0 || r == panel_cells - 1.0
        };
        if !(on_edge(cu) || on_edge(cv)) {
            return (0.0, 0.0);
        }
        let centre = ((cu + 0.5) * cell, (cv + 0.5) * cell);
        let d = ((u - centre.0).powi(2) + (v - centre.1).powi(2)).sqrt();
        let r = RIVET_RADIUS / self.scale.max(0.25);
        if d >= r {
            (0.0, 0.0)
        } else {
            ((1.0 - d / r) as f32, (u - centre.0) + (v - centre.1))
        }
    }

    fn grime_amount(&self, u: f64, v: f64) -> f32 {
        let g = self.grime.sample01(u, v);
        ((g - (1.0 - self.wear * 0.7)) * 3.0).clamp(0.0, 1.0)
    }
}

impl Recipe for Metal {
    fn height(&self, u: f64, v: f64) -> f32 {
        let seam = self.seam_distance(u, v);
        let mut h = 0.6 + (self.dents.sample(u, v) as f32) * 0.05;
        if seam < SEAM_WIDTH {
            h -= 0.35 * (1.0 - (seam / SEAM_WIDTH) as f32);
        }
        h + self.rivet(u, v).0 * 0.3
    }

    fn albedo(&self, t: &Texel) -> Rgba {
        let mut c = self.base;
        // Streaks run along u: sample the brush noise at a fixed u.
        let streak = self.brushed.sample(0.0, t.v) as f32;
        c.add_luma(streak * 18.0);
        c.add_luma((hash01(self.seed, (t.u * 4096.0) as i64, (t.v * 512.0) as i64) - 0.5) * 6.0);

        let (rivet, offset) = self.rivet(t.u, t.v);
        if rivet > 0.0 {
            // Lit upper-left, shadowed lower-right.
            let lit = if offset < 0.0 { 1.0 } else { -1.0 };
            c.add_luma(rivet * 30.0 * lit);
        }
        if self.seam_distance(t.u, t.v) < SEAM_WIDTH {
            c.scale(0.55);
        }
        c.mix([58, 52, 44], self.grime_amount(t.u, t.v) * 0.6);
        c
    }

    fn orm(&self, t: &Texel) -> Orm {
        let grime = self.grime_amount(t.u, t.v);
        let seam = self.seam_distance(t.u, t.v) < SEAM_WIDTH;
        Orm {
            occlusion: if seam { 0.45 } else { lerp(0.85, 1.0, t.height) },
            roughness: lerp(0.32, 0.85, grime.max(self.wear * 0.3)),
            metalness: lerp(1.0, 0.2, grime),
        }
    }

    fn normal_strength(&self) -> f32 {
        3.0
    }
}
