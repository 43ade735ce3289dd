// src/generators/mod.rs
//! Procedural texture generators.
//!
//! Every generator is a pure function of its [`TextureDescriptor`]: the same
//! descriptor always yields byte-identical output. Synthesis runs in two
//! passes (height field, then shading) and can be sliced into row chunks via
//! [`GenerationJob`] so the loader can spread it over several frames.

mod concrete;
mod metal;
mod normal;
mod rust;
mod sand;

use log::{debug, warn};

use crate::cancel::CancellationToken;
use crate::descriptor::{MapKind, MaterialFamily, TextureDescriptor, MAX_TEXTURE_SIZE};
use crate::environment::GpuEnvironment;
use crate::error::{Error, Result};
use crate::pixels::{clamp_channel, PixelBuffer, PixelFormat, Rgba};
use crate::synthesis::{Step, Synthesis};

pub use normal::height_to_normal;

/// Per-pixel inputs handed to the shading pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Texel {
    pub u: f64,
    pub v: f64,
    /// Height field value at this texel, `[0, 1]`.
    pub height: f32,
}

/// Packed occlusion / roughness / metalness, each `[0, 1]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Orm {
    pub occlusion: f32,
    pub roughness: f32,
    pub metalness: f32,
}

impl Orm {
    fn to_rgba(self) -> Rgba {
        Rgba([
            clamp_channel(self.occlusion * 255.0),
            clamp_channel(self.roughness * 255.0),
            clamp_channel(self.metalness * 255.0),
            255,
        ])
    }
}

/// One material family's look.
pub(crate) trait Recipe: Send {
    /// Height in `[0, 1]` at a point on the unit square.
    fn height(&self, u: f64, v: f64) -> f32;

    fn albedo(&self, texel: &Texel) -> Rgba;

    fn orm(&self, texel: &Texel) -> Orm;

    /// Gradient multiplier for the normal map.
    fn normal_strength(&self) -> f32;
}

fn recipe_for(desc: &TextureDescriptor) -> Box<dyn Recipe> {
    let seed = desc.pattern_hash();
    match desc.family {
        MaterialFamily::Metal => Box::new(metal::Metal::new(seed, &desc.params)),
        MaterialFamily::Concrete => Box::new(concrete::Concrete::new(seed, &desc.params)),
        MaterialFamily::Sand => Box::new(sand::Sand::new(seed, &desc.params)),
        MaterialFamily::Rust => Box::new(rust::Rust::new(seed, &desc.params)),
    }
}

/// Base colour, overridden by the descriptor's tint if present.
pub(crate) fn base_color(tint: Option<[u8; 3]>, default: [u8; 3]) -> Rgba {
    let [r, g, b] = tint.unwrap_or(default);
    Rgba::rgb(r, g, b)
}

#[inline]
pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn validate_size(size: u32) -> Result<()> {
    if size == 0 || size > MAX_TEXTURE_SIZE {
        return Err(Error::InvalidDimensions {
            width: size,
            height: size,
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Heights { row: u32 },
    Shade { row: u32 },
    Finished,
}

/// Row-chunked synthesis of one texture.
pub struct GenerationJob {
    descriptor: TextureDescriptor,
    recipe: Box<dyn Recipe>,
    heights: Vec<f32>,
    output: PixelBuffer,
    phase: Phase,
    rows_per_step: u32,
}

impl GenerationJob {
    /// `rows_per_step` bounds the work done by a single [`Synthesis::step`].
    pub fn new(descriptor: TextureDescriptor, rows_per_step: u32) -> Result<Self> {
        validate_size(descriptor.size)?;
        let size = descriptor.size;
        let format = match descriptor.map {
            MapKind::Albedo => PixelFormat::Rgba8Srgb,
            MapKind::Normal | MapKind::Roughness => PixelFormat::Rgba8Unorm,
        };
        Ok(Self {
            recipe: recipe_for(&descriptor),
            heights: vec![0.0; size as usize * size as usize],
            output: PixelBuffer::new(size, size, format),
            phase: Phase::Heights { row: 0 },
            rows_per_step: rows_per_step.max(1),
            descriptor,
        })
    }

    pub fn descriptor(&self) -> &TextureDescriptor {
        &self.descriptor
    }

    fn fill_heights(&mut self, from: u32, to: u32) {
        let size = self.descriptor.size;
        let inv = 1.0 / size as f64;
        for y in from..to {
            let v = (y as f64 + 0.5) * inv;
            let row = &mut self.heights[(y * size) as usize..((y + 1) * size) as usize];
            for (x, h) in row.iter_mut().enumerate() {
                let u = (x as f64 + 0.5) * inv;
                *h = self.recipe.height(u, v).clamp(0.0, 1.0);
            }
        }
    }

    fn shade_rows(&mut self, from: u32, to: u32) {
        let size = self.descriptor.size;
        let inv = 1.0 / size as f64;
        match self.descriptor.map {
            MapKind::Normal => {
                let strength = self.recipe.normal_strength();
                for y in from..to {
                    let row = normal::normal_row(&self.heights, size, y, strength);
                    self.output.row_mut(y).copy_from_slice(&row);
                }
            }
            MapKind::Albedo | MapKind::Roughness => {
                for y in from..to {
                    let v = (y as f64 + 0.5) * inv;
                    for x in 0..size {
                        let texel = Texel {
                            u: (x as f64 + 0.5) * inv,
                            v,
                            height: self.heights[(y * size + x) as usize],
                        };
                        let out = match self.descriptor.map {
                            MapKind::Albedo => self.recipe.albedo(&texel),
                            _ => self.recipe.orm(&texel).to_rgba(),
                        };
                        self.output.set(x, y, out);
                    }
                }
            }
        }
    }
}

impl Synthesis<PixelBuffer> for GenerationJob {
    fn step(&mut self, cancel: &CancellationToken) -> Result<Step<PixelBuffer>> {
        cancel.check(self.descriptor.family.as_str())?;
        let size = self.descriptor.size;
        match self.phase {
            Phase::Heights { row } => {
                let end = row.saturating_add(self.rows_per_step).min(size);
                self.fill_heights(row, end);
                self.phase = if end == size {
                    Phase::Shade { row: 0 }
                } else {
                    Phase::Heights { row: end }
                };
                Ok(Step::Yield)
            }
            Phase::Shade { row } => {
                let end = row.saturating_add(self.rows_per_step).min(size);
                self.shade_rows(row, end);
                if end < size {
                    self.phase = Phase::Shade { row: end };
                    return Ok(Step::Yield);
                }
                self.phase = Phase::Finished;
                let format = self.output.format();
                let output = std::mem::replace(&mut self.output, PixelBuffer::new(0, 0, format));
                self.heights = Vec::new();
                Ok(Step::Done(output))
            }
            Phase::Finished => Err(Error::msg("generation job stepped after completion")),
        }
    }

    fn progress(&self) -> f32 {
        let size = self.descriptor.size.max(1) as f32;
        match self.phase {
            Phase::Heights { row } => row as f32 / size * 0.5,
            Phase::Shade { row } => 0.5 + row as f32 / size * 0.5,
            Phase::Finished => 1.0,
        }
    }
}

/// Pure, synchronous synthesis of a full texture.
pub fn synthesize(desc: &TextureDescriptor) -> Result<PixelBuffer> {
    GenerationJob::new(*desc, u32::MAX)?.run_to_end(&CancellationToken::new())
}

/// Synthesises `desc` when running in a GPU-capable environment.
///
/// Returns `None` headless or on invalid input, so callers can fall back to
/// an untextured material.
pub fn generate(env: &GpuEnvironment, desc: &TextureDescriptor) -> Option<PixelBuffer> {
    if !env.is_gpu_capable() {
        debug!("skipping {} generation: headless", desc.family);
        return None;
    }
    match synthesize(desc) {
        Ok(pixels) => Some(pixels),
        Err(err) => {
            warn!("generation of {} failed: {err}", desc.cache_key());
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::GeneratorParams;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn desc(family: MaterialFamily, map: MapKind, size: u32) -> TextureDescriptor {
        TextureDescriptor::new(family, map, size, GeneratorParams::default())
    }

    #[test]
    fn every_family_and_map_produces_full_buffers() {
        for family in MaterialFamily::ALL {
            for map in MapKind::ALL {
                let buf = synthesize(&desc(family, map, 16)).unwrap();
                assert_eq!((buf.width(), buf.height()), (16, 16));
                assert_eq!(buf.as_bytes().len(), 16 * 16 * 4);
                assert!(buf.texels().iter().all(|t| t.0[3] == 255), "{family}/{map} alpha");
            }
        }
    }

    #[test]
    fn synthesis_is_deterministic() {
        for family in MaterialFamily::ALL {
            let d = desc(family, MapKind::Albedo, 24);
            assert_eq!(synthesize(&d).unwrap(), synthesize(&d).unwrap());
        }
    }

    #[test]
    fn chunked_matches_one_shot() {
        let d = desc(MaterialFamily::Rust, MapKind::Normal, 20);
        let whole = synthesize(&d).unwrap();

        let cancel = CancellationToken::new();
        let mut job = GenerationJob::new(d, 3).unwrap();
        let mut steps = 0;
        let chunked = loop {
            steps += 1;
            if let Step::Done(buf) = job.step(&cancel).unwrap() {
                break buf;
            }
        };
        assert_eq!(whole, chunked);
        // 20 rows / 3 per step = 7 chunks per pass.
        assert_eq!(steps, 14);
        assert_eq!(job.progress(), 1.0);
    }

    #[test]
    fn seeds_change_output() {
        let a = desc(MaterialFamily::Concrete, MapKind::Albedo, 16);
        let mut b = a;
        b.params = b.params.with_seed(77);
        assert_ne!(synthesize(&a).unwrap(), synthesize(&b).unwrap());
    }

    #[test]
    fn extreme_parameters_stay_well_formed() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..12 {
            let family = MaterialFamily::ALL[rng.gen_range(0..4)];
            let tint = [rng.gen(), rng.gen(), rng.gen()];
            let params = GeneratorParams::default()
                .with_seed(rng.gen())
                .with_scale(rng.gen_range(0.1..16.0))
                .with_wear(rng.gen_range(-2.0..3.0))
                .with_tint(tint);
            for map in MapKind::ALL {
                let buf = synthesize(&TextureDescriptor::new(family, map, 12, params)).unwrap();
                assert_eq!(buf.as_bytes().len(), 12 * 12 * 4);
                assert!(buf.texels().iter().all(|t| t.0[3] == 255));
            }
        }
    }

    #[test]
    fn white_tint_saturates_instead_of_wrapping() {
        // Highlights on a white base must pin at 255; a wrapping add would
        // turn them into near-black specks.
        let params = GeneratorParams::default().with_wear(0.0).with_tint([255, 255, 255]);
        let buf = synthesize(&TextureDescriptor::new(MaterialFamily::Sand, MapKind::Albedo, 32, params)).unwrap();
        let brightest = buf.texels().iter().map(|t| t.0[0]).max().unwrap();
        assert_eq!(brightest, 255);
        let mean = buf.texels().iter().map(|t| t.0[0] as u32).sum::<u32>() / (32 * 32);
        assert!(mean > 128, "mean {mean}");
    }

    #[test]
    fn invalid_sizes_rejected() {
        assert!(matches!(
            synthesize(&desc(MaterialFamily::Sand, MapKind::Albedo, 0)),
            Err(Error::InvalidDimensions { .. })
        ));
        assert!(GenerationJob::new(desc(MaterialFamily::Sand, MapKind::Albedo, MAX_TEXTURE_SIZE + 1), 4).is_err());
    }

    #[test]
    fn headless_environment_yields_nothing() {
        let d = desc(MaterialFamily::Metal, MapKind::Albedo, 8);
        assert!(generate(&GpuEnvironment::Headless, &d).is_none());
        assert!(generate(&GpuEnvironment::Capable, &d).is_some());
    }

    #[test]
    fn cancelled_job_stops_at_next_yield() {
        let cancel = CancellationToken::new();
        let mut job = GenerationJob::new(desc(MaterialFamily::Sand, MapKind::Albedo, 32), 4).unwrap();
        assert!(matches!(job.step(&cancel), Ok(Step::Yield)));
        cancel.cancel();
        assert!(job.step(&cancel).unwrap_err().is_cancelled());
    }
}
