// src/descriptor.rs
//! Texture descriptors and the cache keys derived from them.
//!
//! A [`CacheKey`] must be identical for any two descriptors that would produce
//! pixel-identical output, so parameters are canonicalised (floats quantised,
//! fields hashed in a fixed order) before hashing with xxh3.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

/// Largest edge length any generator will synthesise.
pub const MAX_TEXTURE_SIZE: u32 = 8192;

/// Named category of procedural surface appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterialFamily {
    /// Worn galvanised steel panels with seams and rivets.
    Metal,
    /// Cast concrete with aggregate speckle.
    Concrete,
    /// Compacted sand / gravel ground.
    Sand,
    /// Steel with rust blooms.
    Rust,
}

impl MaterialFamily {
    pub const ALL: [MaterialFamily; 4] = [
        MaterialFamily::Metal,
        MaterialFamily::Concrete,
        MaterialFamily::Sand,
        MaterialFamily::Rust,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MaterialFamily::Metal => "metal",
            MaterialFamily::Concrete => "concrete",
            MaterialFamily::Sand => "sand",
            MaterialFamily::Rust => "rust",
        }
    }

    /// Per-family salt mixed into the noise seed so families never share patterns.
    pub(crate) fn salt(self) -> u64 {
        match self {
            MaterialFamily::Metal => 0x6d65_7461_6c00_0001,
            MaterialFamily::Concrete => 0x636f_6e63_7265_7465,
            MaterialFamily::Sand => 0x7361_6e64_0000_0003,
            MaterialFamily::Rust => 0x7275_7374_0000_0004,
        }
    }
}

impl fmt::Display for MaterialFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which map of a material a buffer represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapKind {
    /// Base colour, sRGB encoded.
    Albedo,
    /// Tangent-space normal map, linear.
    Normal,
    /// Packed ORM: R occlusion, G roughness, B metalness. Linear.
    Roughness,
}

impl MapKind {
    pub const ALL: [MapKind; 3] = [MapKind::Albedo, MapKind::Normal, MapKind::Roughness];

    pub fn as_str(self) -> &'static str {
        match self {
            MapKind::Albedo => "albedo",
            MapKind::Normal => "normal",
            MapKind::Roughness => "roughness",
        }
    }
}

impl fmt::Display for MapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables shared by all generators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorParams {
    pub seed: u32,
    /// Spatial frequency multiplier; larger values give finer features.
    pub scale: f32,
    /// Weathering amount in `[0, 1]`.
    pub wear: f32,
    /// Optional base colour override.
    pub tint: Option<[u8; 3]>,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            seed: 1,
            scale: 1.0,
            wear: 0.5,
            tint: None,
        }
    }
}

impl GeneratorParams {
    pub fn with_seed(mut self, seed: u32) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_wear(mut self, wear: f32) -> Self {
        self.wear = wear;
        self
    }

    pub fn with_tint(mut self, tint: [u8; 3]) -> Self {
        self.tint = Some(tint);
        self
    }

    /// Scale as actually used by the generators.
    pub(crate) fn effective_scale(&self) -> f64 {
        let s = quantize(self.scale) as f64 / QUANTUM;
        if s <= 0.0 {
            1.0
        } else {
            s
        }
    }

    /// Wear as actually used by the generators.
    pub(crate) fn effective_wear(&self) -> f32 {
        ((quantize(self.wear) as f64 / QUANTUM) as f32).clamp(0.0, 1.0)
    }

    /// Canonical byte encoding: equal bytes ⇔ equal generator output.
    fn canonical_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.seed.to_le_bytes());
        out.extend_from_slice(&quantize(self.scale).to_le_bytes());
        out.extend_from_slice(&quantize(self.wear).to_le_bytes());
        match self.tint {
            Some([r, g, b]) => out.extend_from_slice(&[1, r, g, b]),
            None => out.extend_from_slice(&[0, 0, 0, 0]),
        }
    }
}

const QUANTUM: f64 = 1000.0;

/// Floats are compared at 1/1000 resolution; NaN and -0.0 collapse to 0.
fn quantize(v: f32) -> i64 {
    if !v.is_finite() {
        return 0;
    }
    let q = (v as f64 * QUANTUM).round() as i64;
    if q == 0 {
        0
    } else {
        q
    }
}

/// Everything needed to synthesise one square texture.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextureDescriptor {
    pub family: MaterialFamily,
    pub map: MapKind,
    /// Edge length in pixels.
    pub size: u32,
    #[serde(default)]
    pub params: GeneratorParams,
}

impl TextureDescriptor {
    pub fn new(family: MaterialFamily, map: MapKind, size: u32, params: GeneratorParams) -> Self {
        Self {
            family,
            map,
            size,
            params,
        }
    }

    /// Same descriptor at another resolution.
    pub fn at_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Hash of family, map and parameters, excluding size.
    ///
    /// Noise seeds derive from this, so a low-resolution placeholder and its
    /// high-resolution replacement show the same pattern.
    pub fn pattern_hash(&self) -> u64 {
        let mut bytes = Vec::with_capacity(24);
        bytes.extend_from_slice(&self.family.salt().to_le_bytes());
        self.params.canonical_bytes(&mut bytes);
        xxh3_64(&bytes)
    }

    /// Stable cache key for these generation inputs.
    pub fn cache_key(&self) -> CacheKey {
        let mut bytes = Vec::with_capacity(32);
        bytes.push(self.family as u8);
        bytes.push(self.map as u8);
        bytes.extend_from_slice(&self.size.to_le_bytes());
        self.params.canonical_bytes(&mut bytes);
        let digest = xxh3_64(&bytes);
        CacheKey::new(format!(
            "{}/{}@{}#{:016x}",
            self.family, self.map, self.size, digest
        ))
    }
}

/// Key into the texture cache. Cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(Arc<str>);

impl CacheKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(Arc::from(key.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        CacheKey::new(s)
    }
}

impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        CacheKey::new(s)
    }
}

impl From<&TextureDescriptor> for CacheKey {
    fn from(desc: &TextureDescriptor) -> Self {
        desc.cache_key()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(params: GeneratorParams) -> TextureDescriptor {
        TextureDescriptor::new(MaterialFamily::Concrete, MapKind::Albedo, 256, params)
    }

    #[test]
    fn identical_inputs_share_a_key() {
        let a = desc(GeneratorParams::default().with_seed(9).with_scale(2.0));
        let b = desc(GeneratorParams::default().with_seed(9).with_scale(2.0));
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn float_noise_below_quantum_collapses() {
        let a = desc(GeneratorParams::default().with_wear(0.25));
        let b = desc(GeneratorParams::default().with_wear(0.250_000_1));
        assert_eq!(a.cache_key(), b.cache_key());

        let neg = desc(GeneratorParams::default().with_wear(-0.0));
        let pos = desc(GeneratorParams::default().with_wear(0.0));
        assert_eq!(neg.cache_key(), pos.cache_key());
    }

    #[test]
    fn size_map_and_family_split_keys() {
        let base = desc(GeneratorParams::default());
        assert_ne!(base.cache_key(), base.at_size(512).cache_key());

        let mut normal = base;
        normal.map = MapKind::Normal;
        assert_ne!(base.cache_key(), normal.cache_key());

        let mut sand = base;
        sand.family = MaterialFamily::Sand;
        assert_ne!(base.cache_key(), sand.cache_key());
    }

    #[test]
    fn pattern_hash_ignores_size_and_map() {
        let base = desc(GeneratorParams::default().with_seed(3));
        let mut roughness = base.at_size(64);
        roughness.map = MapKind::Roughness;
        assert_eq!(base.pattern_hash(), roughness.pattern_hash());
    }

    #[test]
    fn key_is_human_readable() {
        let key = desc(GeneratorParams::default()).cache_key();
        assert!(key.as_str().starts_with("concrete/albedo@256#"));
    }
}
