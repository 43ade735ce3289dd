// src/config.rs
//! Runtime configuration, loadable from JSON.

use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde::{Deserialize, Serialize};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::loader::FrameBudget;
use crate::quality::GpuTier;

/// Environment variable pointing the viewer at a JSON config file.
pub const CONFIG_ENV: &str = "YARD_GFX_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YardConfig {
    pub loader: LoaderConfig,
    pub cache: CacheConfig,
    pub quality: QualityConfig,
}

impl YardConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: YardConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = Self::from_json_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Config named by `YARD_GFX_CONFIG`, or defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.is_empty() => Self::from_path(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.loader.validate()?;
        self.cache.validate()?;
        self.quality.validate()
    }
}

/// Cooperative scheduling knobs for the progressive loader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Rows synthesised per generator step.
    pub rows_per_step: u32,
    /// Upper bound on steps per frame.
    pub max_steps_per_frame: u32,
    /// Wall-clock budget per frame, in milliseconds.
    pub frame_budget_ms: f32,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            rows_per_step: 32,
            max_steps_per_frame: 64,
            frame_budget_ms: 4.0,
        }
    }
}

impl LoaderConfig {
    pub fn with_rows_per_step(mut self, rows: u32) -> Self {
        self.rows_per_step = rows;
        self
    }

    pub fn with_frame_budget_ms(mut self, ms: f32) -> Self {
        self.frame_budget_ms = ms;
        self
    }

    pub fn frame_budget(&self) -> FrameBudget {
        FrameBudget {
            max_steps: self.max_steps_per_frame,
            max_duration: Some(Duration::from_micros((self.frame_budget_ms.max(0.0) * 1000.0).round() as u64)),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.rows_per_step == 0 {
            return Err(Error::Config("loader.rows_per_step must be at least 1".into()));
        }
        if self.max_steps_per_frame == 0 {
            return Err(Error::Config("loader.max_steps_per_frame must be at least 1".into()));
        }
        if !self.frame_budget_ms.is_finite() || self.frame_budget_ms <= 0.0 {
            return Err(Error::Config(format!(
                "loader.frame_budget_ms must be positive, got {}",
                self.frame_budget_ms
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Byte budget. `None` derives it from the quality settings.
    pub max_bytes: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 256,
            max_bytes: None,
        }
    }
}

impl CacheConfig {
    pub fn with_max_bytes(mut self, bytes: u64) -> Self {
        self.max_bytes = Some(bytes);
        self
    }

    pub fn max_entries(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    fn validate(&self) -> Result<()> {
        if self.max_entries == 0 {
            return Err(Error::Config("cache.max_entries must be at least 1".into()));
        }
        Ok(())
    }
}

/// Overrides applied on top of the probed capabilities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub tier_override: Option<GpuTier>,
    /// Hard ceiling on generated texture size.
    pub max_texture_resolution: Option<u32>,
    pub max_pixel_ratio: Option<f32>,
}

impl QualityConfig {
    pub fn with_tier(mut self, tier: GpuTier) -> Self {
        self.tier_override = Some(tier);
        self
    }

    pub fn with_max_texture_resolution(mut self, max: u32) -> Self {
        self.max_texture_resolution = Some(max);
        self
    }

    fn validate(&self) -> Result<()> {
        if self.max_texture_resolution == Some(0) {
            return Err(Error::Config("quality.max_texture_resolution must be positive".into()));
        }
        if let Some(r) = self.max_pixel_ratio {
            if !r.is_finite() || r < 1.0 {
                return Err(Error::Config(format!("quality.max_pixel_ratio must be >= 1, got {r}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let cfg = YardConfig::from_json_str(r#"{ "cache": { "max_bytes": 1048576 } }"#).unwrap();
        assert_eq!(cfg.cache.max_bytes, Some(1 << 20));
        assert_eq!(cfg.cache.max_entries, 256);
        assert_eq!(cfg.loader, LoaderConfig::default());
    }

    #[test]
    fn tier_override_parses_snake_case() {
        let cfg = YardConfig::from_json_str(r#"{ "quality": { "tier_override": "medium" } }"#).unwrap();
        assert_eq!(cfg.quality.tier_override, Some(GpuTier::Medium));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = YardConfig::from_json_str(r#"{ "loader": { "rows_per_step": 0 } }"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(YardConfig::from_json_str("{ not json").is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let cfg = YardConfig {
            quality: QualityConfig::default().with_tier(GpuTier::High),
            ..Default::default()
        };
        let back = YardConfig::from_json_str(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(cfg, back);
    }

    #[test]
    fn frame_budget_uses_milliseconds() {
        let budget = LoaderConfig::default().with_frame_budget_ms(8.0).frame_budget();
        assert_eq!(budget.max_duration, Some(Duration::from_millis(8)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = YardConfig::from_path("/nonexistent/yard.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/yard.json"));
    }
}
