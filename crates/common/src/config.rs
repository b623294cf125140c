//! Configuration structs for the cache, prefetcher, source manager and texture pool.
//!
//! Every struct has documented defaults and can be overridden per
//! instantiation. [`PipelineConfig::from_json`] accepts partial documents;
//! missing fields keep their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Top-level pipeline configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub prefetch: PrefetchConfig,
    pub cache: CacheConfig,
    pub sources: SourceConfig,
    pub textures: TexturePoolConfig,
}

impl PipelineConfig {
    /// Parse a JSON override document.
    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a component unusable.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.prefetch.max_concurrent == 0 {
            return Err(PipelineError::InvalidConfig(
                "prefetch.max_concurrent must be > 0".into(),
            ));
        }
        if self.sources.max_concurrent_sources == 0 {
            return Err(PipelineError::InvalidConfig(
                "sources.max_concurrent_sources must be > 0".into(),
            ));
        }
        if self.textures.max_per_bucket == 0 {
            return Err(PipelineError::InvalidConfig(
                "textures.max_per_bucket must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Prefetch scheduler settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Maximum decode requests in flight at once.
    pub max_concurrent: usize,
    /// Frames to prefetch in the direction of travel.
    pub ahead_frames: u64,
    /// Frames to keep warm opposite to the direction of travel.
    pub behind_frames: u64,
    /// Per-request budget before a prefetch counts as timed out.
    pub request_timeout_ms: u64,
}

impl PrefetchConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            ahead_frames: 30,
            behind_frames: 5,
            request_timeout_ms: 5_000,
        }
    }
}

/// Frame cache settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Upper bound on resident frame bytes, in MiB.
    pub max_size_mb: u64,
}

impl CacheConfig {
    pub fn max_bytes(&self) -> u64 {
        self.max_size_mb * 1024 * 1024
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size_mb: 512 }
    }
}

/// Media source manager settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Opening past this limit closes the oldest-opened source.
    pub max_concurrent_sources: usize,
    /// Extra wait after a playback surface reports a completed seek.
    pub seek_settle_ms: u64,
    /// When false, codecs without a fast path resolve to `Unsupported`.
    pub allow_software_fallback: bool,
}

impl SourceConfig {
    pub fn seek_settle(&self) -> Duration {
        Duration::from_millis(self.seek_settle_ms)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sources: 8,
            seek_settle_ms: 0,
            allow_software_fallback: true,
        }
    }
}

/// GPU texture pool settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TexturePoolConfig {
    /// Pooled textures unused for longer than this are destroyed by the sweep.
    pub idle_timeout_ms: u64,
    /// Maximum pooled textures per (width, height, format) bucket.
    pub max_per_bucket: usize,
}

impl TexturePoolConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

impl Default for TexturePoolConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: 30_000,
            max_per_bucket: 4,
        }
    }
}
