//! Central error types for the pipeline (thiserror-based).

use std::time::Duration;

use thiserror::Error;

use crate::codec::{AudioCodec, VideoCodec};
use crate::types::{FrameNumber, SourceId};

/// Top-level pipeline error.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Texture error: {0}")]
    Texture(#[from] TextureError),

    #[error("Unknown source: {0}")]
    SourceNotFound(SourceId),

    #[error("Source {0} is closed")]
    SourceClosed(SourceId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// The runtime cannot decode the requested stream with this backend.
///
/// Always recoverable by falling back to the other decode backend.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Unsupported video configuration: {codec:?} {width}x{height}")]
    UnsupportedVideo {
        codec: VideoCodec,
        width: u32,
        height: u32,
    },

    #[error("Unsupported audio configuration: {codec:?} {sample_rate}Hz x{channels}")]
    UnsupportedAudio {
        codec: AudioCodec,
        sample_rate: u32,
        channels: u16,
    },

    #[error("Native decode engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Engine rejected configuration: {0}")]
    Rejected(String),

    #[error("Decoder is closed")]
    Closed,
}

/// A single chunk or seek failed. Never fatal to the source.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Decode failed at {timestamp_us}us: {reason}")]
    Failed { timestamp_us: i64, reason: String },

    #[error("Decoder is not configured")]
    NotConfigured,

    #[error("Decoder is closed")]
    Closed,

    #[error("Request discarded by flush")]
    Flushed,

    #[error("Flush failed: {0}")]
    Flush(String),

    #[error("Engine produced no output for {timestamp_us}us")]
    Dropped { timestamp_us: i64 },

    #[error("A keyframe is required after seek (got delta chunk at {timestamp_us}us)")]
    KeyframeRequired { timestamp_us: i64 },

    #[error("Seek to {target_ms}ms failed: {reason}")]
    Seek { target_ms: f64, reason: String },

    #[error("Frame capture failed: {0}")]
    Capture(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Source could not be opened at all.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Unsupported container format")]
    UnsupportedContainer,

    #[error("No video track found")]
    NoVideoTrack,

    #[error("Invalid probe output: {0}")]
    InvalidOutput(String),

    #[error("Prober failed: {0}")]
    Failed(String),

    #[error("Probe timed out after {0:?}")]
    TimedOut(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A prefetch request exceeded its budget.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{source_id} {frame} not decoded within {budget:?}")]
pub struct TimeoutError {
    pub source_id: SourceId,
    pub frame: FrameNumber,
    pub budget: Duration,
}

/// GPU backend errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GpuError {
    #[error("Texture allocation failed: {width}x{height}: {reason}")]
    AllocFailed {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Pixel upload failed: {0}")]
    UploadFailed(String),

    #[error("External frame import failed: {0}")]
    ImportFailed(String),
}

/// Texture import errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TextureError {
    /// The frame payload cannot be turned into a texture. Integration error.
    #[error("Unsupported frame payload: {0}")]
    UnsupportedPayload(String),

    #[error("Pixel extraction failed: {0}")]
    Extraction(String),

    #[error("GPU error: {0}")]
    Gpu(#[from] GpuError),
}

/// Convenience Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
