//! `fp-common` — Shared types, traits, and errors for the frame pipeline.
//!
//! This crate is the foundation the probing and decoding crates depend on.
//! It defines:
//!
//! - **Types**: `FrameNumber`, `Rational`, `Resolution`, `SourceId` (newtypes for safety)
//! - **Codecs**: `VideoCodec`, `AudioCodec`, `ContainerFormat`, `PixelFormat`
//! - **Packets**: `EncodedChunk`, `DecodedFrame`, `FramePayload`, `ProbeResult`
//! - **GPU Traits**: `GpuBackend` (texture creation / upload / import)
//! - **Errors**: `PipelineError`, `DecodeError`, `ConfigurationError`, etc. (thiserror-based)
//! - **Config**: `PipelineConfig` and the per-component configs

pub mod codec;
pub mod color;
pub mod config;
pub mod error;
pub mod gpu_traits;
pub mod packet;
pub mod types;

// Re-export commonly used items at crate root
pub use codec::{parse_audio_codec, parse_video_codec, AudioCodec, ContainerFormat, VideoCodec};
pub use color::PixelFormat;
pub use config::{CacheConfig, PipelineConfig, PrefetchConfig, SourceConfig, TexturePoolConfig};
pub use error::{
    ConfigurationError, DecodeError, GpuError, PipelineError, PipelineResult, ProbeError,
    TextureError, TimeoutError,
};
pub use gpu_traits::{GpuBackend, TextureHandle, ZeroCopySupport};
pub use packet::{
    AudioData, AudioDecoderConfig, AudioTrackInfo, Bitmap, BitmapHandle, DecodePath,
    DecodedFrame, EncodedChunk, FramePayload, NativeFrame, NativeFrameHandle, ProbeResult,
    VideoDecoderConfig, VideoFrameOutput, VideoTrackInfo,
};
pub use types::{FrameNumber, Rational, Resolution, SourceId};
