//! Data flowing through the pipeline: encoded chunks in, decoded frames out,
//! and the probe result describing a source.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{AudioCodec, ContainerFormat, VideoCodec};
use crate::color::PixelFormat;
use crate::types::{FrameNumber, Rational, Resolution, SourceId};

/// Which backend services a codec.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DecodePath {
    /// Platform hardware-accelerated decode API.
    FastNative,
    /// Seek-and-capture through a passive playback surface.
    SoftwareFallback,
    Unsupported,
}

impl fmt::Display for DecodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FastNative => "fast-native",
            Self::SoftwareFallback => "software-fallback",
            Self::Unsupported => "unsupported",
        })
    }
}

/// One unit of compressed data as read from the container.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedChunk {
    /// Presentation timestamp; decode outputs are correlated by this value.
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub is_key: bool,
    pub data: Bytes,
}

impl EncodedChunk {
    pub fn new(timestamp_us: i64, duration_us: i64, is_key: bool, data: Bytes) -> Self {
        Self {
            timestamp_us,
            duration_us,
            is_key,
            data,
        }
    }

    /// A payload-free chunk that only carries a target time. Used when the
    /// backend decodes by seeking rather than by consuming bitstream.
    pub fn seek_marker(timestamp_us: i64, duration_us: i64) -> Self {
        Self::new(timestamp_us, duration_us, true, Bytes::new())
    }
}

/// A decoded picture owned by the platform decoder (e.g. a hardware surface).
///
/// Implementors release the underlying resource when dropped, so a handle
/// that is discarded or evicted never leaks the surface.
pub trait NativeFrame: Send + Sync + fmt::Debug {
    fn timestamp_us(&self) -> i64;

    fn resolution(&self) -> Resolution;

    fn format(&self) -> PixelFormat;

    /// Copy the pixels out in tightly packed `format()` layout.
    fn copy_pixels(&self) -> Result<Bytes, String>;
}

/// A composited RGBA bitmap captured from a playback surface.
pub trait Bitmap: Send + Sync + fmt::Debug {
    fn resolution(&self) -> Resolution;

    /// Copy the pixels out as tightly packed RGBA8.
    fn copy_pixels(&self) -> Result<Bytes, String>;
}

pub type NativeFrameHandle = Arc<dyn NativeFrame>;
pub type BitmapHandle = Arc<dyn Bitmap>;

/// Pixel payload of a decoded frame.
#[derive(Clone, Debug)]
pub enum FramePayload {
    Native(NativeFrameHandle),
    Bitmap(BitmapHandle),
    /// CPU-side pixel data in the frame's `format`.
    Raw(Bytes),
    /// No pixels (placeholder frames); cannot be imported.
    Empty,
}

impl FramePayload {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Native(_) => "native",
            Self::Bitmap(_) => "bitmap",
            Self::Raw(_) => "raw",
            Self::Empty => "empty",
        }
    }
}

/// Video frame produced by a decoder backend, before it is tied to a source.
#[derive(Clone, Debug)]
pub struct VideoFrameOutput {
    pub timestamp_us: i64,
    pub duration_us: i64,
    pub resolution: Resolution,
    pub format: PixelFormat,
    pub is_keyframe: bool,
    pub payload: FramePayload,
}

/// A decoded frame as stored in the cache and handed to the renderer.
#[derive(Clone, Debug)]
pub struct DecodedFrame {
    pub source_id: SourceId,
    pub frame_number: FrameNumber,
    pub timestamp_ms: f64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub duration_ms: f64,
    pub is_keyframe: bool,
    pub payload: FramePayload,
    /// Backend that produced the frame.
    pub decode_path: DecodePath,
}

impl DecodedFrame {
    /// Tie a backend output to its source position.
    pub fn from_output(
        source_id: SourceId,
        frame_number: FrameNumber,
        output: VideoFrameOutput,
        decode_path: DecodePath,
    ) -> Self {
        Self {
            source_id,
            frame_number,
            timestamp_ms: output.timestamp_us as f64 / 1000.0,
            width: output.resolution.width,
            height: output.resolution.height,
            format: output.format,
            duration_ms: output.duration_us as f64 / 1000.0,
            is_keyframe: output.is_keyframe,
            payload: output.payload,
            decode_path,
        }
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    /// Bytes this frame accounts for in the cache budget.
    pub fn byte_size(&self) -> usize {
        match &self.payload {
            FramePayload::Raw(data) => data.len(),
            FramePayload::Empty => 0,
            _ => self.format.frame_byte_size(self.width, self.height),
        }
    }
}

/// Decoded PCM audio, interleaved f32 samples.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioData {
    pub timestamp_us: i64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioData {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

/// Video decoder configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoDecoderConfig {
    pub codec: VideoCodec,
    /// Codec string as found in the container (e.g. `avc1.64001f`).
    pub codec_string: String,
    pub resolution: Resolution,
    /// Codec-specific setup data (avcC/hvcC box contents).
    pub description: Option<Bytes>,
}

/// Audio decoder configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioDecoderConfig {
    pub codec: AudioCodec,
    pub codec_string: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Video track summary extracted during probing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VideoTrackInfo {
    pub codec: VideoCodec,
    pub codec_string: String,
    pub resolution: Resolution,
    pub frame_rate: Rational,
    /// Recommended backend, filled in by the capability resolver.
    pub decode_path: DecodePath,
}

impl VideoTrackInfo {
    pub fn decoder_config(&self) -> VideoDecoderConfig {
        VideoDecoderConfig {
            codec: self.codec,
            codec_string: self.codec_string.clone(),
            resolution: self.resolution,
            description: None,
        }
    }
}

/// Audio track summary extracted during probing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioTrackInfo {
    pub codec: AudioCodec,
    pub codec_string: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub decode_path: DecodePath,
}

impl AudioTrackInfo {
    pub fn decoder_config(&self) -> AudioDecoderConfig {
        AudioDecoderConfig {
            codec: self.codec,
            codec_string: self.codec_string.clone(),
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Everything learned about a source when it was opened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub container: ContainerFormat,
    pub duration_ms: f64,
    pub bitrate: u64,
    pub video: Option<VideoTrackInfo>,
    pub audio: Option<AudioTrackInfo>,
}

impl ProbeResult {
    /// Number of video frames, if the source has a video track.
    pub fn frame_count(&self) -> Option<u64> {
        let video = self.video.as_ref()?;
        let frames = (self.duration_ms * video.frame_rate.as_f64() / 1000.0).round();
        Some(frames.max(0.0) as u64)
    }
}
