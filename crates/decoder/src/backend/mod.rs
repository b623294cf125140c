//! Decoder contract shared by both decode backends.
//!
//! A [`Decoder`] is either a [`NativeDecoder`] driving the platform's fast
//! decode API or a [`SoftwareDecoder`] that seeks a passive playback surface
//! and captures what it shows. Both go through the same [`DecoderBackend`]
//! trait, so the source manager never cares which one it holds.
//!
//! ## State machine
//!
//! ```text
//! Unconfigured --configure--> Configured --close--> Closed
//!       ^                          |
//!       +---------reset------------+
//! ```
//!
//! Every request resolves or rejects; nothing waits forever on a closed
//! decoder.

pub mod native;
pub mod software;

use async_trait::async_trait;

use fp_common::{
    AudioData, AudioDecoderConfig, ConfigurationError, DecodeError, DecodePath, EncodedChunk,
    VideoDecoderConfig, VideoFrameOutput,
};

pub use native::{AudioEngine, EngineOutput, EngineSink, NativeDecoder, NativeEngine, VideoEngine};
pub use software::{PlaybackSurface, SoftwareDecoder};

/// Lifecycle state of a decoder.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DecoderState {
    Unconfigured,
    Configured,
    Closed,
}

/// Operations every decode backend provides.
#[async_trait]
pub trait DecoderBackend: Send + Sync {
    /// Which decode path this backend implements.
    fn path(&self) -> DecodePath;

    fn state(&self) -> DecoderState;

    /// Requests submitted but not yet resolved.
    fn decode_queue_size(&self) -> usize;

    /// Check runtime support and commit the configuration.
    ///
    /// A [`ConfigurationError`] leaves the decoder unconfigured so the
    /// caller can fall back to the other backend.
    async fn configure(
        &self,
        video: Option<&VideoDecoderConfig>,
        audio: Option<&AudioDecoderConfig>,
    ) -> Result<(), ConfigurationError>;

    async fn decode_video(&self, chunk: EncodedChunk) -> Result<VideoFrameOutput, DecodeError>;

    async fn decode_audio(&self, chunk: EncodedChunk) -> Result<AudioData, DecodeError>;

    /// Drop in-flight work and reposition. The next chunk must be a keyframe.
    async fn seek(&self, target_ms: f64) -> Result<(), DecodeError>;

    /// Wait until every submitted chunk has resolved.
    async fn flush(&self) -> Result<(), DecodeError>;

    /// Return to `Unconfigured` without releasing the decoder.
    async fn reset(&self);

    /// Release all resources. Idempotent.
    async fn close(&self);
}

/// A decoder of either kind.
pub enum Decoder {
    FastNative(NativeDecoder),
    SoftwareFallback(SoftwareDecoder),
}

impl Decoder {
    fn backend(&self) -> &dyn DecoderBackend {
        match self {
            Self::FastNative(decoder) => decoder,
            Self::SoftwareFallback(decoder) => decoder,
        }
    }
}

impl std::fmt::Debug for Decoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decoder")
            .field("path", &self.path())
            .field("state", &self.state())
            .field("queue", &self.decode_queue_size())
            .finish()
    }
}

#[async_trait]
impl DecoderBackend for Decoder {
    fn path(&self) -> DecodePath {
        self.backend().path()
    }

    fn state(&self) -> DecoderState {
        self.backend().state()
    }

    fn decode_queue_size(&self) -> usize {
        self.backend().decode_queue_size()
    }

    async fn configure(
        &self,
        video: Option<&VideoDecoderConfig>,
        audio: Option<&AudioDecoderConfig>,
    ) -> Result<(), ConfigurationError> {
        self.backend().configure(video, audio).await
    }

    async fn decode_video(&self, chunk: EncodedChunk) -> Result<VideoFrameOutput, DecodeError> {
        self.backend().decode_video(chunk).await
    }

    async fn decode_audio(&self, chunk: EncodedChunk) -> Result<AudioData, DecodeError> {
        self.backend().decode_audio(chunk).await
    }

    async fn seek(&self, target_ms: f64) -> Result<(), DecodeError> {
        self.backend().seek(target_ms).await
    }

    async fn flush(&self) -> Result<(), DecodeError> {
        self.backend().flush().await
    }

    async fn reset(&self) {
        self.backend().reset().await
    }

    async fn close(&self) {
        self.backend().close().await
    }
}
