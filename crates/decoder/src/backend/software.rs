//! Software fallback backend: seek-and-capture on a playback surface.
//!
//! The surface is a passive media element the platform can play any codec
//! it knows through. "Decoding" a chunk means seeking the surface to the
//! chunk's timestamp, waiting for the seek to settle and capturing the
//! composited picture. One surface can only show one frame at a time, so
//! calls are serialized.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use fp_common::{
    AudioData, AudioDecoderConfig, ConfigurationError, DecodeError, DecodePath, EncodedChunk,
    FramePayload, PixelFormat, Resolution, VideoDecoderConfig, VideoFrameOutput,
};

use super::{DecoderBackend, DecoderState};

/// Passive media element used for seek-and-capture decoding.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    /// Whether the platform could load the media at all.
    fn is_available(&self) -> bool;

    fn resolution(&self) -> Resolution;

    /// Resolves once the surface reports the seek as complete.
    async fn seek(&self, time_ms: f64) -> Result<(), String>;

    /// Capture the currently shown picture as a bitmap or raw RGBA8 pixels.
    async fn capture(&self) -> Result<FramePayload, String>;

    fn close(&self) {}
}

/// Decoder that seeks a [`PlaybackSurface`] and captures its pixels.
pub struct SoftwareDecoder {
    surface: Arc<dyn PlaybackSurface>,
    settle: Duration,
    state: Mutex<DecoderState>,
    serial: tokio::sync::Mutex<()>,
    queued: AtomicUsize,
    token: CancellationToken,
}

impl SoftwareDecoder {
    pub fn new(surface: Arc<dyn PlaybackSurface>, settle: Duration) -> Self {
        Self {
            surface,
            settle,
            state: Mutex::new(DecoderState::Unconfigured),
            serial: tokio::sync::Mutex::new(()),
            queued: AtomicUsize::new(0),
            token: CancellationToken::new(),
        }
    }

    pub fn surface(&self) -> &Arc<dyn PlaybackSurface> {
        &self.surface
    }

    fn check_ready(&self) -> Result<(), DecodeError> {
        match *self.state.lock() {
            DecoderState::Configured => Ok(()),
            DecoderState::Unconfigured => Err(DecodeError::NotConfigured),
            DecoderState::Closed => Err(DecodeError::Closed),
        }
    }

    async fn capture_serialized(&self, chunk: &EncodedChunk) -> Result<VideoFrameOutput, DecodeError> {
        let _turn = self.serial.lock().await;
        // Closed while waiting for our turn.
        self.check_ready()?;
        capture_frame(self.surface.as_ref(), self.settle, chunk).await
    }
}

async fn seek_and_settle(
    surface: &dyn PlaybackSurface,
    settle: Duration,
    target_ms: f64,
) -> Result<(), DecodeError> {
    surface
        .seek(target_ms)
        .await
        .map_err(|reason| DecodeError::Seek { target_ms, reason })?;
    if !settle.is_zero() {
        tokio::time::sleep(settle).await;
    }
    Ok(())
}

/// Seek `surface` to the chunk's timestamp and capture what it shows.
///
/// Callers are responsible for not interleaving captures on one surface.
pub(crate) async fn capture_frame(
    surface: &dyn PlaybackSurface,
    settle: Duration,
    chunk: &EncodedChunk,
) -> Result<VideoFrameOutput, DecodeError> {
    let target_ms = chunk.timestamp_us as f64 / 1000.0;
    seek_and_settle(surface, settle, target_ms).await?;
    let payload = surface.capture().await.map_err(DecodeError::Capture)?;

    let (resolution, format) = match &payload {
        FramePayload::Bitmap(bitmap) => (bitmap.resolution(), PixelFormat::Rgba8),
        FramePayload::Native(frame) => (frame.resolution(), frame.format()),
        FramePayload::Raw(_) => (surface.resolution(), PixelFormat::Rgba8),
        FramePayload::Empty => {
            return Err(DecodeError::Capture("surface produced no pixels".into()))
        }
    };

    Ok(VideoFrameOutput {
        timestamp_us: chunk.timestamp_us,
        duration_us: chunk.duration_us,
        resolution,
        format,
        // A captured picture never depends on another one.
        is_keyframe: true,
        payload,
    })
}

#[async_trait]
impl DecoderBackend for SoftwareDecoder {
    fn path(&self) -> DecodePath {
        DecodePath::SoftwareFallback
    }

    fn state(&self) -> DecoderState {
        *self.state.lock()
    }

    fn decode_queue_size(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    async fn configure(
        &self,
        video: Option<&VideoDecoderConfig>,
        audio: Option<&AudioDecoderConfig>,
    ) -> Result<(), ConfigurationError> {
        let mut state = self.state.lock();
        if *state == DecoderState::Closed {
            return Err(ConfigurationError::Closed);
        }
        if !self.surface.is_available() {
            return Err(ConfigurationError::EngineUnavailable(
                "playback surface could not load the media".into(),
            ));
        }
        *state = DecoderState::Configured;
        drop(state);

        // Audio plays through the surface itself; nothing to set up.
        info!(
            codec = ?video.map(|v| v.codec),
            audio = ?audio.map(|a| a.codec),
            "Configured software fallback decoder"
        );
        Ok(())
    }

    async fn decode_video(&self, chunk: EncodedChunk) -> Result<VideoFrameOutput, DecodeError> {
        self.check_ready()?;
        self.queued.fetch_add(1, Ordering::AcqRel);
        let result = tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DecodeError::Closed),
            result = self.capture_serialized(&chunk) => result,
        };
        self.queued.fetch_sub(1, Ordering::AcqRel);
        result
    }

    async fn decode_audio(&self, _chunk: EncodedChunk) -> Result<AudioData, DecodeError> {
        self.check_ready()?;
        Err(DecodeError::Unsupported(
            "software fallback does not decode audio".into(),
        ))
    }

    async fn seek(&self, target_ms: f64) -> Result<(), DecodeError> {
        self.check_ready()?;
        let _turn = self.serial.lock().await;
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(DecodeError::Closed),
            result = seek_and_settle(self.surface.as_ref(), self.settle, target_ms) => {
                debug!(target_ms, "Playback surface repositioned");
                result
            }
        }
    }

    async fn flush(&self) -> Result<(), DecodeError> {
        self.check_ready()?;
        // Waiting for our turn means every earlier call has finished.
        let _turn = self.serial.lock().await;
        Ok(())
    }

    async fn reset(&self) {
        let mut state = self.state.lock();
        if *state != DecoderState::Closed {
            *state = DecoderState::Unconfigured;
        }
    }

    async fn close(&self) {
        {
            let mut state = self.state.lock();
            if *state == DecoderState::Closed {
                return;
            }
            *state = DecoderState::Closed;
        }
        self.token.cancel();
        self.surface.close();
        info!("Closed software fallback decoder");
    }
}
