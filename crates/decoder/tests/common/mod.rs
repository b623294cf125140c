//! In-memory platform doubles shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::Notify;

use fp_common::{
    AudioDecoderConfig, Bitmap, ContainerFormat, DecodeError, DecodePath, EncodedChunk,
    FrameNumber, FramePayload, GpuBackend, GpuError, NativeFrame, PixelFormat, ProbeError,
    ProbeResult, Rational, Resolution, TextureHandle, VideoCodec, VideoDecoderConfig,
    VideoFrameOutput, VideoTrackInfo, ZeroCopySupport,
};
use fp_decoder::{
    AudioEngine, ChunkSource, EngineSink, MediaBackend, NativeEngine, PlaybackSurface,
    RuntimeCapabilities, VideoEngine,
};
use fp_demux::{MediaInput, MediaProber};

/// Route `tracing` output through the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const GOP: u64 = 30;

#[derive(Debug)]
pub struct TestFrame {
    pub timestamp_us: i64,
    pub resolution: Resolution,
}

impl NativeFrame for TestFrame {
    fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn format(&self) -> PixelFormat {
        PixelFormat::Nv12
    }

    fn copy_pixels(&self) -> Result<Bytes, String> {
        let size = PixelFormat::Nv12.frame_byte_size(self.resolution.width, self.resolution.height);
        Ok(Bytes::from(vec![128u8; size]))
    }
}

#[derive(Debug)]
pub struct TestBitmap {
    pub resolution: Resolution,
}

impl Bitmap for TestBitmap {
    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn copy_pixels(&self) -> Result<Bytes, String> {
        let size = PixelFormat::Rgba8.frame_byte_size(self.resolution.width, self.resolution.height);
        Ok(Bytes::from(vec![255u8; size]))
    }
}

/// Native video engine emitting one frame per chunk.
#[derive(Default)]
pub struct TestEngine {
    sink: Mutex<Option<EngineSink<VideoFrameOutput>>>,
    pub decodes: AtomicUsize,
    pub configures: AtomicUsize,
    /// Accept chunks but never emit anything. Flushes wait for `close`.
    pub hold: AtomicBool,
    release: Notify,
    pub rejects_config: bool,
}

#[async_trait]
impl NativeEngine for TestEngine {
    type Config = VideoDecoderConfig;
    type Output = VideoFrameOutput;

    async fn is_config_supported(&self, _config: &VideoDecoderConfig) -> bool {
        !self.rejects_config
    }

    fn configure(
        &self,
        _config: &VideoDecoderConfig,
        sink: EngineSink<VideoFrameOutput>,
    ) -> Result<(), String> {
        self.configures.fetch_add(1, Ordering::SeqCst);
        *self.sink.lock() = Some(sink);
        Ok(())
    }

    fn decode(&self, chunk: &EncodedChunk) -> Result<(), String> {
        self.decodes.fetch_add(1, Ordering::SeqCst);
        if self.hold.load(Ordering::SeqCst) {
            return Ok(());
        }
        let resolution = Resolution::new(8, 8);
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.output(VideoFrameOutput {
                timestamp_us: chunk.timestamp_us,
                duration_us: chunk.duration_us,
                resolution,
                format: PixelFormat::Nv12,
                is_keyframe: false,
                payload: FramePayload::Native(Arc::new(TestFrame {
                    timestamp_us: chunk.timestamp_us,
                    resolution,
                })),
            });
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), String> {
        if self.hold.load(Ordering::SeqCst) {
            self.release.notified().await;
        }
        Ok(())
    }

    fn reset(&self) {}

    fn close(&self) {
        self.sink.lock().take();
        self.release.notify_one();
    }
}

/// Chunks for a constant frame rate stream with a keyframe every [`GOP`] frames.
pub struct TestChunks {
    pub frame_rate: Rational,
}

impl TestChunks {
    fn chunk(&self, n: u64) -> EncodedChunk {
        let duration_us = (self.frame_rate.frame_duration_ms() * 1000.0).round() as i64;
        EncodedChunk::new(
            FrameNumber(n).as_micros(self.frame_rate),
            duration_us,
            n % GOP == 0,
            Bytes::from_static(&[0, 0, 0, 1]),
        )
    }
}

#[async_trait]
impl ChunkSource for TestChunks {
    async fn gop_for(&self, frame: FrameNumber) -> Result<Vec<EncodedChunk>, DecodeError> {
        let key = frame.0 - frame.0 % GOP;
        Ok((key..=frame.0).map(|n| self.chunk(n)).collect())
    }

    async fn chunk_at(&self, frame: FrameNumber) -> Result<EncodedChunk, DecodeError> {
        Ok(self.chunk(frame.0))
    }
}

/// Playback surface that captures a bitmap wherever it was last sought to.
#[derive(Default)]
pub struct TestSurface {
    pub unavailable: bool,
    pub seeks: Mutex<Vec<f64>>,
    pub closed: AtomicBool,
}

#[async_trait]
impl PlaybackSurface for TestSurface {
    fn is_available(&self) -> bool {
        !self.unavailable
    }

    fn resolution(&self) -> Resolution {
        Resolution::new(4, 4)
    }

    async fn seek(&self, time_ms: f64) -> Result<(), String> {
        tokio::task::yield_now().await;
        self.seeks.lock().push(time_ms);
        Ok(())
    }

    async fn capture(&self) -> Result<FramePayload, String> {
        Ok(FramePayload::Bitmap(Arc::new(TestBitmap {
            resolution: Resolution::new(4, 4),
        })))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// What the test backend reports for each input.
#[derive(Clone, Debug)]
pub struct TestMedia {
    pub codec_string: String,
    pub resolution: Resolution,
    pub frame_rate: Rational,
    pub duration_ms: f64,
    pub audio: Option<fp_common::AudioTrackInfo>,
}

impl TestMedia {
    pub fn h264_1080p30() -> Self {
        Self {
            codec_string: "avc1.640028".into(),
            resolution: Resolution::HD,
            frame_rate: Rational::FPS_30,
            duration_ms: 10_000.0,
            audio: None,
        }
    }

    pub fn prores() -> Self {
        Self {
            codec_string: "apch".into(),
            ..Self::h264_1080p30()
        }
    }
}

pub enum SurfaceMode {
    Available,
    Unavailable,
    Missing,
}

/// Media backend wired from the doubles above.
pub struct TestBackend {
    pub capabilities: RuntimeCapabilities,
    pub engine: Arc<TestEngine>,
    pub engine_available: bool,
    pub surface_mode: SurfaceMode,
    pub media: Mutex<HashMap<String, TestMedia>>,
    pub surfaces: Mutex<Vec<Arc<TestSurface>>>,
    pub revoked: Mutex<Vec<String>>,
    pub probes: AtomicU64,
}

impl TestBackend {
    pub fn new(capabilities: RuntimeCapabilities) -> Self {
        Self {
            capabilities,
            engine: Arc::new(TestEngine::default()),
            engine_available: true,
            surface_mode: SurfaceMode::Available,
            media: Mutex::new(HashMap::new()),
            surfaces: Mutex::new(Vec::new()),
            revoked: Mutex::new(Vec::new()),
            probes: AtomicU64::new(0),
        }
    }

    /// Backend whose fast path handles H.264 only.
    pub fn avc_only() -> Self {
        Self::new(RuntimeCapabilities::none().with_video([VideoCodec::Avc]))
    }

    pub fn with_media(self, location: &str, media: TestMedia) -> Self {
        self.media.lock().insert(location.to_string(), media);
        self
    }
}

#[async_trait]
impl MediaProber for TestBackend {
    async fn probe(&self, input: &MediaInput) -> Result<ProbeResult, ProbeError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let media = self
            .media
            .lock()
            .get(&input.location())
            .cloned()
            .ok_or_else(|| ProbeError::Failed(format!("{} not found", input.location())))?;
        Ok(ProbeResult {
            container: ContainerFormat::Mp4,
            duration_ms: media.duration_ms,
            bitrate: 8_000_000,
            video: Some(VideoTrackInfo {
                codec: fp_common::parse_video_codec(&media.codec_string),
                codec_string: media.codec_string.clone(),
                resolution: media.resolution,
                frame_rate: media.frame_rate,
                decode_path: DecodePath::Unsupported,
            }),
            audio: media.audio.clone(),
        })
    }
}

#[async_trait]
impl MediaBackend for TestBackend {
    fn capabilities(&self) -> RuntimeCapabilities {
        self.capabilities.clone()
    }

    fn video_engine(&self, _config: &VideoDecoderConfig) -> Option<Arc<VideoEngine>> {
        if !self.engine_available {
            return None;
        }
        let engine: Arc<VideoEngine> = self.engine.clone();
        Some(engine)
    }

    fn audio_engine(&self, _config: &AudioDecoderConfig) -> Option<Arc<AudioEngine>> {
        None
    }

    async fn open_chunk_source(
        &self,
        input: &MediaInput,
        probe: &ProbeResult,
    ) -> Option<Arc<dyn ChunkSource>> {
        let _ = input;
        let frame_rate = probe.video.as_ref()?.frame_rate;
        Some(Arc::new(TestChunks { frame_rate }))
    }

    async fn open_surface(&self, input: &MediaInput) -> Result<Arc<dyn PlaybackSurface>, String> {
        let surface = match self.surface_mode {
            SurfaceMode::Missing => return Err(format!("cannot load {}", input.location())),
            SurfaceMode::Available => Arc::new(TestSurface::default()),
            SurfaceMode::Unavailable => Arc::new(TestSurface {
                unavailable: true,
                ..Default::default()
            }),
        };
        self.surfaces.lock().push(surface.clone());
        Ok(surface)
    }

    fn revoke(&self, input: &MediaInput) {
        self.revoked.lock().push(input.location());
    }
}

/// GPU backend that records every call.
#[derive(Default)]
pub struct TestGpu {
    pub next: AtomicU64,
    pub support: ZeroCopySupport,
    pub calls: Mutex<Vec<String>>,
}

impl GpuBackend for TestGpu {
    fn create_texture(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<TextureHandle, GpuError> {
        let id = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.lock().push(format!("create {width}x{height} {format:?}"));
        Ok(TextureHandle(id))
    }

    fn upload_pixels(&self, _texture: TextureHandle, pixels: &[u8]) -> Result<(), GpuError> {
        self.calls.lock().push(format!("upload {}", pixels.len()));
        Ok(())
    }

    fn import_video_frame(
        &self,
        _texture: TextureHandle,
        _frame: &dyn NativeFrame,
    ) -> Result<(), GpuError> {
        self.calls.lock().push("import-native".into());
        Ok(())
    }

    fn import_image_bitmap(
        &self,
        _texture: TextureHandle,
        _bitmap: &dyn Bitmap,
    ) -> Result<(), GpuError> {
        self.calls.lock().push("import-bitmap".into());
        Ok(())
    }

    fn destroy_texture(&self, _texture: TextureHandle) {
        self.calls.lock().push("destroy".into());
    }

    fn zero_copy_support(&self) -> ZeroCopySupport {
        self.support
    }
}
