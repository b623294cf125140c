//! Media source manager. Owns every open source and its decoder.
//!
//! Opening a source probes it, asks the [`CodecResolver`] which backend to
//! use, builds and configures that backend and registers the result under a
//! [`SourceId`]. Frame requests go cache-first; a miss decodes through the
//! source's backend and stores the result in the shared [`FrameCache`].
//!
//! Concurrent misses for the same `(source, frame)` share one decode.
//!
//! ## Fallback ladder
//!
//! ```text
//! FastNative --ConfigurationError--> SoftwareFallback --error--> degraded
//! ```
//!
//! A degraded source has no decoder at all and captures straight from its
//! playback surface, one frame at a time.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fp_common::{
    AudioDecoderConfig, ConfigurationError, DecodeError, DecodePath, DecodedFrame, EncodedChunk,
    FrameNumber, PipelineError, PipelineResult, ProbeError, ProbeResult, Rational, SourceConfig,
    SourceId, VideoDecoderConfig, VideoFrameOutput,
};
use fp_demux::{MediaInput, MediaProber};

use crate::backend::software::capture_frame;
use crate::backend::{
    AudioEngine, Decoder, DecoderBackend, NativeDecoder, PlaybackSurface, SoftwareDecoder,
    VideoEngine,
};
use crate::cache::FrameCache;
use crate::capability::{CodecResolver, RuntimeCapabilities};
use crate::prefetch::FrameFetcher;

/// Random access to the encoded video chunks of a source.
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// Chunks from the keyframe preceding `frame` up to and including it.
    async fn gop_for(&self, frame: FrameNumber) -> Result<Vec<EncodedChunk>, DecodeError>;

    /// The single chunk for `frame`.
    async fn chunk_at(&self, frame: FrameNumber) -> Result<EncodedChunk, DecodeError>;
}

/// Platform services the manager needs to open sources.
#[async_trait]
pub trait MediaBackend: MediaProber {
    /// Codecs the fast decode API handles on this machine.
    fn capabilities(&self) -> RuntimeCapabilities;

    fn video_engine(&self, config: &VideoDecoderConfig) -> Option<Arc<VideoEngine>>;

    fn audio_engine(&self, config: &AudioDecoderConfig) -> Option<Arc<AudioEngine>>;

    /// Demuxed chunk access, if the container can be demuxed here.
    async fn open_chunk_source(
        &self,
        input: &MediaInput,
        probe: &ProbeResult,
    ) -> Option<Arc<dyn ChunkSource>>;

    async fn open_surface(&self, input: &MediaInput) -> Result<Arc<dyn PlaybackSurface>, String>;

    /// Release whatever handle the backend created for `input`.
    fn revoke(&self, input: &MediaInput);
}

/// Per-call options for [`MediaSourceManager::open`].
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    /// Use this id instead of generating one.
    pub id: Option<SourceId>,
    /// Overrides the probed recommendation.
    pub preferred_path: Option<DecodePath>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SourceState {
    Idle,
    Loading,
    Ready,
    Seeking,
    Error,
    Closed,
}

struct MediaSource {
    id: SourceId,
    input: MediaInput,
    state: Mutex<SourceState>,
    probe: ProbeResult,
    decode_path: DecodePath,
    decoder: Option<Decoder>,
    chunks: Option<Arc<dyn ChunkSource>>,
    surface: Option<Arc<dyn PlaybackSurface>>,
    /// Last frame fed to the native decoder. Also serializes decodes.
    cursor: tokio::sync::Mutex<Option<FrameNumber>>,
    token: CancellationToken,
    frame_rate: Rational,
    frame_count: Option<u64>,
    settle: Duration,
}

impl MediaSource {
    fn is_degraded(&self) -> bool {
        self.decoder.is_none()
    }

    fn set_state(&self, next: SourceState) {
        let mut state = self.state.lock();
        if *state != SourceState::Closed {
            *state = next;
        }
    }

    /// Cache a frame unless the source was closed in the meantime.
    fn store(&self, cache: &FrameCache, frame: Arc<DecodedFrame>) {
        let state = self.state.lock();
        if *state != SourceState::Closed {
            cache.set_frame(frame);
        }
    }

    fn frame_from(&self, frame: FrameNumber, output: VideoFrameOutput) -> Arc<DecodedFrame> {
        Arc::new(DecodedFrame::from_output(
            self.id.clone(),
            frame,
            output,
            self.decode_path,
        ))
    }

    fn seek_marker(&self, frame: FrameNumber) -> EncodedChunk {
        let duration_us = (self.frame_rate.frame_duration_ms() * 1000.0).round() as i64;
        EncodedChunk::seek_marker(frame.as_micros(self.frame_rate), duration_us)
    }

    async fn decode(
        &self,
        cache: &FrameCache,
        frame: FrameNumber,
    ) -> Result<Arc<DecodedFrame>, DecodeError> {
        let mut cursor = self.cursor.lock().await;
        // A GOP decode holding the lock may have produced this frame already.
        if cache.contains(&self.id, frame) {
            if let Some(hit) = cache.get_frame(&self.id, frame) {
                return Ok(hit);
            }
        }

        match (&self.decoder, &self.chunks) {
            (Some(decoder @ Decoder::FastNative(_)), Some(chunks)) => {
                let result = self
                    .decode_native(decoder, chunks.as_ref(), cache, *cursor, frame)
                    .await;
                *cursor = result.as_ref().ok().map(|_| frame);
                result
            }
            (Some(decoder), _) => {
                let output = decoder.decode_video(self.seek_marker(frame)).await?;
                let decoded = self.frame_from(frame, output);
                self.store(cache, Arc::clone(&decoded));
                Ok(decoded)
            }
            (None, _) => {
                let surface = self
                    .surface
                    .as_ref()
                    .ok_or_else(|| DecodeError::Capture("no playback surface".into()))?;
                let output =
                    capture_frame(surface.as_ref(), self.settle, &self.seek_marker(frame)).await?;
                let decoded = self.frame_from(frame, output);
                self.store(cache, Arc::clone(&decoded));
                Ok(decoded)
            }
        }
    }

    async fn decode_native(
        &self,
        decoder: &Decoder,
        chunks: &dyn ChunkSource,
        cache: &FrameCache,
        last: Option<FrameNumber>,
        frame: FrameNumber,
    ) -> Result<Arc<DecodedFrame>, DecodeError> {
        if frame.0 > 0 && last == Some(FrameNumber(frame.0 - 1)) {
            let chunk = chunks.chunk_at(frame).await?;
            let output = decode_flushed(decoder, vec![chunk])
                .await?
                .pop()
                .unwrap_or(Err(DecodeError::Dropped {
                    timestamp_us: frame.as_micros(self.frame_rate),
                }))?;
            let decoded = self.frame_from(frame, output);
            self.store(cache, Arc::clone(&decoded));
            return Ok(decoded);
        }

        self.set_state(SourceState::Seeking);
        let result = self.decode_gop(decoder, chunks, cache, frame).await;
        self.set_state(SourceState::Ready);
        result
    }

    /// Seek the decoder and feed the GOP up to `frame`, caching every frame.
    async fn decode_gop(
        &self,
        decoder: &Decoder,
        chunks: &dyn ChunkSource,
        cache: &FrameCache,
        frame: FrameNumber,
    ) -> Result<Arc<DecodedFrame>, DecodeError> {
        let gop = chunks.gop_for(frame).await?;
        let first = gop.first().ok_or(DecodeError::KeyframeRequired {
            timestamp_us: frame.as_micros(self.frame_rate),
        })?;
        decoder.seek(first.timestamp_us as f64 / 1000.0).await?;
        debug!(source = %self.id, frame = frame.0, chunks = gop.len(), "Decoding GOP");

        let numbers: Vec<FrameNumber> = gop
            .iter()
            .map(|chunk| FrameNumber::from_millis(chunk.timestamp_us as f64 / 1000.0, self.frame_rate))
            .collect();
        let outputs = decode_flushed(decoder, gop).await?;

        let mut target = None;
        for (number, output) in numbers.into_iter().zip(outputs) {
            let decoded = self.frame_from(number, output?);
            self.store(cache, Arc::clone(&decoded));
            if number == frame {
                target = Some(decoded);
            }
        }
        target.ok_or(DecodeError::Failed {
            timestamp_us: frame.as_micros(self.frame_rate),
            reason: "GOP did not contain the requested frame".into(),
        })
    }
}

/// Submit `chunks`, then flush so the engine releases every buffered output.
///
/// Each submission resolves: with its output, its own error, or
/// [`DecodeError::Dropped`] when the flush discarded it.
async fn decode_flushed(
    decoder: &Decoder,
    chunks: Vec<EncodedChunk>,
) -> Result<Vec<Result<VideoFrameOutput, DecodeError>>, DecodeError> {
    let restart_ms = chunks
        .first()
        .map_or(0.0, |chunk| chunk.timestamp_us as f64 / 1000.0);
    // join! polls the submissions first, so every chunk is queued before the flush starts.
    let (outputs, flushed) = futures::join!(
        future::join_all(chunks.into_iter().map(|chunk| decoder.decode_video(chunk))),
        async {
            let flushed = decoder.flush().await;
            if flushed.is_err() {
                // Restart so submissions the engine still holds are rejected.
                let _ = decoder.seek(restart_ms).await;
            }
            flushed
        }
    );
    flushed?;
    Ok(outputs)
}

/// Decode one frame for the single-flight map. Never caches after close.
async fn decode_frame(
    source: Arc<MediaSource>,
    cache: Arc<FrameCache>,
    frame: FrameNumber,
) -> Option<Arc<DecodedFrame>> {
    let result = tokio::select! {
        _ = source.token.cancelled() => {
            debug!(source = %source.id, frame = frame.0, "Decode cancelled by close");
            return None;
        }
        result = source.decode(&cache, frame) => result,
    };
    match result {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!(source = %source.id, frame = frame.0, error = %e, "Frame decode failed");
            None
        }
    }
}

async fn run_decode(
    inflight: Arc<Mutex<InflightMap>>,
    key: (SourceId, FrameNumber),
    flight: u64,
    source: Arc<MediaSource>,
    cache: Arc<FrameCache>,
) -> Option<Arc<DecodedFrame>> {
    let result = decode_frame(source, cache, key.1).await;
    let mut map = inflight.lock();
    if map.get(&key).is_some_and(|(current, _)| *current == flight) {
        map.remove(&key);
    }
    result
}

type InflightDecode = Shared<BoxFuture<'static, Option<Arc<DecodedFrame>>>>;
type InflightMap = HashMap<(SourceId, FrameNumber), (u64, InflightDecode)>;

#[derive(Default)]
struct SourceTable {
    sources: HashMap<SourceId, Arc<MediaSource>>,
    /// Open order, oldest first.
    order: VecDeque<SourceId>,
    loading: HashSet<SourceId>,
    failed: HashSet<SourceId>,
    closed: HashSet<SourceId>,
}

/// Owns every open source, its decoder and the shared frame cache.
pub struct MediaSourceManager {
    backend: Arc<dyn MediaBackend>,
    cache: Arc<FrameCache>,
    resolver: CodecResolver,
    config: SourceConfig,
    table: Mutex<SourceTable>,
    /// Decodes in progress. Each decode task removes its own entry.
    inflight: Arc<Mutex<InflightMap>>,
    /// Woken whenever an open finishes and may have freed a slot.
    slots: Notify,
    next_id: AtomicU64,
    next_flight: AtomicU64,
}

impl std::fmt::Debug for MediaSourceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = self.table.lock();
        f.debug_struct("MediaSourceManager")
            .field("sources", &table.order)
            .field("inflight", &self.inflight.lock().len())
            .field("config", &self.config)
            .finish()
    }
}

impl MediaSourceManager {
    pub fn new(backend: Arc<dyn MediaBackend>, cache: Arc<FrameCache>, config: SourceConfig) -> Self {
        let resolver = CodecResolver::new(backend.capabilities(), config.allow_software_fallback);
        Self {
            backend,
            cache,
            resolver,
            config,
            table: Mutex::new(SourceTable::default()),
            inflight: Arc::new(Mutex::new(HashMap::new())),
            slots: Notify::new(),
            next_id: AtomicU64::new(1),
            next_flight: AtomicU64::new(1),
        }
    }

    pub fn cache(&self) -> &Arc<FrameCache> {
        &self.cache
    }

    pub fn resolver(&self) -> &CodecResolver {
        &self.resolver
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Open a source and return its id.
    ///
    /// When `max_concurrent_sources` is reached the oldest-opened source is
    /// closed first, regardless of how recently it was used. Opens still in
    /// progress hold a slot too; if they hold all of them this waits for one
    /// to finish.
    pub async fn open(&self, input: MediaInput, options: OpenOptions) -> PipelineResult<SourceId> {
        let id = match options.id {
            Some(id) => id,
            None => SourceId::new(format!(
                "source-{}",
                self.next_id.fetch_add(1, Ordering::Relaxed)
            )),
        };
        self.reserve(&id).await?;

        info!(source = %id, input = %input.location(), "Opening source");
        let result = self.load(&id, &input, options.preferred_path).await;

        let mut table = self.table.lock();
        table.loading.remove(&id);
        let opened = match result {
            Ok(source) => {
                info!(
                    source = %id,
                    path = %source.decode_path,
                    degraded = source.is_degraded(),
                    frames = ?source.frame_count,
                    "Source ready"
                );
                table.order.push_back(id.clone());
                table.sources.insert(id.clone(), source);
                Ok(id)
            }
            Err(e) => {
                warn!(source = %id, error = %e, "Failed to open source");
                table.failed.insert(id);
                Err(e)
            }
        };
        drop(table);
        self.slots.notify_waiters();
        opened
    }

    /// Claim a slot for `id`, closing the oldest open sources to make room.
    async fn reserve(&self, id: &SourceId) -> PipelineResult<()> {
        let max = self.config.max_concurrent_sources.max(1);
        loop {
            let slot_freed = self.slots.notified();
            tokio::pin!(slot_freed);
            slot_freed.as_mut().enable();

            let oldest = {
                let mut table = self.table.lock();
                if table.sources.contains_key(id) || table.loading.contains(id) {
                    return Err(PipelineError::InvalidConfig(format!(
                        "source id {id} is already open"
                    )));
                }
                if table.sources.len() + table.loading.len() < max {
                    table.closed.remove(id);
                    table.failed.remove(id);
                    table.loading.insert(id.clone());
                    return Ok(());
                }
                table.order.front().cloned()
            };

            match oldest {
                Some(oldest) => {
                    info!(source = %oldest, max, "Source limit reached, closing oldest source");
                    if self.close(&oldest).await.is_err() {
                        // Already gone; make sure the loop advances.
                        self.table.lock().order.retain(|open| open != &oldest);
                    }
                }
                None => {
                    debug!(source = %id, max, "Every source slot is loading, waiting");
                    slot_freed.await;
                }
            }
        }
    }

    async fn load(
        &self,
        id: &SourceId,
        input: &MediaInput,
        preferred: Option<DecodePath>,
    ) -> PipelineResult<Arc<MediaSource>> {
        let mut probe = self.backend.probe(input).await?;
        self.resolver.annotate(&mut probe);
        let video = probe.video.clone().ok_or(ProbeError::NoVideoTrack)?;

        let path = self.select_path(video.decode_path, preferred);
        debug!(source = %id, recommended = %video.decode_path, selected = %path, "Selected decode path");

        let video_config = video.decoder_config();
        let unsupported = || ConfigurationError::UnsupportedVideo {
            codec: video.codec,
            width: video.resolution.width,
            height: video.resolution.height,
        };

        let mut chunks = None;
        let mut decoder = None;
        let mut surface = None;
        let mut decode_path = path;

        match path {
            DecodePath::Unsupported => return Err(unsupported().into()),
            DecodePath::FastNative => match self.open_native(input, &probe, &video_config).await {
                Ok((native, chunk_source)) => {
                    decoder = Some(Decoder::FastNative(native));
                    chunks = Some(chunk_source);
                }
                Err(e) if self.config.allow_software_fallback => {
                    warn!(source = %id, error = %e, "Fast decode path unavailable, falling back to software");
                    decode_path = DecodePath::SoftwareFallback;
                }
                Err(e) => return Err(e.into()),
            },
            DecodePath::SoftwareFallback => {}
        }

        if decode_path == DecodePath::SoftwareFallback {
            match self.backend.open_surface(input).await {
                Ok(opened) => {
                    let software = SoftwareDecoder::new(Arc::clone(&opened), self.config.seek_settle());
                    match software.configure(Some(&video_config), None).await {
                        Ok(()) => decoder = Some(Decoder::SoftwareFallback(software)),
                        Err(e) => {
                            warn!(source = %id, error = %e, "Software decoder unavailable, capturing without a decoder");
                        }
                    }
                    surface = Some(opened);
                }
                Err(reason) => {
                    warn!(source = %id, reason = %reason, "No playback surface, source is degraded");
                }
            }
        }

        let frame_count = probe.frame_count().filter(|count| *count > 0);
        Ok(Arc::new(MediaSource {
            id: id.clone(),
            input: input.clone(),
            state: Mutex::new(SourceState::Ready),
            decode_path,
            decoder,
            chunks,
            surface,
            cursor: tokio::sync::Mutex::new(None),
            token: CancellationToken::new(),
            frame_rate: video.frame_rate,
            frame_count,
            settle: self.config.seek_settle(),
            probe,
        }))
    }

    /// Explicit preference wins unless it asks for a fast path the runtime lacks.
    fn select_path(&self, recommended: DecodePath, preferred: Option<DecodePath>) -> DecodePath {
        match preferred {
            Some(DecodePath::FastNative) if recommended == DecodePath::FastNative => {
                DecodePath::FastNative
            }
            Some(DecodePath::FastNative) | Some(DecodePath::SoftwareFallback)
                if self.config.allow_software_fallback =>
            {
                DecodePath::SoftwareFallback
            }
            _ => recommended,
        }
    }

    async fn open_native(
        &self,
        input: &MediaInput,
        probe: &ProbeResult,
        video_config: &VideoDecoderConfig,
    ) -> Result<(NativeDecoder, Arc<dyn ChunkSource>), ConfigurationError> {
        let engine = self.backend.video_engine(video_config).ok_or_else(|| {
            ConfigurationError::EngineUnavailable(format!("no engine for {:?}", video_config.codec))
        })?;
        let chunks = self
            .backend
            .open_chunk_source(input, probe)
            .await
            .ok_or_else(|| {
                ConfigurationError::EngineUnavailable(format!(
                    "cannot demux {:?} container",
                    probe.container
                ))
            })?;

        // Audio only rides along when it can take the fast path too.
        let audio_config = probe
            .audio
            .as_ref()
            .filter(|audio| audio.decode_path == DecodePath::FastNative)
            .map(|audio| audio.decoder_config());
        let audio_engine = audio_config
            .as_ref()
            .and_then(|config| self.backend.audio_engine(config));
        let audio_config = audio_config.filter(|_| audio_engine.is_some());

        let decoder = NativeDecoder::new(Some(engine), audio_engine);
        if let Err(e) = decoder.configure(Some(video_config), audio_config.as_ref()).await {
            decoder.close().await;
            return Err(e);
        }
        Ok((decoder, chunks))
    }

    fn source(&self, id: &SourceId) -> PipelineResult<Arc<MediaSource>> {
        let table = self.table.lock();
        if let Some(source) = table.sources.get(id) {
            return Ok(Arc::clone(source));
        }
        if table.closed.contains(id) {
            Err(PipelineError::SourceClosed(id.clone()))
        } else {
            Err(PipelineError::SourceNotFound(id.clone()))
        }
    }

    /// Frame `frame` of a source, from cache or freshly decoded.
    ///
    /// `Ok(None)` when the frame is out of range or could not be decoded.
    pub async fn get_video_frame_by_number(
        &self,
        id: &SourceId,
        frame: FrameNumber,
    ) -> PipelineResult<Option<Arc<DecodedFrame>>> {
        let source = self.source(id)?;
        if let Some(count) = source.frame_count {
            if frame.0 >= count {
                return Ok(None);
            }
        }
        if let Some(hit) = self.cache.get_frame(id, frame) {
            return Ok(Some(hit));
        }

        let key = (id.clone(), frame);
        let decode = {
            let mut inflight = self.inflight.lock();
            match inflight.get(&key) {
                Some((_, decode)) => decode.clone(),
                None => {
                    let flight = self.next_flight.fetch_add(1, Ordering::Relaxed);
                    // The task runs to completion even if every caller gives up.
                    // Spawned under the map lock so its removal cannot beat the insert.
                    let task = tokio::spawn(run_decode(
                        Arc::clone(&self.inflight),
                        key.clone(),
                        flight,
                        source,
                        Arc::clone(&self.cache),
                    ));
                    let decode = task
                        .map(|joined| joined.ok().flatten())
                        .boxed()
                        .shared();
                    inflight.insert(key, (flight, decode.clone()));
                    decode
                }
            }
        };
        Ok(decode.await)
    }

    /// Frame showing at `time_ms`.
    pub async fn get_video_frame(
        &self,
        id: &SourceId,
        time_ms: f64,
    ) -> PipelineResult<Option<Arc<DecodedFrame>>> {
        let rate = self.source(id)?.frame_rate;
        self.get_video_frame_by_number(id, FrameNumber::from_millis(time_ms, rate))
            .await
    }

    /// Close a source. Closing an already closed source is a no-op.
    pub async fn close(&self, id: &SourceId) -> PipelineResult<()> {
        let source = {
            let mut table = self.table.lock();
            match table.sources.remove(id) {
                Some(source) => {
                    table.order.retain(|open| open != id);
                    table.closed.insert(id.clone());
                    source
                }
                None if table.closed.contains(id) => return Ok(()),
                None => return Err(PipelineError::SourceNotFound(id.clone())),
            }
        };

        *source.state.lock() = SourceState::Closed;
        source.token.cancel();
        match &source.decoder {
            Some(decoder) => decoder.close().await,
            None => {
                if let Some(surface) = &source.surface {
                    surface.close();
                }
            }
        }
        self.backend.revoke(&source.input);
        let purged = self.cache.remove_source(id);
        self.inflight.lock().retain(|(source_id, _), _| source_id != id);
        info!(source = %id, purged, "Source closed");
        Ok(())
    }

    pub async fn close_all(&self) {
        let ids = self.source_ids();
        for id in ids {
            let _ = self.close(&id).await;
        }
    }

    /// Ids of open sources, oldest first.
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.table.lock().order.iter().cloned().collect()
    }

    pub fn source_state(&self, id: &SourceId) -> Option<SourceState> {
        let table = self.table.lock();
        if let Some(source) = table.sources.get(id) {
            return Some(*source.state.lock());
        }
        if table.loading.contains(id) {
            Some(SourceState::Loading)
        } else if table.failed.contains(id) {
            Some(SourceState::Error)
        } else if table.closed.contains(id) {
            Some(SourceState::Closed)
        } else {
            None
        }
    }

    pub fn probe_result(&self, id: &SourceId) -> PipelineResult<ProbeResult> {
        Ok(self.source(id)?.probe.clone())
    }

    pub fn decode_path(&self, id: &SourceId) -> PipelineResult<DecodePath> {
        Ok(self.source(id)?.decode_path)
    }

    /// Whether the source runs without any decoder.
    pub fn is_degraded(&self, id: &SourceId) -> PipelineResult<bool> {
        Ok(self.source(id)?.is_degraded())
    }

    pub fn frame_rate(&self, id: &SourceId) -> PipelineResult<Rational> {
        Ok(self.source(id)?.frame_rate)
    }
}

#[async_trait]
impl FrameFetcher for MediaSourceManager {
    async fn fetch_frame(
        &self,
        source: &SourceId,
        frame: FrameNumber,
    ) -> PipelineResult<Option<Arc<DecodedFrame>>> {
        self.get_video_frame_by_number(source, frame).await
    }

    fn is_resident(&self, source: &SourceId, frame: FrameNumber) -> bool {
        self.cache.contains(source, frame)
    }

    fn frame_count(&self, source: &SourceId) -> Option<u64> {
        self.table.lock().sources.get(source)?.frame_count
    }
}
