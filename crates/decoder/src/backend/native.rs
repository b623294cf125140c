//! Fast-native backend: drives the platform decode API.
//!
//! A [`NativeEngine`] is callback-shaped: chunks go in through
//! [`NativeEngine::decode`] and decoded outputs come back later through an
//! [`EngineSink`]. The sink feeds an unbounded channel drained by a pump
//! task, which matches each output to the pending request with the same
//! timestamp. Outputs nobody asked for are dropped on the spot so their
//! native resource is released.
//!
//! ```text
//!  decode_video(chunk) ──► register(ts) ──► engine.decode(chunk)
//!        ▲                                        │
//!        │ oneshot                                ▼ sink.output(frame)
//!   Correlator ◄──────── pump task ◄──── mpsc::unbounded
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fp_common::{
    AudioData, AudioDecoderConfig, ConfigurationError, DecodeError, DecodePath, EncodedChunk,
    VideoDecoderConfig, VideoFrameOutput,
};

use super::{DecoderBackend, DecoderState};

/// Something an engine produces for a submitted chunk.
pub trait EngineOutput: Send + 'static {
    /// Timestamp of the chunk this output belongs to.
    fn timestamp_us(&self) -> i64;

    /// Called by the pump once it knows whether the output came from a key chunk.
    fn tag_keyframe(&mut self, _is_key: bool) {}
}

impl EngineOutput for VideoFrameOutput {
    fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }

    fn tag_keyframe(&mut self, is_key: bool) {
        self.is_keyframe = is_key;
    }
}

impl EngineOutput for AudioData {
    fn timestamp_us(&self) -> i64 {
        self.timestamp_us
    }
}

enum EngineEvent<O> {
    Output(O),
    Error { timestamp_us: i64, reason: String },
    Barrier(oneshot::Sender<()>),
}

/// Where an engine delivers its outputs. Cheap to clone; usable from any thread.
pub struct EngineSink<O> {
    tx: mpsc::UnboundedSender<EngineEvent<O>>,
}

impl<O> Clone for EngineSink<O> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<O> std::fmt::Debug for EngineSink<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSink")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<O> EngineSink<O> {
    /// Deliver a decoded output. Returns `false` (and drops the output)
    /// when the decoder has gone away.
    pub fn output(&self, output: O) -> bool {
        self.tx.send(EngineEvent::Output(output)).is_ok()
    }

    /// Report that the chunk at `timestamp_us` failed to decode.
    pub fn error(&self, timestamp_us: i64, reason: impl Into<String>) -> bool {
        self.tx
            .send(EngineEvent::Error {
                timestamp_us,
                reason: reason.into(),
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Platform decode API for one track kind.
///
/// Every submitted chunk must eventually produce an output or an error
/// through the sink, or be discarded by `flush`, `reset` or `close`.
#[async_trait]
pub trait NativeEngine: Send + Sync {
    type Config: Clone + Send + Sync + 'static;
    type Output: EngineOutput;

    /// Ask the platform whether this exact configuration can be decoded.
    async fn is_config_supported(&self, config: &Self::Config) -> bool;

    /// Commit a configuration. Outputs from now on go to `sink`.
    fn configure(&self, config: &Self::Config, sink: EngineSink<Self::Output>)
        -> Result<(), String>;

    /// Submit a chunk. The output arrives later through the sink.
    fn decode(&self, chunk: &EncodedChunk) -> Result<(), String>;

    /// Resolves once every submitted chunk has been emitted or dropped.
    async fn flush(&self) -> Result<(), String>;

    /// Discard queued work and forget the configuration.
    fn reset(&self);

    fn close(&self);
}

pub type VideoEngine = dyn NativeEngine<Config = VideoDecoderConfig, Output = VideoFrameOutput>;
pub type AudioEngine = dyn NativeEngine<Config = AudioDecoderConfig, Output = AudioData>;

type Reply<O> = oneshot::Sender<Result<O, DecodeError>>;

/// Pending requests keyed by chunk timestamp.
struct Correlator<O> {
    pending: HashMap<i64, VecDeque<(u64, Reply<O>)>>,
    last_key_us: Option<i64>,
    accepting: bool,
    closed: bool,
}

impl<O: EngineOutput> Correlator<O> {
    fn new() -> Self {
        Self {
            pending: HashMap::new(),
            last_key_us: None,
            accepting: false,
            closed: false,
        }
    }

    fn register(
        &mut self,
        id: u64,
        chunk: &EncodedChunk,
    ) -> Result<oneshot::Receiver<Result<O, DecodeError>>, DecodeError> {
        if self.closed {
            return Err(DecodeError::Closed);
        }
        if !self.accepting {
            return Err(DecodeError::NotConfigured);
        }
        if chunk.is_key {
            self.last_key_us = Some(chunk.timestamp_us);
        }
        let (tx, rx) = oneshot::channel();
        self.pending
            .entry(chunk.timestamp_us)
            .or_default()
            .push_back((id, tx));
        Ok(rx)
    }

    /// Withdraw a request the engine refused.
    fn cancel(&mut self, timestamp_us: i64, id: u64) -> Option<Reply<O>> {
        let queue = self.pending.get_mut(&timestamp_us)?;
        let pos = queue.iter().position(|(req, _)| *req == id)?;
        let (_, reply) = queue.remove(pos)?;
        if queue.is_empty() {
            self.pending.remove(&timestamp_us);
        }
        Some(reply)
    }

    fn take(&mut self, timestamp_us: i64) -> Option<Reply<O>> {
        let queue = self.pending.get_mut(&timestamp_us)?;
        let reply = queue.pop_front().map(|(_, reply)| reply);
        if queue.is_empty() {
            self.pending.remove(&timestamp_us);
        }
        reply
    }

    /// Hand an output to its request. Gives it back when nobody is waiting.
    fn resolve(&mut self, mut output: O) -> Option<O> {
        let ts = output.timestamp_us();
        output.tag_keyframe(self.last_key_us == Some(ts));
        match self.take(ts) {
            Some(reply) => reply.send(Ok(output)).err().and_then(Result::ok),
            None => Some(output),
        }
    }

    fn fail(&mut self, timestamp_us: i64, err: DecodeError) -> bool {
        match self.take(timestamp_us) {
            Some(reply) => {
                let _ = reply.send(Err(err));
                true
            }
            None => false,
        }
    }

    fn reject_all(&mut self, err: impl Fn(i64) -> DecodeError) -> usize {
        let mut count = 0;
        for (ts, queue) in self.pending.drain() {
            for (_, reply) in queue {
                let _ = reply.send(Err(err(ts)));
                count += 1;
            }
        }
        count
    }

    fn len(&self) -> usize {
        self.pending.values().map(VecDeque::len).sum()
    }
}

struct Pump<O> {
    tx: mpsc::UnboundedSender<EngineEvent<O>>,
    token: CancellationToken,
}

async fn run_pump<O: EngineOutput>(
    kind: &'static str,
    mut rx: mpsc::UnboundedReceiver<EngineEvent<O>>,
    correlator: Arc<Mutex<Correlator<O>>>,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            EngineEvent::Output(output) => {
                if let Some(unmatched) = correlator.lock().resolve(output) {
                    debug!(
                        kind,
                        timestamp_us = unmatched.timestamp_us(),
                        "Discarding unmatched decoder output"
                    );
                }
            }
            EngineEvent::Error {
                timestamp_us,
                reason,
            } => {
                warn!(kind, timestamp_us, %reason, "Engine reported decode error");
                correlator
                    .lock()
                    .fail(timestamp_us, DecodeError::Failed { timestamp_us, reason });
            }
            EngineEvent::Barrier(ack) => {
                let dropped = correlator
                    .lock()
                    .reject_all(|timestamp_us| DecodeError::Dropped { timestamp_us });
                if dropped > 0 {
                    debug!(kind, dropped, "Flush dropped requests without output");
                }
                let _ = ack.send(());
            }
        }
    }
    debug!(kind, "Decoder pump stopped");
}

/// One engine plus its correlation state.
struct Track<C, O> {
    kind: &'static str,
    engine: Arc<dyn NativeEngine<Config = C, Output = O>>,
    correlator: Arc<Mutex<Correlator<O>>>,
    config: Mutex<Option<C>>,
    pump: Mutex<Option<Pump<O>>>,
    next_id: AtomicU64,
}

impl<C, O> Track<C, O>
where
    C: Clone + Send + Sync + 'static,
    O: EngineOutput,
{
    fn new(kind: &'static str, engine: Arc<dyn NativeEngine<Config = C, Output = O>>) -> Self {
        Self {
            kind,
            engine,
            correlator: Arc::new(Mutex::new(Correlator::new())),
            config: Mutex::new(None),
            pump: Mutex::new(None),
            next_id: AtomicU64::new(0),
        }
    }

    fn is_configured(&self) -> bool {
        self.config.lock().is_some()
    }

    fn stop_pump(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.token.cancel();
        }
        self.correlator.lock().accepting = false;
    }

    /// (Re)configure the engine and start a fresh pump.
    fn start(&self, config: &C, parent: &CancellationToken) -> Result<(), String> {
        self.stop_pump();
        self.correlator.lock().reject_all(|_| DecodeError::Flushed);

        let (tx, rx) = mpsc::unbounded_channel();
        self.engine.configure(config, EngineSink { tx: tx.clone() })?;

        let token = parent.child_token();
        tokio::spawn(run_pump(
            self.kind,
            rx,
            Arc::clone(&self.correlator),
            token.clone(),
        ));
        *self.pump.lock() = Some(Pump { tx, token });
        *self.config.lock() = Some(config.clone());
        {
            let mut correlator = self.correlator.lock();
            correlator.accepting = true;
            correlator.last_key_us = None;
        }
        Ok(())
    }

    async fn decode(&self, chunk: EncodedChunk) -> Result<O, DecodeError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.correlator.lock().register(id, &chunk)?;

        if let Err(reason) = self.engine.decode(&chunk) {
            self.correlator.lock().cancel(chunk.timestamp_us, id);
            return Err(DecodeError::Failed {
                timestamp_us: chunk.timestamp_us,
                reason,
            });
        }

        rx.await.unwrap_or(Err(DecodeError::Closed))
    }

    async fn flush(&self) -> Result<(), DecodeError> {
        if !self.is_configured() {
            return Ok(());
        }
        self.engine.flush().await.map_err(DecodeError::Flush)?;

        let tx = self.pump.lock().as_ref().map(|pump| pump.tx.clone());
        if let Some(tx) = tx {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(EngineEvent::Barrier(ack_tx)).is_ok() && ack_rx.await.is_ok() {
                return Ok(());
            }
        }
        // Pump is gone; nothing will ever answer what is still pending.
        self.correlator
            .lock()
            .reject_all(|timestamp_us| DecodeError::Dropped { timestamp_us });
        Ok(())
    }

    /// Drop in-flight work and restart with the stored configuration.
    fn restart(&self, parent: &CancellationToken) -> Result<(), String> {
        let Some(config) = self.config.lock().clone() else {
            return Ok(());
        };
        self.correlator.lock().reject_all(|_| DecodeError::Flushed);
        self.engine.reset();
        self.start(&config, parent)
    }

    fn reset(&self) {
        self.stop_pump();
        self.correlator.lock().reject_all(|_| DecodeError::Flushed);
        self.engine.reset();
        *self.config.lock() = None;
    }

    fn close(&self) {
        self.stop_pump();
        {
            let mut correlator = self.correlator.lock();
            correlator.closed = true;
            correlator.reject_all(|_| DecodeError::Closed);
        }
        self.engine.close();
        *self.config.lock() = None;
    }

    fn queue_size(&self) -> usize {
        self.correlator.lock().len()
    }
}

/// Decoder backed by the platform's fast decode API.
pub struct NativeDecoder {
    video: Option<Track<VideoDecoderConfig, VideoFrameOutput>>,
    audio: Option<Track<AudioDecoderConfig, AudioData>>,
    state: Mutex<DecoderState>,
    needs_keyframe: AtomicBool,
    token: CancellationToken,
}

impl NativeDecoder {
    pub fn new(video: Option<Arc<VideoEngine>>, audio: Option<Arc<AudioEngine>>) -> Self {
        Self {
            video: video.map(|engine| Track::new("video", engine)),
            audio: audio.map(|engine| Track::new("audio", engine)),
            state: Mutex::new(DecoderState::Unconfigured),
            needs_keyframe: AtomicBool::new(true),
            token: CancellationToken::new(),
        }
    }

    fn check_ready(&self) -> Result<(), DecodeError> {
        match *self.state.lock() {
            DecoderState::Configured => Ok(()),
            DecoderState::Unconfigured => Err(DecodeError::NotConfigured),
            DecoderState::Closed => Err(DecodeError::Closed),
        }
    }
}

#[async_trait]
impl DecoderBackend for NativeDecoder {
    fn path(&self) -> DecodePath {
        DecodePath::FastNative
    }

    fn state(&self) -> DecoderState {
        *self.state.lock()
    }

    fn decode_queue_size(&self) -> usize {
        self.video.as_ref().map_or(0, Track::queue_size)
            + self.audio.as_ref().map_or(0, Track::queue_size)
    }

    async fn configure(
        &self,
        video: Option<&VideoDecoderConfig>,
        audio: Option<&AudioDecoderConfig>,
    ) -> Result<(), ConfigurationError> {
        if self.state() == DecoderState::Closed {
            return Err(ConfigurationError::Closed);
        }
        if video.is_none() && audio.is_none() {
            return Err(ConfigurationError::Rejected("no track configuration".into()));
        }

        // Check everything before committing anything.
        let video_track = match video {
            Some(config) => {
                let track = self.video.as_ref().ok_or_else(|| {
                    ConfigurationError::EngineUnavailable("no native video engine".into())
                })?;
                if !track.engine.is_config_supported(config).await {
                    return Err(ConfigurationError::UnsupportedVideo {
                        codec: config.codec,
                        width: config.resolution.width,
                        height: config.resolution.height,
                    });
                }
                Some((track, config))
            }
            None => None,
        };
        let audio_track = match audio {
            Some(config) => {
                let track = self.audio.as_ref().ok_or_else(|| {
                    ConfigurationError::EngineUnavailable("no native audio engine".into())
                })?;
                if !track.engine.is_config_supported(config).await {
                    return Err(ConfigurationError::UnsupportedAudio {
                        codec: config.codec,
                        sample_rate: config.sample_rate,
                        channels: config.channels,
                    });
                }
                Some((track, config))
            }
            None => None,
        };

        if let Some((track, config)) = video_track {
            track
                .start(config, &self.token)
                .map_err(ConfigurationError::Rejected)?;
            info!(codec = ?config.codec, resolution = %config.resolution, "Configured native video decoder");
        }
        if let Some((track, config)) = audio_track {
            if let Err(reason) = track.start(config, &self.token) {
                if let Some(video) = &self.video {
                    video.reset();
                }
                return Err(ConfigurationError::Rejected(reason));
            }
            info!(codec = ?config.codec, sample_rate = config.sample_rate, "Configured native audio decoder");
        }

        *self.state.lock() = DecoderState::Configured;
        self.needs_keyframe.store(true, Ordering::Release);
        Ok(())
    }

    async fn decode_video(&self, chunk: EncodedChunk) -> Result<VideoFrameOutput, DecodeError> {
        self.check_ready()?;
        let track = self
            .video
            .as_ref()
            .filter(|t| t.is_configured())
            .ok_or(DecodeError::NotConfigured)?;

        if self.needs_keyframe.load(Ordering::Acquire) {
            if !chunk.is_key {
                return Err(DecodeError::KeyframeRequired {
                    timestamp_us: chunk.timestamp_us,
                });
            }
            self.needs_keyframe.store(false, Ordering::Release);
        }
        track.decode(chunk).await
    }

    async fn decode_audio(&self, chunk: EncodedChunk) -> Result<AudioData, DecodeError> {
        self.check_ready()?;
        let track = self
            .audio
            .as_ref()
            .filter(|t| t.is_configured())
            .ok_or(DecodeError::NotConfigured)?;
        track.decode(chunk).await
    }

    async fn seek(&self, target_ms: f64) -> Result<(), DecodeError> {
        self.check_ready()?;
        let seek_err = |reason: String| DecodeError::Seek { target_ms, reason };
        if let Some(track) = &self.video {
            track.restart(&self.token).map_err(seek_err)?;
        }
        if let Some(track) = &self.audio {
            track.restart(&self.token).map_err(seek_err)?;
        }
        self.needs_keyframe.store(true, Ordering::Release);
        debug!(target_ms, "Native decoder repositioned");
        Ok(())
    }

    async fn flush(&self) -> Result<(), DecodeError> {
        self.check_ready()?;
        if let Some(track) = &self.video {
            track.flush().await?;
        }
        if let Some(track) = &self.audio {
            track.flush().await?;
        }
        Ok(())
    }

    async fn reset(&self) {
        {
            let mut state = self.state.lock();
            if *state == DecoderState::Closed {
                return;
            }
            *state = DecoderState::Unconfigured;
        }
        if let Some(track) = &self.video {
            track.reset();
        }
        if let Some(track) = &self.audio {
            track.reset();
        }
        self.needs_keyframe.store(true, Ordering::Release);
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
        if let Some(track) = &self.video {
            track.close();
        }
        if let Some(track) = &self.audio {
            track.close();
        }
        info!("Closed native decoder");
    }
}
