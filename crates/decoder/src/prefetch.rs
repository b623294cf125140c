//! Frame prefetcher. Decodes ahead of the playhead so frames are cached
//! before the renderer asks for them.
//!
//! The playback clock reports the playhead through
//! [`FramePrefetcher::update_playhead`]. The prefetcher infers the direction
//! of travel, computes a window around the playhead (wide in the direction
//! of travel, narrow behind it) and queues every frame in the window that is
//! not cached yet, prioritised by distance from the playhead:
//!
//! ```text
//!        behind            playhead             ahead
//!   ... Low  High  High  [Critical]  High  High  Normal ... Low ... Background
//! ```
//!
//! A small pool of dispatch tasks pulls the highest-priority request (FIFO
//! among equals) and hands it to a [`FrameFetcher`], normally the media
//! source manager. Each dispatch is bounded by a timeout. Errors never
//! escape the prefetcher; they only show up in [`PrefetchStats`].
//!
//! When many requests are already in flight the look-ahead shrinks, so a
//! slow decoder is not buried under work it cannot finish in time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, warn};

use fp_common::{DecodedFrame, FrameNumber, PipelineResult, PrefetchConfig, SourceId, TimeoutError};

/// Request urgency. Ordered so that `Critical` compares greatest.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PrefetchPriority {
    Background,
    Low,
    Normal,
    High,
    Critical,
}

/// Priority of a frame `distance` frames away from the playhead.
pub fn priority_for_distance(distance: u64) -> PrefetchPriority {
    match distance {
        0 => PrefetchPriority::Critical,
        1..=3 => PrefetchPriority::High,
        4..=10 => PrefetchPriority::Normal,
        11..=20 => PrefetchPriority::Low,
        _ => PrefetchPriority::Background,
    }
}

/// Direction of playback inferred from consecutive playhead updates.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum PlaybackDirection {
    #[default]
    Forward,
    Backward,
}

/// Whatever can produce frames for the prefetcher.
#[async_trait]
pub trait FrameFetcher: Send + Sync {
    /// Decode (or look up) a frame. `Ok(None)` means it could not be produced.
    async fn fetch_frame(
        &self,
        source: &SourceId,
        frame: FrameNumber,
    ) -> PipelineResult<Option<Arc<DecodedFrame>>>;

    /// Whether the frame is already cached.
    fn is_resident(&self, source: &SourceId, frame: FrameNumber) -> bool;

    /// Total frames in the source, if known.
    fn frame_count(&self, source: &SourceId) -> Option<u64>;
}

/// Invoked once the request completes, with the frame if one was produced.
pub type PrefetchCallback = Box<dyn FnOnce(Option<Arc<DecodedFrame>>) + Send + 'static>;

type RequestKey = (SourceId, FrameNumber);

struct PrefetchRequest {
    priority: PrefetchPriority,
    enqueued_at: Instant,
    sequence: u64,
    callbacks: Vec<PrefetchCallback>,
}

/// Prefetch counters. `queued` and `in_flight` are instantaneous.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    pub requested: u64,
    pub coalesced: u64,
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub queued: usize,
    pub in_flight: usize,
}

#[derive(Copy, Clone, Debug)]
struct Playhead {
    frame: FrameNumber,
    direction: PlaybackDirection,
}

#[derive(Default)]
struct State {
    running: bool,
    queue: HashMap<RequestKey, PrefetchRequest>,
    /// Dispatched requests and the callbacks that joined them after dispatch.
    in_flight: HashMap<RequestKey, Vec<PrefetchCallback>>,
    playheads: HashMap<SourceId, Playhead>,
    sequence: u64,
    stats: PrefetchStats,
}

impl State {
    fn enqueue(
        &mut self,
        key: RequestKey,
        priority: PrefetchPriority,
        callback: Option<PrefetchCallback>,
    ) {
        self.stats.requested += 1;
        if let Some(waiting) = self.in_flight.get_mut(&key) {
            waiting.extend(callback);
            self.stats.coalesced += 1;
            return;
        }
        if let Some(existing) = self.queue.get_mut(&key) {
            existing.priority = existing.priority.max(priority);
            existing.callbacks.extend(callback);
            self.stats.coalesced += 1;
            return;
        }
        self.sequence += 1;
        self.queue.insert(
            key,
            PrefetchRequest {
                priority,
                enqueued_at: Instant::now(),
                sequence: self.sequence,
                callbacks: callback.into_iter().collect(),
            },
        );
    }

    /// Highest priority first; the oldest request wins among equals.
    fn pop_next(&mut self) -> Option<(RequestKey, PrefetchRequest)> {
        let key = self
            .queue
            .iter()
            .max_by(|(_, a), (_, b)| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.sequence.cmp(&a.sequence))
            })
            .map(|(key, _)| key.clone())?;
        self.queue.remove_entry(&key)
    }

    /// Remove queued requests `keep` rejects. Returns their callbacks, which
    /// the caller must invoke with `None` once the state lock is released.
    fn drop_queued(
        &mut self,
        keep: impl Fn(&RequestKey, &PrefetchRequest) -> bool,
    ) -> Vec<PrefetchCallback> {
        let dropped: Vec<RequestKey> = self
            .queue
            .iter()
            .filter(|(key, request)| !keep(key, request))
            .map(|(key, _)| key.clone())
            .collect();
        self.stats.cancelled += dropped.len() as u64;
        dropped
            .iter()
            .filter_map(|key| self.queue.remove(key))
            .flat_map(|request| request.callbacks)
            .collect()
    }
}

/// Cancelled requests still answer their callers.
fn notify_cancelled(callbacks: Vec<PrefetchCallback>) {
    for callback in callbacks {
        callback(None);
    }
}

struct Inner {
    config: PrefetchConfig,
    fetcher: Arc<dyn FrameFetcher>,
    state: Mutex<State>,
}

/// Priority-ordered, concurrency-limited frame prefetcher.
///
/// Cheap to clone; clones share the same queue. Dispatching spawns tokio
/// tasks, so the prefetcher is driven from within a tokio runtime.
#[derive(Clone)]
pub struct FramePrefetcher {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for FramePrefetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePrefetcher")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl FramePrefetcher {
    /// Create a running prefetcher.
    pub fn new(config: PrefetchConfig, fetcher: Arc<dyn FrameFetcher>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                state: Mutex::new(State {
                    running: true,
                    ..Default::default()
                }),
            }),
        }
    }

    pub fn config(&self) -> &PrefetchConfig {
        &self.inner.config
    }

    /// Resume dispatching.
    pub fn start(&self) {
        self.inner.state.lock().running = true;
        self.pump();
    }

    /// Pause dispatching. Requests already in flight still finish.
    pub fn stop(&self) {
        self.inner.state.lock().running = false;
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Look-ahead after backpressure from the current in-flight count.
    fn effective_ahead(&self, in_flight: usize) -> u64 {
        let ahead = self.inner.config.ahead_frames;
        let ratio = in_flight as f64 / self.inner.config.max_concurrent.max(1) as f64;
        if ratio > 0.8 {
            ahead / 2
        } else if ratio > 0.5 {
            ahead * 3 / 4
        } else {
            ahead
        }
    }

    /// Move the playhead of `source` and reschedule its prefetch window.
    pub fn update_playhead(&self, source: &SourceId, frame: FrameNumber) {
        let frame_count = self.inner.fetcher.frame_count(source);
        let behind = self.inner.config.behind_frames;

        let (window, orphaned) = {
            let mut state = self.inner.state.lock();
            let direction = match state.playheads.get(source) {
                Some(prev) if frame > prev.frame => PlaybackDirection::Forward,
                Some(prev) if frame < prev.frame => PlaybackDirection::Backward,
                Some(prev) => prev.direction,
                None => PlaybackDirection::Forward,
            };
            state
                .playheads
                .insert(source.clone(), Playhead { frame, direction });

            let ahead = self.effective_ahead(state.in_flight.len());
            let (before, after) = match direction {
                PlaybackDirection::Forward => (behind, ahead),
                PlaybackDirection::Backward => (ahead, behind),
            };
            let lo = frame.0.saturating_sub(before);
            let mut hi = frame.0.saturating_add(after);
            if let Some(count) = frame_count {
                hi = hi.min(count.saturating_sub(1));
            }
            let window = match frame_count {
                Some(0) => None,
                _ if lo > hi => None,
                _ => Some(lo..=hi),
            };

            // Explicit requests someone waits on survive the window move.
            let queued_before = state.queue.len();
            let orphaned = state.drop_queued(|(id, n), request| {
                id != source
                    || !request.callbacks.is_empty()
                    || window.as_ref().is_some_and(|w| w.contains(&n.0))
            });
            let cancelled = queued_before - state.queue.len();
            if cancelled > 0 {
                debug!(source = %source, cancelled, "Dropped prefetch requests outside window");
            }
            (window, orphaned)
        };
        notify_cancelled(orphaned);

        let Some(window) = window else {
            return;
        };
        let wanted: Vec<FrameNumber> = window
            .map(FrameNumber)
            .filter(|n| !self.inner.fetcher.is_resident(source, *n))
            .collect();

        {
            let mut state = self.inner.state.lock();
            for n in wanted {
                state.enqueue(
                    (source.clone(), n),
                    priority_for_distance(n.distance(frame)),
                    None,
                );
            }
        }
        self.pump();
    }

    /// Queue a single frame explicitly.
    ///
    /// Duplicates coalesce: the higher priority is kept and callbacks are merged.
    pub fn request(
        &self,
        source: &SourceId,
        frame: FrameNumber,
        priority: PrefetchPriority,
        callback: Option<PrefetchCallback>,
    ) {
        self.inner
            .state
            .lock()
            .enqueue((source.clone(), frame), priority, callback);
        self.pump();
    }

    /// Cancel queued requests for a source. Dispatched ones finish silently.
    pub fn remove_source(&self, source: &SourceId) {
        let mut state = self.inner.state.lock();
        state.playheads.remove(source);
        let before = state.queue.len();
        let callbacks = state.drop_queued(|(id, _), _| id != source);
        let cancelled = before - state.queue.len();
        drop(state);
        debug!(source = %source, cancelled, "Removed source from prefetcher");
        notify_cancelled(callbacks);
    }

    /// Drop every queued request and forget all playheads.
    pub fn clear(&self) {
        let callbacks = {
            let mut state = self.inner.state.lock();
            state.playheads.clear();
            state.drop_queued(|_, _| false)
        };
        notify_cancelled(callbacks);
    }

    pub fn is_queued(&self, source: &SourceId, frame: FrameNumber) -> bool {
        self.inner
            .state
            .lock()
            .queue
            .contains_key(&(source.clone(), frame))
    }

    pub fn direction(&self, source: &SourceId) -> Option<PlaybackDirection> {
        self.inner
            .state
            .lock()
            .playheads
            .get(source)
            .map(|p| p.direction)
    }

    pub fn stats(&self) -> PrefetchStats {
        let state = self.inner.state.lock();
        PrefetchStats {
            queued: state.queue.len(),
            in_flight: state.in_flight.len(),
            ..state.stats.clone()
        }
    }

    /// Dispatch queued requests until the concurrency limit is reached.
    fn pump(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("Prefetcher pumped outside a tokio runtime; dispatch deferred");
            return;
        };

        loop {
            let (key, request) = {
                let mut state = self.inner.state.lock();
                if !state.running || state.in_flight.len() >= self.inner.config.max_concurrent {
                    return;
                }
                let Some((key, request)) = state.pop_next() else {
                    return;
                };
                state.in_flight.insert(key.clone(), Vec::new());
                state.stats.dispatched += 1;
                (key, request)
            };

            debug!(
                source = %key.0,
                frame = key.1 .0,
                priority = ?request.priority,
                waited_ms = request.enqueued_at.elapsed().as_millis() as u64,
                "Dispatching prefetch"
            );
            let this = self.clone();
            runtime.spawn(async move { this.run_request(key, request.callbacks).await });
        }
    }

    async fn run_request(self, key: RequestKey, mut callbacks: Vec<PrefetchCallback>) {
        let budget = self.inner.config.request_timeout();
        let outcome =
            tokio::time::timeout(budget, self.inner.fetcher.fetch_frame(&key.0, key.1)).await;

        let frame = {
            let mut state = self.inner.state.lock();
            if let Some(joined) = state.in_flight.remove(&key) {
                callbacks.extend(joined);
            }
            match outcome {
                Ok(Ok(Some(frame))) => {
                    state.stats.completed += 1;
                    Some(frame)
                }
                Ok(Ok(None)) => {
                    state.stats.failed += 1;
                    None
                }
                Ok(Err(err)) => {
                    state.stats.failed += 1;
                    debug!(source = %key.0, frame = key.1 .0, error = %err, "Prefetch failed");
                    None
                }
                Err(_) => {
                    state.stats.timed_out += 1;
                    let err = TimeoutError {
                        source_id: key.0.clone(),
                        frame: key.1,
                        budget,
                    };
                    debug!(error = %err, "Prefetch timed out");
                    None
                }
            }
        };

        for callback in callbacks {
            callback(frame.clone());
        }
        self.pump();
    }
}
