//! Decoded frame cache with a byte budget and LRU eviction.
//!
//! Frames are keyed by `(SourceId, FrameNumber)` and stored as
//! `Arc<DecodedFrame>`, so a frame handed to the renderer stays alive even
//! if the cache evicts it a moment later. Recency is a logical tick rather
//! than wall-clock time, which makes eviction order deterministic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, warn};

use fp_common::{CacheConfig, DecodedFrame, FrameNumber, SourceId};

type CacheKey = (SourceId, FrameNumber);

struct CacheEntry {
    frame: Arc<DecodedFrame>,
    size: u64,
    last_access: u64,
    last_access_at: Instant,
    access_count: u64,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CacheEntry>,
    resident: u64,
    tick: u64,
    hits: u64,
    misses: u64,
    evictions: u64,
    insertions: u64,
}

impl CacheInner {
    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Evict the least recently used entry; ties go to the least used one.
    fn evict_one(&mut self) -> bool {
        let Some(victim) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| (e.last_access, e.access_count))
            .map(|(key, _)| key.clone())
        else {
            return false;
        };
        if let Some(entry) = self.entries.remove(&victim) {
            self.resident -= entry.size;
            self.evictions += 1;
            debug!(
                source = %victim.0,
                frame = victim.1 .0,
                bytes = entry.size,
                idle_ms = entry.last_access_at.elapsed().as_millis() as u64,
                "Evicted cached frame"
            );
        }
        true
    }
}

/// Snapshot of cache counters.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub insertions: u64,
    pub resident_bytes: u64,
    pub max_bytes: u64,
    pub entries: usize,
    /// `hits / (hits + misses)`, 0 when nothing was looked up yet.
    pub hit_rate: f64,
}

/// Shared, internally locked frame cache.
pub struct FrameCache {
    inner: Mutex<CacheInner>,
    max_bytes: u64,
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("FrameCache")
            .field("entries", &inner.entries.len())
            .field("resident", &inner.resident)
            .field("max_bytes", &self.max_bytes)
            .finish()
    }
}

impl FrameCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self::with_max_bytes(config.max_bytes())
    }

    pub fn with_max_bytes(max_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            max_bytes,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Look a frame up, counting a hit or a miss and refreshing its recency.
    pub fn get_frame(&self, source: &SourceId, frame: FrameNumber) -> Option<Arc<DecodedFrame>> {
        let mut inner = self.inner.lock();
        let tick = inner.next_tick();
        let key = (source.clone(), frame);
        match inner.entries.get_mut(&key) {
            Some(entry) => {
                entry.last_access = tick;
                entry.last_access_at = Instant::now();
                entry.access_count += 1;
                let frame = Arc::clone(&entry.frame);
                inner.hits += 1;
                Some(frame)
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Store a frame, evicting least recently used entries until it fits.
    ///
    /// Returns `false` when the frame alone exceeds the budget and was not
    /// stored.
    pub fn set_frame(&self, frame: Arc<DecodedFrame>) -> bool {
        let size = frame.byte_size() as u64;
        if size > self.max_bytes {
            warn!(
                source = %frame.source_id,
                frame = frame.frame_number.0,
                bytes = size,
                max_bytes = self.max_bytes,
                "Frame larger than the whole cache, not storing"
            );
            return false;
        }

        let key = (frame.source_id.clone(), frame.frame_number);
        let mut inner = self.inner.lock();
        if let Some(old) = inner.entries.remove(&key) {
            inner.resident -= old.size;
        }
        while inner.resident + size > self.max_bytes {
            if !inner.evict_one() {
                break;
            }
        }

        let tick = inner.next_tick();
        inner.entries.insert(
            key,
            CacheEntry {
                frame,
                size,
                last_access: tick,
                last_access_at: Instant::now(),
                access_count: 0,
            },
        );
        inner.resident += size;
        inner.insertions += 1;
        true
    }

    /// Presence check that touches neither counters nor recency.
    pub fn contains(&self, source: &SourceId, frame: FrameNumber) -> bool {
        self.inner
            .lock()
            .entries
            .contains_key(&(source.clone(), frame))
    }

    /// Drop every frame of a source. Returns how many were removed.
    pub fn remove_source(&self, source: &SourceId) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        let mut freed = 0;
        inner.entries.retain(|(id, _), entry| {
            if id == source {
                freed += entry.size;
                false
            } else {
                true
            }
        });
        inner.resident -= freed;
        let removed = before - inner.entries.len();
        if removed > 0 {
            debug!(source = %source, removed, bytes = freed, "Purged source from cache");
        }
        removed
    }

    /// Drop all frames and reset the counters.
    pub fn clear(&self) {
        *self.inner.lock() = CacheInner::default();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn resident_bytes(&self) -> u64 {
        self.inner.lock().resident
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            evictions: inner.evictions,
            insertions: inner.insertions,
            resident_bytes: inner.resident,
            max_bytes: self.max_bytes,
            entries: inner.entries.len(),
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }
}
