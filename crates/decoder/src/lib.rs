//! `fp-decoder` — Hybrid decode, frame cache, prefetch and texture import.
//!
//! Turns a media source into GPU-ready frames. Each source is decoded by
//! one of two backends: the platform's fast native decode API when the
//! codec allows it, or a software path that seeks a playback surface and
//! captures what it shows. Decoded frames land in a shared byte-bounded
//! cache, a prefetcher keeps the cache warm around the playhead, and the
//! texture importer moves frames into pooled GPU textures.
//!
//! # Architecture
//!
//! ```text
//!   update_playhead ──► FramePrefetcher ──► MediaSourceManager ──► Decoder
//!                                               │     ▲             (native | software)
//!   renderer ── get_video_frame_by_number ─────►│     │
//!                                               ▼     │
//!                                             FrameCache
//!   renderer ── TextureImporter::import(frame) ──► GpuBackend
//! ```
//!
//! ## Module Overview
//!
//! - [`capability`] — Codec → decode path resolution (memoized)
//! - [`backend`] — The two decoder backends behind one trait
//!   - [`backend::native`] — Platform decode API with output correlation
//!   - [`backend::software`] — Seek-and-capture on a playback surface
//! - [`cache`] — LRU frame cache with a byte budget
//! - [`prefetch`] — Priority-ordered frame prefetching around the playhead
//! - [`source`] — Source lifecycle, decode strategy and fallback
//! - [`texture`] — Pooled GPU texture import
//! - [`convert`] — CPU pixel format conversion
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use fp_common::{FrameNumber, PipelineConfig};
//! use fp_decoder::{FrameCache, FramePrefetcher, MediaSourceManager, OpenOptions};
//! use fp_demux::MediaInput;
//!
//! let config = PipelineConfig::default();
//! let cache = Arc::new(FrameCache::new(&config.cache));
//! let manager = Arc::new(MediaSourceManager::new(backend, cache, config.sources));
//! let prefetcher = FramePrefetcher::new(config.prefetch, manager.clone());
//!
//! let id = manager.open(MediaInput::File("clip.mp4".into()), OpenOptions::default()).await?;
//! prefetcher.update_playhead(&id, FrameNumber(0));
//! let frame = manager.get_video_frame_by_number(&id, FrameNumber(0)).await?;
//! ```

pub mod backend;
pub mod cache;
pub mod capability;
pub mod convert;
pub mod prefetch;
pub mod source;
pub mod texture;

pub use backend::{
    AudioEngine, Decoder, DecoderBackend, DecoderState, EngineOutput, EngineSink, NativeDecoder,
    NativeEngine, PlaybackSurface, SoftwareDecoder, VideoEngine,
};
pub use cache::{CacheStats, FrameCache};
pub use capability::{CodecResolver, RuntimeCapabilities};
pub use prefetch::{
    priority_for_distance, FrameFetcher, FramePrefetcher, PlaybackDirection, PrefetchCallback,
    PrefetchPriority, PrefetchStats,
};
pub use source::{ChunkSource, MediaBackend, MediaSourceManager, OpenOptions, SourceState};
pub use texture::{ImportedTexture, TextureImporter, TexturePoolStats};
