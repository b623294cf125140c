//! Codec capability resolution.
//!
//! Maps a normalized codec to the backend that should decode it, given what
//! the platform decode API exposes at runtime. Results are memoized per
//! codec for the lifetime of the resolver.

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use fp_common::{AudioCodec, DecodePath, ProbeResult, VideoCodec};

pub use fp_common::{parse_audio_codec, parse_video_codec};

/// Codecs the platform's fast decode API can handle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RuntimeCapabilities {
    pub native_video: HashSet<VideoCodec>,
    pub native_audio: HashSet<AudioCodec>,
}

impl RuntimeCapabilities {
    /// No fast path at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_video(mut self, codecs: impl IntoIterator<Item = VideoCodec>) -> Self {
        self.native_video.extend(codecs);
        self
    }

    pub fn with_audio(mut self, codecs: impl IntoIterator<Item = AudioCodec>) -> Self {
        self.native_audio.extend(codecs);
        self
    }

    pub fn supports_video(&self, codec: VideoCodec) -> bool {
        codec.is_known() && self.native_video.contains(&codec)
    }

    pub fn supports_audio(&self, codec: AudioCodec) -> bool {
        codec.is_known() && self.native_audio.contains(&codec)
    }
}

/// Memoizing codec → [`DecodePath`] resolver.
///
/// One resolver is shared by the source manager; it is `Sync` and cheap to
/// query after the first lookup of each codec.
#[derive(Debug)]
pub struct CodecResolver {
    capabilities: RuntimeCapabilities,
    allow_software_fallback: bool,
    video: RwLock<HashMap<VideoCodec, DecodePath>>,
    audio: RwLock<HashMap<AudioCodec, DecodePath>>,
}

impl CodecResolver {
    pub fn new(capabilities: RuntimeCapabilities, allow_software_fallback: bool) -> Self {
        Self {
            capabilities,
            allow_software_fallback,
            video: RwLock::new(HashMap::new()),
            audio: RwLock::new(HashMap::new()),
        }
    }

    pub fn capabilities(&self) -> &RuntimeCapabilities {
        &self.capabilities
    }

    pub fn allows_software_fallback(&self) -> bool {
        self.allow_software_fallback
    }

    fn fallback(&self) -> DecodePath {
        if self.allow_software_fallback {
            DecodePath::SoftwareFallback
        } else {
            DecodePath::Unsupported
        }
    }

    pub fn resolve_video(&self, codec: VideoCodec) -> DecodePath {
        if let Some(path) = self.video.read().get(&codec) {
            return *path;
        }
        let path = if self.capabilities.supports_video(codec) {
            DecodePath::FastNative
        } else {
            self.fallback()
        };
        debug!(codec = ?codec, path = %path, "Resolved video decode path");
        *self.video.write().entry(codec).or_insert(path)
    }

    pub fn resolve_audio(&self, codec: AudioCodec) -> DecodePath {
        if let Some(path) = self.audio.read().get(&codec) {
            return *path;
        }
        let path = if self.capabilities.supports_audio(codec) {
            DecodePath::FastNative
        } else {
            self.fallback()
        };
        debug!(codec = ?codec, path = %path, "Resolved audio decode path");
        *self.audio.write().entry(codec).or_insert(path)
    }

    /// Fill in the recommended decode path of every track in a probe result.
    pub fn annotate(&self, probe: &mut ProbeResult) {
        if let Some(video) = probe.video.as_mut() {
            video.decode_path = self.resolve_video(video.codec);
        }
        if let Some(audio) = probe.audio.as_mut() {
            audio.decode_path = self.resolve_audio(audio.codec);
        }
    }

    /// Number of memoized codec decisions.
    pub fn memoized(&self) -> usize {
        self.video.read().len() + self.audio.read().len()
    }
}
