//! Video/audio codec and container format enums.

use serde::{Deserialize, Serialize};

/// Normalized video codec identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VideoCodec {
    Avc,
    Hevc,
    Vp8,
    Vp9,
    Av1,
    ProRes,
    Mpeg4,
    Unknown,
}

impl VideoCodec {
    /// Human-readable name (for display/logging).
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Avc => "H.264/AVC",
            Self::Hevc => "H.265/HEVC",
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::Av1 => "AV1",
            Self::ProRes => "Apple ProRes",
            Self::Mpeg4 => "MPEG-4 Part 2",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// Normalized audio codec identifier.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioCodec {
    Aac,
    Mp3,
    Opus,
    Vorbis,
    Flac,
    Ac3,
    Eac3,
    Pcm,
    Unknown,
}

impl AudioCodec {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Aac => "AAC",
            Self::Mp3 => "MP3",
            Self::Opus => "Opus",
            Self::Vorbis => "Vorbis",
            Self::Flac => "FLAC",
            Self::Ac3 => "AC-3",
            Self::Eac3 => "E-AC-3",
            Self::Pcm => "PCM",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_known(self) -> bool {
        self != Self::Unknown
    }
}

/// Container format.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    /// ISO BMFF (MP4, MOV, M4V).
    Mp4,
    /// Matroska (MKV).
    Mkv,
    /// WebM (Matroska subset).
    WebM,
    /// Anything the prober could open but not classify.
    Unknown,
}

impl ContainerFormat {
    pub fn file_extensions(self) -> &'static [&'static str] {
        match self {
            Self::Mp4 => &["mp4", "m4v", "mov"],
            Self::Mkv => &["mkv"],
            Self::WebM => &["webm"],
            Self::Unknown => &[],
        }
    }

    /// Classify an ffprobe `format_name` such as `"mov,mp4,m4a,3gp,3g2,mj2"`.
    pub fn from_format_name(name: &str) -> Self {
        let name = name.to_ascii_lowercase();
        if name.contains("mp4") || name.contains("mov") {
            Self::Mp4
        } else if name.contains("webm") && !name.contains("matroska") {
            Self::WebM
        } else if name.contains("matroska") {
            Self::Mkv
        } else {
            Self::Unknown
        }
    }
}

/// Codec-string fingerprints, most specific first. The first table entry
/// with any matching substring wins.
const VIDEO_FINGERPRINTS: &[(&[&str], VideoCodec)] = &[
    (&["hvc1", "hev1", "hevc", "h265", "h.265"], VideoCodec::Hevc),
    (&["avc1", "avc3", "avc", "h264", "h.264"], VideoCodec::Avc),
    (&["vp09", "vp9"], VideoCodec::Vp9),
    (&["vp08", "vp8"], VideoCodec::Vp8),
    (&["av01", "av1"], VideoCodec::Av1),
    (&["apch", "apcn", "apcs", "apco", "ap4h", "prores"], VideoCodec::ProRes),
    (&["mp4v", "mpeg4", "xvid", "divx"], VideoCodec::Mpeg4),
];

// E-AC-3 must precede AC-3, and MP3-in-MP4 object types must precede the
// generic `mp4a` AAC match.
const AUDIO_FINGERPRINTS: &[(&[&str], AudioCodec)] = &[
    (&["eac3", "ec-3", "e-ac-3"], AudioCodec::Eac3),
    (&["ac3", "ac-3"], AudioCodec::Ac3),
    (&["mp4a.6b", "mp4a.69", "mp3", "mpeg-layer-3"], AudioCodec::Mp3),
    (&["mp4a", "aac"], AudioCodec::Aac),
    (&["opus"], AudioCodec::Opus),
    (&["vorbis"], AudioCodec::Vorbis),
    (&["flac"], AudioCodec::Flac),
    (&["pcm", "lpcm", "sowt", "twos", "ipcm"], AudioCodec::Pcm),
];

fn match_fingerprint<C: Copy>(raw: &str, table: &[(&[&str], C)], unknown: C) -> C {
    let raw = raw.trim().to_ascii_lowercase();
    if raw.is_empty() {
        return unknown;
    }
    table
        .iter()
        .find(|(patterns, _)| patterns.iter().any(|p| raw.contains(p)))
        .map_or(unknown, |(_, codec)| *codec)
}

/// Normalize a container or prober video codec string (`avc1.64001f`, `hevc`, ...).
pub fn parse_video_codec(raw: &str) -> VideoCodec {
    match_fingerprint(raw, VIDEO_FINGERPRINTS, VideoCodec::Unknown)
}

/// Normalize a container or prober audio codec string (`mp4a.40.2`, `ec-3`, ...).
pub fn parse_audio_codec(raw: &str) -> AudioCodec {
    match_fingerprint(raw, AUDIO_FINGERPRINTS, AudioCodec::Unknown)
}
