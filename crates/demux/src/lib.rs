//! `fp-demux` — Container detection and media probing.
//!
//! Turns a media input into a [`ProbeResult`](fp_common::ProbeResult):
//! container format, duration, bitrate and the first video/audio track.
//! The decode path of each track is left for the capability resolver.

pub mod ffprobe;
pub mod probe;
pub mod traits;

pub use ffprobe::{parse_ffprobe_output, FfprobeProber};
pub use probe::{detect_format, detect_format_from_magic};
pub use traits::{MediaInput, MediaProber};
