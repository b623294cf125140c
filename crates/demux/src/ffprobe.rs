//! `ffprobe`-backed prober.
//!
//! Runs `ffprobe -v quiet -print_format json -show_format -show_streams`
//! and maps the first video and first audio stream into a [`ProbeResult`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, warn};

use fp_common::{
    parse_audio_codec, parse_video_codec, AudioTrackInfo, ContainerFormat, DecodePath,
    ProbeError, ProbeResult, Rational, Resolution, VideoTrackInfo,
};

use crate::probe::detect_format;
use crate::traits::{MediaInput, MediaProber};

/// Frame rate assumed when the stream does not report a usable one.
const DEFAULT_FPS: Rational = Rational::FPS_30;

/// Upper bound on a single ffprobe invocation.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    codec_tag_string: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

impl FfprobeStream {
    fn is(&self, kind: &str) -> bool {
        self.codec_type.as_deref() == Some(kind)
    }

    /// Codec string preferring the container tag (`avc1`) over the decoder name.
    fn codec_string(&self) -> String {
        match (self.codec_tag_string.as_deref(), self.codec_name.as_deref()) {
            // ffprobe prints "[0][0][0][0]" for untagged streams.
            (Some(tag), Some(name)) if tag.starts_with('[') => name.to_string(),
            (Some(tag), Some(name)) => format!("{tag} {name}"),
            (None, Some(name)) => name.to_string(),
            (Some(tag), None) => tag.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Parse `"30000/1001"`-style frame rates. `None` when malformed or zero.
pub fn parse_frame_rate(raw: &str) -> Option<Rational> {
    let (num, den) = raw.trim().split_once('/')?;
    let num: u32 = num.trim().parse().ok()?;
    let den: u32 = den.trim().parse().ok()?;
    Rational::new(num, den)
}

fn parse_secs(raw: Option<&str>) -> Option<f64> {
    raw?.trim().parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Map ffprobe JSON output to a [`ProbeResult`].
///
/// A video stream is required; the first audio stream is optional.
/// `container_hint` is used when ffprobe does not report a format name.
pub fn parse_ffprobe_output(
    json: &str,
    container_hint: Option<ContainerFormat>,
) -> Result<ProbeResult, ProbeError> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| ProbeError::InvalidOutput(e.to_string()))?;
    let format = output.format.unwrap_or_default();

    let video_stream = output
        .streams
        .iter()
        .find(|s| s.is("video"))
        .ok_or(ProbeError::NoVideoTrack)?;
    let audio_stream = output.streams.iter().find(|s| s.is("audio"));

    let frame_rate = video_stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.avg_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(DEFAULT_FPS);

    let codec_string = video_stream.codec_string();
    let video = VideoTrackInfo {
        codec: parse_video_codec(&codec_string),
        codec_string,
        resolution: Resolution::new(
            video_stream.width.unwrap_or(0),
            video_stream.height.unwrap_or(0),
        ),
        frame_rate,
        decode_path: DecodePath::SoftwareFallback,
    };

    let audio = audio_stream.map(|s| {
        let codec_string = s.codec_string();
        AudioTrackInfo {
            codec: parse_audio_codec(&codec_string),
            codec_string,
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|r| r.trim().parse().ok())
                .unwrap_or(0),
            channels: s.channels.unwrap_or(0),
            decode_path: DecodePath::SoftwareFallback,
        }
    });

    let duration_secs = parse_secs(format.duration.as_deref())
        .or_else(|| parse_secs(video_stream.duration.as_deref()))
        .unwrap_or(0.0);

    let container = format
        .format_name
        .as_deref()
        .map(ContainerFormat::from_format_name)
        .filter(|c| *c != ContainerFormat::Unknown)
        .or(container_hint)
        .unwrap_or(ContainerFormat::Unknown);

    Ok(ProbeResult {
        container,
        duration_ms: duration_secs * 1000.0,
        bitrate: format
            .bit_rate
            .as_deref()
            .and_then(|b| b.trim().parse().ok())
            .unwrap_or(0),
        video: Some(video),
        audio,
    })
}

/// Prober that shells out to an `ffprobe` binary.
#[derive(Clone, Debug)]
pub struct FfprobeProber {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl FfprobeProber {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MediaProber for FfprobeProber {
    async fn probe(&self, input: &MediaInput) -> Result<ProbeResult, ProbeError> {
        let location = input.location();
        let hint = input.path().and_then(|p| detect_format(p).ok());

        let child = Command::new(&self.binary)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(&location)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ProbeError::TimedOut(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(input = %location, status = ?output.status, "ffprobe failed");
            return Err(ProbeError::Failed(format!("ffprobe failed: {}", stderr.trim())));
        }

        let json = String::from_utf8_lossy(&output.stdout);
        let result = parse_ffprobe_output(&json, hint)?;
        debug!(input = %location, container = ?result.container, "Probed media");
        Ok(result)
    }
}
