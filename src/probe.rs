//! Media probing
//!
//! [`MediaProber`] is the seam between the scanner and whatever inspects
//! media files. [`FfprobeProber`] shells out to `ffprobe` once per file.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::MetadataMode;
use crate::error::ProbeError;
use crate::models::{AudioInfo, MediaMetadata, VideoInfo};

/// Extracts metadata from a single media file
pub trait MediaProber: Send + Sync {
    fn probe(&self, path: &Path) -> Result<MediaMetadata, ProbeError>;
}

/// Prober backed by the `ffprobe` executable
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    executable: PathBuf,
    mode: MetadataMode,
}

impl FfprobeProber {
    pub fn new(executable: impl Into<PathBuf>, mode: MetadataMode) -> Self {
        Self {
            executable: executable.into(),
            mode,
        }
    }

    fn command(&self, path: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(["-v", "error", "-print_format", "json", "-show_format"]);
        if self.mode == MetadataMode::Full {
            cmd.arg("-show_streams");
        }
        cmd.arg(path);
        cmd
    }
}

impl MediaProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<MediaMetadata, ProbeError> {
        let output = self.command(path).output().map_err(ProbeError::Spawn)?;
        if !output.status.success() {
            return Err(ProbeError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_ffprobe_output(&output.stdout, self.mode)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    channels: Option<u32>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

/// Parse `ffprobe -print_format json` output into metadata for `mode`
pub fn parse_ffprobe_output(
    stdout: &[u8],
    mode: MetadataMode,
) -> Result<MediaMetadata, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_slice(stdout)?;

    let duration = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .and_then(parse_number)
        .or_else(|| {
            parsed
                .streams
                .iter()
                .filter_map(|s| s.duration.as_deref().and_then(parse_number))
                .reduce(f64::max)
        })
        .ok_or(ProbeError::MissingDuration)?;

    if mode != MetadataMode::Full {
        return Ok(MediaMetadata::with_duration(duration));
    }

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .map(|s| VideoInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            width: s.width.unwrap_or(0),
            height: s.height.unwrap_or(0),
            fps: s
                .avg_frame_rate
                .as_deref()
                .and_then(parse_rational)
                .or_else(|| s.r_frame_rate.as_deref().and_then(parse_rational))
                .unwrap_or(0.0),
        });

    let audio = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
        .map(|s| AudioInfo {
            codec: s.codec_name.clone().unwrap_or_default(),
            channels: s.channels.unwrap_or(0),
            sample_rate: s
                .sample_rate
                .as_deref()
                .and_then(|r| r.parse().ok())
                .unwrap_or(0),
        });

    Ok(MediaMetadata {
        duration,
        video,
        audio,
    })
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|d| d.is_finite())
}

/// Parse an ffprobe frame rate such as "24000/1001"
fn parse_rational(s: &str) -> Option<f64> {
    let (num, den) = match s.split_once('/') {
        Some((num, den)) => (num.parse::<f64>().ok()?, den.parse::<f64>().ok()?),
        None => (s.parse::<f64>().ok()?, 1.0),
    };
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}
