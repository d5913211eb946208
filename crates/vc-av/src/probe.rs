//! Input probing via ffprobe.
//!
//! Only what progress reporting needs is extracted: duration, source frame
//! rate and frame count.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use vc_core::{EncodingPlan, FrameRate};

use crate::command::ToolCommand;
use crate::tools::{ToolRegistry, FFPROBE};

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// What we know about an input before encoding it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaProbe {
    pub duration_secs: Option<f64>,
    pub frame_rate: Option<f64>,
    pub frame_count: Option<u64>,
}

impl MediaProbe {
    /// Number of frames the encoder is expected to emit for this plan.
    pub fn expected_frames(&self, plan: &EncodingPlan) -> Option<u64> {
        match (plan.frame_rate, self.duration_secs) {
            (FrameRate::Fixed(fps), Some(d)) if d > 0.0 => Some((d * fps as f64).round() as u64),
            (FrameRate::Fixed(_), _) => None,
            (FrameRate::Source, duration) => self.frame_count.or_else(|| {
                let fps = self.frame_rate?;
                let d = duration?;
                (d > 0.0 && fps > 0.0).then(|| (d * fps).round() as u64)
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    duration: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe a file with ffprobe.
///
/// # Errors
///
/// Returns [`vc_core::Error::Tool`] if ffprobe is missing, fails, or prints
/// something that is not ffprobe JSON.
pub async fn probe(tools: &ToolRegistry, input: &Path) -> vc_core::Result<MediaProbe> {
    let ffprobe = tools
        .require(FFPROBE)
        .map_err(|e| vc_core::Error::tool(FFPROBE, e.to_string()))?;

    let output = ToolCommand::new(ffprobe.to_path_buf())
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(input.to_string_lossy())
        .timeout(PROBE_TIMEOUT)
        .execute()
        .await?;

    parse_ffprobe_json(&output.stdout)
}

/// Parse `ffprobe -print_format json -show_format -show_streams` output.
pub fn parse_ffprobe_json(json: &str) -> vc_core::Result<MediaProbe> {
    let parsed: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| vc_core::Error::tool(FFPROBE, format!("unparseable output: {e}")))?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    let positive = |s: &Option<String>| {
        s.as_deref()
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
    };

    let duration_secs = video
        .and_then(|v| positive(&v.duration))
        .or_else(|| parsed.streams.iter().find_map(|s| positive(&s.duration)))
        .or_else(|| parsed.format.as_ref().and_then(|f| positive(&f.duration)));

    let frame_rate = video.and_then(|v| {
        v.avg_frame_rate
            .as_deref()
            .and_then(parse_rational)
            .or_else(|| v.r_frame_rate.as_deref().and_then(parse_rational))
    });

    let frame_count = video
        .and_then(|v| v.nb_frames.as_deref())
        .and_then(|n| n.trim().parse::<u64>().ok())
        .filter(|n| *n > 0);

    Ok(MediaProbe {
        duration_secs,
        frame_rate,
        frame_count,
    })
}

/// Parse an ffprobe rational like `30000/1001`. `0/0` yields `None`.
fn parse_rational(s: &str) -> Option<f64> {
    let value = match s.split_once('/') {
        Some((n, d)) => {
            let n = n.trim().parse::<f64>().ok()?;
            let d = d.trim().parse::<f64>().ok()?;
            if d == 0.0 {
                return None;
            }
            n / d
        }
        None => s.trim().parse::<f64>().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}
