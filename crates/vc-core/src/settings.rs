//! Settings resolution: turn the client's settings object into an
//! [`EncodingPlan`].
//!
//! Named presets map to a fixed parameter set and ignore every other field.
//! The `custom` preset validates each supplied field against its domain and
//! fills the rest with defaults. Unknown fields are rejected outright.

use std::fmt;
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::Result;
use crate::Error;

/// Valid range for the constant-quality knob (libvpx CRF scale).
pub const QUALITY_RANGE: RangeInclusive<i64> = 0..=63;

/// Valid range for an explicit output frame rate.
pub const FRAME_RATE_RANGE: RangeInclusive<i64> = 1..=240;

/// Output resolutions a client may request besides `original`.
pub const RESOLUTIONS: &[(u32, u32)] = &[(1920, 1080), (1280, 720), (854, 480)];

const CUSTOM_DEFAULT_QUALITY: u8 = 32;
const CUSTOM_DEFAULT_BITRATE_KBPS: u32 = 1000;

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// The closed set of preset names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PresetName {
    WebStandard,
    HighQuality,
    MaxCompression,
    Custom,
}

impl PresetName {
    pub const ALL: [PresetName; 4] = [
        PresetName::WebStandard,
        PresetName::HighQuality,
        PresetName::MaxCompression,
        PresetName::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PresetName::WebStandard => "web-standard",
            PresetName::HighQuality => "high-quality",
            PresetName::MaxCompression => "max-compression",
            PresetName::Custom => "custom",
        }
    }

    /// Parse a preset name as sent by clients.
    pub fn parse(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == name)
            .ok_or_else(|| {
                let valid: Vec<&str> = Self::ALL.iter().map(|p| p.as_str()).collect();
                Error::validation(
                    "preset",
                    format!("unknown preset '{name}' (valid: {})", valid.join(", ")),
                )
            })
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output frame size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Keep the source dimensions.
    Source,
    Fixed { width: u32, height: u32 },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Source => f.write_str("original"),
            Resolution::Fixed { width, height } => write!(f, "{width}x{height}"),
        }
    }
}

impl Serialize for Resolution {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Output frame rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameRate {
    /// Keep the source frame rate.
    Source,
    Fixed(u32),
}

impl Serialize for FrameRate {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            FrameRate::Source => serializer.serialize_str("original"),
            FrameRate::Fixed(fps) => serializer.serialize_u32(*fps),
        }
    }
}

/// Fully resolved, immutable encoder parameters for one job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingPlan {
    pub preset: PresetName,
    pub quality: u8,
    pub target_bitrate_kbps: u32,
    pub resolution: Resolution,
    pub frame_rate: FrameRate,
    pub two_pass: bool,
}

impl EncodingPlan {
    /// The fixed parameter set for a named preset. `None` for `custom`.
    pub fn for_preset(preset: PresetName) -> Option<Self> {
        let plan = match preset {
            PresetName::WebStandard => Self {
                preset,
                quality: 32,
                target_bitrate_kbps: 2000,
                resolution: Resolution::Source,
                frame_rate: FrameRate::Source,
                two_pass: false,
            },
            PresetName::HighQuality => Self {
                preset,
                quality: 18,
                target_bitrate_kbps: 4000,
                resolution: Resolution::Fixed {
                    width: 1920,
                    height: 1080,
                },
                frame_rate: FrameRate::Fixed(30),
                two_pass: true,
            },
            PresetName::MaxCompression => Self {
                preset,
                quality: 45,
                target_bitrate_kbps: 1000,
                resolution: Resolution::Fixed {
                    width: 854,
                    height: 480,
                },
                frame_rate: FrameRate::Fixed(24),
                two_pass: true,
            },
            PresetName::Custom => return None,
        };
        Some(plan)
    }
}

// ---------------------------------------------------------------------------
// Raw settings
// ---------------------------------------------------------------------------

/// A scalar as clients send it: browsers' form code produces both numbers and
/// numeric strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    fn as_integer(&self, field: &str) -> Result<i64> {
        match self {
            RawValue::Int(n) => Ok(*n),
            RawValue::Float(f) if f.fract() == 0.0 && f.is_finite() => Ok(*f as i64),
            RawValue::Float(f) => Err(Error::validation(
                field,
                format!("{field} must be a whole number (got {f})"),
            )),
            RawValue::Text(s) => s.trim().parse::<i64>().map_err(|_| {
                Error::validation(field, format!("{field} must be a whole number (got '{s}')"))
            }),
        }
    }
}

/// The settings object exactly as received, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawSettings {
    pub preset: Option<String>,
    pub quality: Option<RawValue>,
    pub bitrate: Option<RawValue>,
    pub two_pass: Option<bool>,
    pub resolution: Option<String>,
    pub frame_rate: Option<RawValue>,
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Resolve raw settings into an [`EncodingPlan`].
///
/// A missing preset means `web-standard`.
pub fn resolve(raw: &RawSettings) -> Result<EncodingPlan> {
    let preset = match raw.preset.as_deref() {
        None => PresetName::WebStandard,
        Some(name) => PresetName::parse(name)?,
    };

    if let Some(plan) = EncodingPlan::for_preset(preset) {
        return Ok(plan);
    }

    let quality = match &raw.quality {
        None => CUSTOM_DEFAULT_QUALITY,
        Some(v) => {
            let q = v.as_integer("quality")?;
            if !QUALITY_RANGE.contains(&q) {
                return Err(Error::validation(
                    "quality",
                    format!(
                        "quality must be between {} and {} (got {q})",
                        QUALITY_RANGE.start(),
                        QUALITY_RANGE.end()
                    ),
                ));
            }
            q as u8
        }
    };

    let target_bitrate_kbps = match &raw.bitrate {
        None => CUSTOM_DEFAULT_BITRATE_KBPS,
        Some(v) => {
            let b = v.as_integer("bitrate")?;
            u32::try_from(b).ok().filter(|b| *b > 0).ok_or_else(|| {
                Error::validation(
                    "bitrate",
                    format!("bitrate must be a positive number of kbps (got {b})"),
                )
            })?
        }
    };

    let resolution = match raw.resolution.as_deref() {
        None => Resolution::Source,
        Some(s) => parse_resolution(s)?,
    };

    let frame_rate = match &raw.frame_rate {
        None => FrameRate::Source,
        Some(RawValue::Text(s)) if s.trim().eq_ignore_ascii_case("original") => FrameRate::Source,
        Some(v) => {
            let r = v.as_integer("frameRate")?;
            if !FRAME_RATE_RANGE.contains(&r) {
                return Err(Error::validation(
                    "frameRate",
                    format!(
                        "frameRate must be between {} and {} (got {r})",
                        FRAME_RATE_RANGE.start(),
                        FRAME_RATE_RANGE.end()
                    ),
                ));
            }
            FrameRate::Fixed(r as u32)
        }
    };

    Ok(EncodingPlan {
        preset,
        quality,
        target_bitrate_kbps,
        resolution,
        frame_rate,
        two_pass: raw.two_pass.unwrap_or(false),
    })
}

/// Resolve settings straight from the JSON text of the multipart field.
///
/// Blank input is treated as `{}`.
pub fn resolve_json(json: &str) -> Result<EncodingPlan> {
    let trimmed = json.trim();
    if trimmed.is_empty() {
        return resolve(&RawSettings::default());
    }
    let raw: RawSettings = serde_json::from_str(trimmed)
        .map_err(|e| Error::validation("settings", format!("invalid settings: {e}")))?;
    resolve(&raw)
}

fn parse_resolution(s: &str) -> Result<Resolution> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("original") {
        return Ok(Resolution::Source);
    }
    let parsed = s.split_once('x').and_then(|(w, h)| {
        Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?))
    });
    match parsed {
        Some((width, height)) if RESOLUTIONS.contains(&(width, height)) => {
            Ok(Resolution::Fixed { width, height })
        }
        _ => {
            let valid: Vec<String> = std::iter::once("original".to_string())
                .chain(RESOLUTIONS.iter().map(|(w, h)| format!("{w}x{h}")))
                .collect();
            Err(Error::validation(
                "resolution",
                format!("unsupported resolution '{s}' (valid: {})", valid.join(", ")),
            ))
        }
    }
}
