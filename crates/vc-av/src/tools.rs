//! External tool detection.
//!
//! The [`ToolRegistry`] resolves where the encoder, the probe and the
//! fallback encoder live. Configured paths win over `PATH` lookup and are
//! kept even if they do not exist, so a misconfigured encoder surfaces as a
//! spawn failure (and triggers the fallback) instead of silently running some
//! other binary.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use vc_core::config::ToolsConfig;

/// Registry key for the primary encoder.
pub const FFMPEG: &str = "ffmpeg";
/// Registry key for the media probe.
pub const FFPROBE: &str = "ffprobe";
/// Registry key for the binary driven by the fallback encoder.
pub const FALLBACK_ENCODER: &str = "fallback-encoder";

const KNOWN_TOOLS: &[&str] = &[FFMPEG, FFPROBE, FALLBACK_ENCODER];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the executable exists.
    pub available: bool,
    /// Version string (first line of `-version` output), if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding resolved tool locations.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<&'static str, PathBuf>,
}

impl ToolRegistry {
    /// Resolve tool locations from config, falling back to `PATH`.
    ///
    /// The fallback encoder defaults to whatever ffmpeg `PATH` lookup finds,
    /// independent of a configured primary path.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        let on_path = |name: &str| which::which(name).ok();

        let resolved = [
            (FFMPEG, config.ffmpeg_path.clone().or_else(|| on_path("ffmpeg"))),
            (FFPROBE, config.ffprobe_path.clone().or_else(|| on_path("ffprobe"))),
            (
                FALLBACK_ENCODER,
                config
                    .fallback_encoder_path
                    .clone()
                    .or_else(|| on_path("ffmpeg")),
            ),
        ];

        for (name, path) in resolved {
            if let Some(path) = path {
                tools.insert(name, path);
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths.
    pub fn with_paths(paths: impl IntoIterator<Item = (&'static str, PathBuf)>) -> Self {
        Self {
            tools: paths.into_iter().collect(),
        }
    }

    /// Path for the given tool.
    ///
    /// # Errors
    ///
    /// Returns [`vc_core::Error::Spawn`] if the tool was not resolved, which
    /// the encoder driver treats like any other failure to start.
    pub fn require(&self, name: &str) -> vc_core::Result<&Path> {
        self.tools.get(name).map(PathBuf::as_path).ok_or_else(|| {
            vc_core::Error::spawn(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Whether the tool resolved to an existing file.
    pub fn is_available(&self, name: &str) -> bool {
        self.tools.get(name).is_some_and(|p| p.exists())
    }

    /// Check all known tools, including their versions.
    ///
    /// Runs each binary with `-version`; call from blocking contexts only.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) if path.exists() => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                other => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: other.cloned(),
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
