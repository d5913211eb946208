//! Application configuration types.
//!
//! The top-level [`Config`] is deserialized from JSON. Every section has
//! sensible defaults so an empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub tools: ToolsConfig,
    pub conversion: ConversionConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str)
            .map_err(|e| Error::validation("config", format!("config parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None` or the file does not exist.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0; a random port will be assigned".into());
        }

        if self.server.max_upload_bytes == 0 {
            warnings.push("server.max_upload_bytes is 0; every upload will be rejected".into());
        }

        if self.storage.upload_dir == self.storage.output_dir {
            warnings.push(format!(
                "storage.upload_dir and storage.output_dir are both {}; they must differ or the server will not start",
                self.storage.upload_dir.display()
            ));
        }

        if self.storage.retention_secs == Some(0) {
            warnings.push(
                "storage.retention_secs is 0; finished conversions are removed almost immediately"
                    .into(),
            );
        }

        for (name, path) in [
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
            ("tools.fallback_encoder_path", &self.tools.fallback_encoder_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!("{name} {} does not exist", p.display()));
                }
            }
        }

        if self.conversion.supported_extensions.is_empty() {
            warnings.push("conversion.supported_extensions is empty; every upload will be rejected".into());
        }

        for ext in &self.conversion.supported_extensions {
            if !ext.starts_with('.') {
                warnings.push(format!(
                    "conversion.supported_extensions entry '{ext}' should start with '.'"
                ));
            }
        }

        if self.conversion.diagnostic_tail_lines == 0 {
            warnings.push(
                "conversion.diagnostic_tail_lines is 0; encoder failures will carry no diagnostics"
                    .into(),
            );
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Upper bound on a single request body (the uploaded file plus settings).
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 5001,
            max_upload_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Scratch directories for uploaded inputs and produced outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub upload_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Keep the uploaded input after the job reaches a terminal state.
    pub keep_inputs: bool,
    /// Age after which terminal jobs and their files are swept.
    /// `None` leaves cleanup to an external process.
    pub retention_secs: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            keep_inputs: false,
            retention_secs: None,
        }
    }
}

/// Paths to external tools.
///
/// An explicitly configured encoder path is used as-is; PATH discovery only
/// applies when the field is unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// Binary used by the fallback encoder. Defaults to the ffmpeg found on PATH.
    pub fallback_encoder_path: Option<PathBuf>,
}

/// Conversion behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    /// Accepted upload extensions, lowercase with a leading dot.
    pub supported_extensions: Vec<String>,
    /// Number of non-progress encoder output lines kept for error messages.
    pub diagnostic_tail_lines: usize,
    pub fallback_enabled: bool,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            supported_extensions: [".mp4", ".avi", ".mov", ".mkv", ".wmv", ".flv", ".webm"]
                .into_iter()
                .map(String::from)
                .collect(),
            diagnostic_tail_lines: 20,
            fallback_enabled: true,
        }
    }
}

impl ConversionConfig {
    /// Whether a file name carries one of the accepted extensions.
    pub fn accepts(&self, file_name: &str) -> bool {
        let Some(ext) = Path::new(file_name).extension() else {
            return false;
        };
        let ext = format!(".{}", ext.to_string_lossy().to_ascii_lowercase());
        self.supported_extensions
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&ext))
    }
}
