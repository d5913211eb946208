//! Upload and output directories.
//!
//! Inputs live at `<upload_dir>/<id>_<name>` and outputs at
//! `<output_dir>/<id>_<stem>.webm`. Uploads are streamed into a hidden
//! temporary file first and only get their final name once a job exists.

use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use vc_core::config::StorageConfig;
use vc_core::ConversionId;

/// Filesystem layout for job files.
#[derive(Debug, Clone)]
pub struct Storage {
    upload_dir: PathBuf,
    output_dir: PathBuf,
}

impl Storage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            output_dir: config.output_dir.clone(),
        }
    }

    /// Create both directories if missing.
    ///
    /// The two must resolve to different directories: an upload named
    /// `clip.webm` would otherwise share its path with its own output.
    pub fn ensure_dirs(&self) -> vc_core::Result<()> {
        for dir in [&self.upload_dir, &self.output_dir] {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
                tracing::info!("Created directory {}", dir.display());
            }
        }
        if std::fs::canonicalize(&self.upload_dir)? == std::fs::canonicalize(&self.output_dir)? {
            return Err(vc_core::Error::validation(
                "storage",
                format!(
                    "upload_dir and output_dir must differ (both resolve to {})",
                    self.output_dir.display()
                ),
            ));
        }
        Ok(())
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// A temporary file in the upload directory to stream an upload into.
    /// It is deleted on drop unless persisted.
    pub fn stage_upload(&self) -> vc_core::Result<NamedTempFile> {
        Ok(tempfile::Builder::new()
            .prefix(".upload-")
            .tempfile_in(&self.upload_dir)?)
    }

    pub fn input_path(&self, id: ConversionId, original_name: &str) -> PathBuf {
        self.upload_dir
            .join(format!("{id}_{}", sanitize_filename(original_name)))
    }

    pub fn output_path(&self, id: ConversionId, original_name: &str) -> PathBuf {
        let safe = sanitize_filename(original_name);
        let stem = Path::new(&safe)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video".to_string());
        self.output_dir.join(format!("{id}_{stem}.webm"))
    }
}

/// Delete a job file, ignoring files that are already gone.
pub fn remove_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {e}", path.display()),
    }
}

/// Reduce a client-supplied file name to a safe single path component.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
