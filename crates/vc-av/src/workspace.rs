//! Per-attempt scratch space for encoder runs.
//!
//! Each encode attempt writes into its own temporary directory created next
//! to the final output location. Only a verified, non-empty result is moved
//! into place; dropping the workspace removes partial output and two-pass
//! statistics files.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

const OUTPUT_NAME: &str = "output.webm";
const PASSLOG_PREFIX: &str = "passlog";

/// Scratch directory for one encode attempt.
#[derive(Debug)]
pub struct AttemptWorkspace {
    temp_dir: TempDir,
}

impl AttemptWorkspace {
    /// Create a scratch directory inside `parent` (which must exist).
    pub fn new(parent: &Path, label: &str) -> vc_core::Result<Self> {
        let temp_dir = tempfile::Builder::new()
            .prefix(&format!(".{label}-"))
            .tempdir_in(parent)
            .map_err(|e| {
                vc_core::Error::Internal(format!(
                    "failed to create scratch dir in {}: {e}",
                    parent.display()
                ))
            })?;
        Ok(Self { temp_dir })
    }

    /// Path to the scratch directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Where the encoder should write its output.
    pub fn output(&self) -> PathBuf {
        self.temp_dir.path().join(OUTPUT_NAME)
    }

    /// Prefix for two-pass statistics files.
    pub fn passlog_prefix(&self) -> PathBuf {
        self.temp_dir.path().join(PASSLOG_PREFIX)
    }

    /// Size of the produced output, zero if absent.
    pub fn output_size(&self) -> u64 {
        std::fs::metadata(self.output())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Move a non-empty output to `dest` and return its size.
    ///
    /// # Errors
    ///
    /// Returns [`vc_core::Error::Encode`] naming `backend` if the output is
    /// absent or empty, or [`vc_core::Error::Io`] if it cannot be moved.
    pub fn persist(self, dest: &Path, backend: &str) -> vc_core::Result<u64> {
        let output = self.output();
        let size = self.output_size();
        if size == 0 {
            return Err(vc_core::Error::encode(
                backend,
                "encoder exited successfully but produced no output",
            ));
        }

        // Rename within the same filesystem; copy if that fails.
        if std::fs::rename(&output, dest).is_err() {
            std::fs::copy(&output, dest)?;
        }

        Ok(size)
    }
}
