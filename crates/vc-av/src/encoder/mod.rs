//! Encoder backends.
//!
//! A backend only knows how to map an [`EncodingPlan`] onto command lines;
//! spawning, progress and verification belong to the
//! [`EncoderDriver`](crate::driver::EncoderDriver). New backends implement
//! [`EncoderBackend`] and are appended to the driver's fallback order.

mod fallback;
mod ffmpeg;

use std::path::Path;

use vc_core::EncodingPlan;

pub use fallback::RealtimeVp9Encoder;
pub use ffmpeg::Vp9Encoder;

/// One process run within an encode attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    /// Short label for logs and error messages (e.g. "pass 1/2").
    pub label: String,
    pub args: Vec<String>,
    /// Slice of overall progress this run covers, in percent.
    pub span: (f64, f64),
}

/// Scratch locations available to a backend when building its invocations.
#[derive(Debug, Clone, Copy)]
pub struct AttemptPaths<'a> {
    pub input: &'a Path,
    /// Where the final run must write the encoded file.
    pub output: &'a Path,
    /// Prefix for any statistics files the backend needs.
    pub passlog_prefix: &'a Path,
}

/// An encoding strategy.
pub trait EncoderBackend: Send + Sync {
    /// Name recorded on the job and in logs.
    fn name(&self) -> &'static str;

    /// Registry key of the executable this backend drives.
    fn tool(&self) -> &'static str;

    /// The process runs for one attempt, in order. Each must succeed before
    /// the next starts.
    fn invocations(&self, plan: &EncodingPlan, paths: AttemptPaths<'_>) -> Vec<Invocation>;
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}
