//! The encoder driver: runs backends as child processes in a fixed fallback
//! order and streams their progress.
//!
//! For every attempt the driver creates a scratch workspace, runs each of the
//! backend's invocations in sequence while parsing stderr, and moves the
//! result into place only when the final run exited zero and left a
//! non-empty file. A failed attempt (spawn failure, non-zero exit, missing
//! output) moves on to the next backend; cancellation does not.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;

use futures::StreamExt;
use tokio::process::Child;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use vc_core::config::ConversionConfig;
use vc_core::{ConversionId, EncodingPlan, Error};

use crate::command::ToolCommand;
use crate::encoder::{AttemptPaths, EncoderBackend, Invocation, RealtimeVp9Encoder, Vp9Encoder};
use crate::probe::MediaProbe;
use crate::progress::{parse_line, ProgressTracker, ProgressUpdate, StatusLineCodec};
use crate::tools::ToolRegistry;
use crate::workspace::AttemptWorkspace;

/// Everything the driver needs to know about one conversion.
#[derive(Debug, Clone, Copy)]
pub struct EncodeRequest<'a> {
    pub id: ConversionId,
    pub plan: &'a EncodingPlan,
    pub input: &'a Path,
    /// Final location of the encoded file. Its directory must exist.
    pub output: &'a Path,
    pub probe: &'a MediaProbe,
}

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSummary {
    pub backend: &'static str,
    pub output_size: u64,
    /// Whether a backend other than the first produced the output.
    pub fallback_used: bool,
}

/// Last N non-progress lines of encoder output.
#[derive(Debug)]
struct DiagnosticTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl DiagnosticTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    fn render(&self) -> String {
        if self.lines.is_empty() {
            return "no diagnostic output".to_string();
        }
        self.lines.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Runs encoder backends in order until one succeeds.
#[derive(Clone)]
pub struct EncoderDriver {
    tools: Arc<ToolRegistry>,
    backends: Vec<Arc<dyn EncoderBackend>>,
    diagnostic_tail: usize,
}

impl EncoderDriver {
    pub fn new(
        tools: Arc<ToolRegistry>,
        backends: Vec<Arc<dyn EncoderBackend>>,
        diagnostic_tail: usize,
    ) -> Self {
        Self {
            tools,
            backends,
            diagnostic_tail,
        }
    }

    /// The primary VP9 backend, followed by the realtime fallback unless
    /// disabled in config.
    pub fn standard(tools: Arc<ToolRegistry>, config: &ConversionConfig) -> Self {
        let mut backends: Vec<Arc<dyn EncoderBackend>> = vec![Arc::new(Vp9Encoder)];
        if config.fallback_enabled {
            backends.push(Arc::new(RealtimeVp9Encoder));
        }
        Self::new(tools, backends, config.diagnostic_tail_lines)
    }

    /// Backends in fallback order.
    pub fn backends(&self) -> impl Iterator<Item = &dyn EncoderBackend> + '_ {
        self.backends.iter().map(|b| b.as_ref())
    }

    /// Encode `req.input` into `req.output`.
    ///
    /// Progress updates are sent on `progress` in the order the encoder
    /// produced them; the sender is dropped when this returns. When `cancel`
    /// fires the running child is killed and [`Error::Cancelled`] returned.
    ///
    /// # Errors
    ///
    /// Returns the last backend's failure once every backend has failed.
    pub async fn run(
        &self,
        req: EncodeRequest<'_>,
        progress: mpsc::Sender<ProgressUpdate>,
        cancel: &CancellationToken,
    ) -> vc_core::Result<EncodeSummary> {
        let mut last_error = None;

        for (index, backend) in self.backends.iter().enumerate() {
            if index > 0 {
                tracing::warn!(
                    job_id = %req.id,
                    backend = backend.name(),
                    "Falling back to next encoder backend"
                );
            }

            match self.attempt(backend.as_ref(), req, &progress, cancel).await {
                Ok(output_size) => {
                    tracing::info!(
                        job_id = %req.id,
                        backend = backend.name(),
                        output_size,
                        "Encode finished"
                    );
                    return Ok(EncodeSummary {
                        backend: backend.name(),
                        output_size,
                        fallback_used: index > 0,
                    });
                }
                Err(e) if !e.allows_fallback() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        job_id = %req.id,
                        backend = backend.name(),
                        error = %e,
                        "Encode attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::Internal("no encoder backends configured".into())))
    }

    /// One backend attempt. Returns the size of the persisted output.
    async fn attempt(
        &self,
        backend: &dyn EncoderBackend,
        req: EncodeRequest<'_>,
        progress: &mpsc::Sender<ProgressUpdate>,
        cancel: &CancellationToken,
    ) -> vc_core::Result<u64> {
        let program = self.tools.require(backend.tool())?.to_path_buf();

        let output_dir = req
            .output
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let workspace = AttemptWorkspace::new(output_dir, backend.name())?;
        let scratch_output = workspace.output();
        let passlog_prefix = workspace.passlog_prefix();

        let invocations = backend.invocations(
            req.plan,
            AttemptPaths {
                input: req.input,
                output: &scratch_output,
                passlog_prefix: &passlog_prefix,
            },
        );

        let expected_frames = req.probe.expected_frames(req.plan);
        for invocation in &invocations {
            tracing::info!(
                job_id = %req.id,
                backend = backend.name(),
                run = %invocation.label,
                "Starting encoder"
            );
            let tracker = ProgressTracker::new(req.probe.duration_secs, expected_frames)
                .with_span(invocation.span.0, invocation.span.1);
            self.run_invocation(&program, backend.name(), invocation, tracker, progress, cancel)
                .await?;
        }

        workspace.persist(req.output, backend.name())
    }

    /// Run one process to completion, feeding its stderr through the parser.
    async fn run_invocation(
        &self,
        program: &Path,
        backend: &str,
        invocation: &Invocation,
        mut tracker: ProgressTracker,
        progress: &mpsc::Sender<ProgressUpdate>,
        cancel: &CancellationToken,
    ) -> vc_core::Result<()> {
        let mut child = ToolCommand::new(program.to_path_buf())
            .args(invocation.args.iter().cloned())
            .spawn_streaming()?;

        let stderr = child.stderr.take().ok_or_else(|| {
            Error::Internal(format!("{backend}: encoder stderr was not captured"))
        })?;
        let mut lines = FramedRead::new(stderr, StatusLineCodec::new());
        let mut tail = DiagnosticTail::new(self.diagnostic_tail);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(kill(&mut child, backend).await),
                next = lines.next() => match next {
                    Some(Ok(line)) => match parse_line(&line) {
                        Some(sample) => {
                            // A closed receiver only means nobody is watching.
                            let _ = progress.send(tracker.observe(&sample)).await;
                        }
                        None => {
                            tracing::trace!(backend, line = %line, "Unparsed encoder output");
                            tail.push(line);
                        }
                    },
                    Some(Err(e)) => {
                        tracing::debug!(backend, "Stopped reading encoder output: {e}");
                        break;
                    }
                    None => break,
                },
            }
        }

        let status = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(kill(&mut child, backend).await),
            status = child.wait() => status.map_err(|e| {
                Error::encode(backend, format!("failed waiting for encoder: {e}"))
            })?,
        };

        if !status.success() {
            return Err(Error::encode(
                backend,
                format!("{} exited with {status}: {}", invocation.label, tail.render()),
            ));
        }
        Ok(())
    }
}

async fn kill(child: &mut Child, backend: &str) -> Error {
    if let Err(e) = child.kill().await {
        tracing::warn!(backend, "Failed to kill encoder: {e}");
    }
    Error::Cancelled(format!("{backend} encode abandoned"))
}
