//! Job orchestration: from an accepted upload to a terminal job record.
//!
//! [`Orchestrator::submit`] registers a pending job and returns immediately.
//! A background task then moves it to `processing`, probes the input, runs
//! the [`EncoderDriver`] and records the outcome. Progress flows from the
//! driver over a channel to a single consumer that applies updates to the
//! registry in order; the terminal transition happens only after that
//! consumer has drained.

use std::path::Path;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use vc_av::{probe, EncodeRequest, EncoderDriver, MediaProbe, ProgressUpdate, ToolRegistry};
use vc_core::{ConversionId, EncodingPlan, Error, Job, Result};

use crate::registry::JobRegistry;
use crate::storage::{self, Storage};

/// Progress updates buffered between the encoder and the registry.
const PROGRESS_BUFFER: usize = 64;

/// An upload that passed validation and is waiting for a job.
#[derive(Debug)]
pub struct StagedUpload {
    pub file: NamedTempFile,
    pub original_name: String,
    pub size: u64,
}

/// Creates jobs and drives them to completion in the background.
#[derive(Clone)]
pub struct Orchestrator {
    registry: Arc<JobRegistry>,
    storage: Arc<Storage>,
    tools: Arc<ToolRegistry>,
    driver: EncoderDriver,
    keep_inputs: bool,
    cancel: CancellationToken,
    tasks: TaskTracker,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<JobRegistry>,
        storage: Arc<Storage>,
        tools: Arc<ToolRegistry>,
        driver: EncoderDriver,
        keep_inputs: bool,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            storage,
            tools,
            driver,
            keep_inputs,
            cancel,
            tasks: TaskTracker::new(),
        }
    }

    pub fn driver(&self) -> &EncoderDriver {
        &self.driver
    }

    /// Register a new pending job for `upload` and start encoding it.
    ///
    /// Every call allocates a new id, even for identical uploads.
    pub fn submit(&self, upload: StagedUpload, plan: EncodingPlan) -> Result<ConversionId> {
        let StagedUpload {
            file,
            original_name,
            size,
        } = upload;
        let preset = plan.preset;

        let id = self.registry.create(|id| {
            let input_path = self.storage.input_path(id, &original_name);
            let output_path = self.storage.output_path(id, &original_name);
            file.persist(&input_path).map_err(|e| Error::from(e.error))?;
            Ok(Job::new(id, plan, original_name.clone(), input_path, output_path))
        })?;

        tracing::info!(
            job_id = %id,
            file = %original_name,
            size,
            preset = %preset,
            "Conversion created"
        );

        let this = self.clone();
        self.tasks.spawn(async move { this.process(id, size).await });
        Ok(id)
    }

    /// Cancel running encodes and wait for their tasks to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }

    async fn process(self, id: ConversionId, input_size: u64) {
        let job = match self.registry.update(&id, |j| j.start().map(|()| j.clone())) {
            Ok(Ok(job)) => job,
            Ok(Err(e)) | Err(e) => {
                tracing::error!(job_id = %id, "Cannot dispatch conversion: {e}");
                return;
            }
        };
        tracing::info!(job_id = %id, "Conversion dispatched");

        let probe = match probe::probe(&self.tools, &job.input_path).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(job_id = %id, "Probe failed, progress may be coarse: {e}");
                MediaProbe::default()
            }
        };

        let (tx, rx) = mpsc::channel(PROGRESS_BUFFER);
        let consumer = tokio::spawn(apply_progress(self.registry.clone(), id, rx));

        let outcome = self.encode(job.clone(), probe, tx).await;

        if let Err(e) = consumer.await {
            tracing::warn!(job_id = %id, "Progress consumer ended abnormally: {e}");
        }

        match outcome {
            Ok(summary) => {
                let completed = self
                    .registry
                    .update(&id, |j| j.complete(input_size, summary.output_size, summary.backend));
                match completed {
                    Ok(Ok(())) => tracing::info!(
                        job_id = %id,
                        backend = summary.backend,
                        fallback = summary.fallback_used,
                        output_size = summary.output_size,
                        "Conversion completed"
                    ),
                    Ok(Err(e)) | Err(e) => {
                        tracing::error!(job_id = %id, "Could not record completion: {e}");
                        self.fail(&id, &job.output_path, &e);
                    }
                }
            }
            Err(e) => self.fail(&id, &job.output_path, &e),
        }

        if !self.keep_inputs {
            storage::remove_file(&job.input_path);
        }
    }

    /// Run the driver on its own task so a panic surfaces as a job error.
    async fn encode(
        &self,
        job: Job,
        probe: MediaProbe,
        progress: mpsc::Sender<ProgressUpdate>,
    ) -> Result<vc_av::EncodeSummary> {
        let driver = self.driver.clone();
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let req = EncodeRequest {
                id: job.id,
                plan: &job.plan,
                input: &job.input_path,
                output: &job.output_path,
                probe: &probe,
            };
            driver.run(req, progress, &cancel).await
        });

        match handle.await {
            Ok(result) => result,
            Err(e) => Err(Error::Internal(format!("encoder task failed: {e}"))),
        }
    }

    fn fail(&self, id: &ConversionId, output_path: &Path, error: &Error) {
        storage::remove_file(output_path);
        match self.registry.update(id, |j| j.fail(error.to_string())) {
            Ok(Ok(())) => tracing::warn!(job_id = %id, error = %error, "Conversion failed"),
            Ok(Err(e)) | Err(e) => {
                tracing::error!(job_id = %id, "Could not record failure ({error}): {e}")
            }
        }
    }
}

async fn apply_progress(
    registry: Arc<JobRegistry>,
    id: ConversionId,
    mut updates: mpsc::Receiver<ProgressUpdate>,
) {
    while let Some(update) = updates.recv().await {
        if let Err(e) = registry.update(&id, |j| j.apply_progress(update.percent, update.live)) {
            tracing::debug!(job_id = %id, "Dropping progress update: {e}");
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use vc_core::config::{ConversionConfig, StorageConfig};
    use vc_core::{JobState, PresetName};

    use super::*;

    fn setup(tools: ToolRegistry, keep_inputs: bool) -> (tempfile::TempDir, Orchestrator) {
        let root = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::new(&StorageConfig {
            upload_dir: root.path().join("uploads"),
            output_dir: root.path().join("outputs"),
            keep_inputs,
            retention_secs: None,
        }));
        storage.ensure_dirs().unwrap();
        let tools = Arc::new(tools);
        let driver = EncoderDriver::standard(tools.clone(), &ConversionConfig::default());
        let orchestrator = Orchestrator::new(
            Arc::new(JobRegistry::new()),
            storage,
            tools,
            driver,
            keep_inputs,
            CancellationToken::new(),
        );
        (root, orchestrator)
    }

    fn staged(orchestrator: &Orchestrator, name: &str) -> StagedUpload {
        let mut file = orchestrator.storage.stage_upload().unwrap();
        file.write_all(&[1u8; 2048]).unwrap();
        StagedUpload {
            file,
            original_name: name.to_string(),
            size: 2048,
        }
    }

    async fn wait_terminal(orchestrator: &Orchestrator, id: &ConversionId) -> Job {
        for _ in 0..200 {
            let job = orchestrator.registry.get(id).unwrap();
            if job.is_terminal() {
                return job;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("conversion {id} never finished");
    }

    #[tokio::test]
    async fn missing_encoders_end_in_error() {
        let (_root, orchestrator) = setup(ToolRegistry::with_paths([]), false);
        let plan = EncodingPlan::for_preset(PresetName::WebStandard).unwrap();
        let id = orchestrator
            .submit(staged(&orchestrator, "clip.mp4"), plan)
            .unwrap();

        let job = wait_terminal(&orchestrator, &id).await;
        assert_eq!(job.state, JobState::Error);
        assert!(job.error_message().unwrap().contains("not found"));
        assert!(!job.output_path.exists());
        assert!(!job.input_path.exists());
    }

    #[tokio::test]
    async fn keep_inputs_preserves_upload() {
        let (_root, orchestrator) = setup(ToolRegistry::with_paths([]), true);
        let plan = EncodingPlan::for_preset(PresetName::WebStandard).unwrap();
        let id = orchestrator
            .submit(staged(&orchestrator, "clip.mp4"), plan)
            .unwrap();

        let job = wait_terminal(&orchestrator, &id).await;
        assert_eq!(job.state, JobState::Error);
        assert!(job.input_path.exists());
        assert_eq!(job.original_name, "clip.mp4");
    }

    #[tokio::test]
    async fn identical_submissions_get_distinct_jobs() {
        let (_root, orchestrator) = setup(ToolRegistry::with_paths([]), false);
        let plan = EncodingPlan::for_preset(PresetName::WebStandard).unwrap();
        let a = orchestrator
            .submit(staged(&orchestrator, "same.mp4"), plan.clone())
            .unwrap();
        let b = orchestrator
            .submit(staged(&orchestrator, "same.mp4"), plan)
            .unwrap();
        assert_ne!(a, b);
        orchestrator.shutdown().await;
        assert!(orchestrator.registry.get(&a).unwrap().is_terminal());
        assert!(orchestrator.registry.get(&b).unwrap().is_terminal());
    }
}
