//! The conversion job record and its state machine.
//!
//! `pending -> processing -> completed | error`. Terminal states never
//! transition again; a retry is always a new job with a new id.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ids::ConversionId;
use crate::settings::EncodingPlan;
use crate::Error;

/// Lifecycle state of a conversion job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Error)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Error => "error",
        }
    }
}

/// Last-known encoder statistics. Fluctuates freely, unlike the percentage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveStats {
    /// Media time encoded so far in the current pass, in seconds.
    pub elapsed_secs: f64,
    pub fps: Option<f64>,
    /// Encoding speed as a multiple of realtime.
    pub speed: Option<f64>,
    /// Estimated seconds until the current pass finishes.
    pub eta_secs: Option<f64>,
}

/// Outcome of a job, present only once it is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum JobResult {
    Completed {
        input_size: u64,
        output_size: u64,
        /// `output_size / input_size`.
        compression_ratio: f64,
    },
    Error {
        message: String,
    },
}

/// One conversion request, end to end.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: ConversionId,
    pub state: JobState,
    pub plan: EncodingPlan,
    /// File name as uploaded by the client.
    pub original_name: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    /// Overall progress in `[0, 100]`, non-decreasing while processing.
    pub progress: f64,
    pub live: Option<LiveStats>,
    pub result: Option<JobResult>,
    /// Encoder backend that produced the output.
    pub backend: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a pending job.
    pub fn new(
        id: ConversionId,
        plan: EncodingPlan,
        original_name: impl Into<String>,
        input_path: PathBuf,
        output_path: PathBuf,
    ) -> Self {
        Self {
            id,
            state: JobState::Pending,
            plan,
            original_name: original_name.into(),
            input_path,
            output_path,
            progress: 0.0,
            live: None,
            result: None,
            backend: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// `pending -> processing`.
    pub fn start(&mut self) -> Result<()> {
        if self.state != JobState::Pending {
            return Err(self.illegal_transition(JobState::Processing));
        }
        self.state = JobState::Processing;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Record a progress sample.
    ///
    /// The percentage is clamped to `[0, 100]` and never moves backward.
    /// Samples arriving outside `processing` are dropped. Returns whether the
    /// sample was applied.
    pub fn apply_progress(&mut self, percent: f64, live: Option<LiveStats>) -> bool {
        if self.state != JobState::Processing {
            return false;
        }
        if percent.is_finite() {
            self.progress = self.progress.max(percent.clamp(0.0, 100.0));
        }
        if live.is_some() {
            self.live = live;
        }
        true
    }

    /// `processing -> completed`.
    pub fn complete(&mut self, input_size: u64, output_size: u64, backend: &str) -> Result<()> {
        if self.state != JobState::Processing {
            return Err(self.illegal_transition(JobState::Completed));
        }
        if output_size == 0 {
            return Err(Error::Internal(format!(
                "conversion {} cannot complete with an empty output",
                self.id
            )));
        }
        let compression_ratio = if input_size == 0 {
            0.0
        } else {
            output_size as f64 / input_size as f64
        };
        self.state = JobState::Completed;
        self.progress = 100.0;
        self.backend = Some(backend.to_string());
        self.result = Some(JobResult::Completed {
            input_size,
            output_size,
            compression_ratio,
        });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// `pending | processing -> error`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        if self.is_terminal() {
            return Err(self.illegal_transition(JobState::Error));
        }
        let mut message = message.into();
        if message.trim().is_empty() {
            message = "conversion failed".to_string();
        }
        self.state = JobState::Error;
        self.result = Some(JobResult::Error { message });
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// The error message of a failed job.
    pub fn error_message(&self) -> Option<&str> {
        match &self.result {
            Some(JobResult::Error { message }) => Some(message),
            _ => None,
        }
    }

    fn illegal_transition(&self, to: JobState) -> Error {
        Error::Conflict(format!(
            "conversion {} cannot move from {} to {}",
            self.id,
            self.state.as_str(),
            to.as_str()
        ))
    }
}
