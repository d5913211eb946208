//! `GET /api/progress/{id}`: pollable job status.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use vc_core::{ConversionId, Job, JobResult, JobState};

use crate::context::AppContext;

#[derive(Debug, Serialize, PartialEq)]
pub struct ProgressResponse {
    pub conversion_id: String,
    pub status: &'static str,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<String>,
}

impl ProgressResponse {
    fn unknown(id: String) -> Self {
        Self {
            conversion_id: id,
            status: "unknown",
            progress: 0.0,
            error: None,
            compression_ratio: None,
            input_size: None,
            output_size: None,
            time: None,
            fps: None,
            speed: None,
            eta: None,
        }
    }

    /// Snapshot a job. Live stats are only reported while it is running.
    pub fn from_job(job: &Job) -> Self {
        let mut resp = Self::unknown(job.id.to_string());
        resp.status = match job.state {
            JobState::Pending | JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Error => "error",
        };
        resp.progress = round2(job.progress);

        match &job.result {
            Some(JobResult::Completed {
                input_size,
                output_size,
                compression_ratio,
            }) => {
                resp.input_size = Some(*input_size);
                resp.output_size = Some(*output_size);
                resp.compression_ratio = Some(*compression_ratio);
            }
            Some(JobResult::Error { message }) => resp.error = Some(message.clone()),
            None => {}
        }

        if job.state == JobState::Processing {
            if let Some(live) = &job.live {
                resp.time = Some(format_clock(live.elapsed_secs, true));
                resp.fps = live.fps.map(round2);
                resp.speed = live.speed.map(|s| format!("{s:.2}x"));
                resp.eta = live.eta_secs.map(|s| format_clock(s, false));
            }
        }
        resp
    }
}

/// Never fails: ids that do not parse or are not registered are `unknown`.
pub async fn progress(State(ctx): State<AppContext>, Path(id): Path<String>) -> Json<ProgressResponse> {
    let job = id
        .parse::<ConversionId>()
        .ok()
        .and_then(|parsed| ctx.registry.get(&parsed).ok());

    Json(match job {
        Some(job) => ProgressResponse::from_job(&job),
        None => ProgressResponse::unknown(id),
    })
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// `HH:MM:SS`, or `HH:MM:SS.cc` with `centis`.
fn format_clock(secs: f64, centis: bool) -> String {
    let secs = if secs.is_finite() { secs.max(0.0) } else { 0.0 };
    let total_centis = (secs * 100.0).round() as u64;
    let whole = if centis { total_centis / 100 } else { secs.round() as u64 };
    let (h, m, s) = (whole / 3600, (whole / 60) % 60, whole % 60);
    if centis {
        format!("{h:02}:{m:02}:{s:02}.{:02}", total_centis % 100)
    } else {
        format!("{h:02}:{m:02}:{s:02}")
    }
}
