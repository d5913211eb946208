//! `GET /api/health`: liveness plus a summary of what this instance can do.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use vc_core::PresetName;

use crate::context::AppContext;
use crate::registry::StateCounts;

#[derive(Debug, Serialize)]
pub struct EncoderStatus {
    pub name: &'static str,
    pub tool: &'static str,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub encoders: Vec<EncoderStatus>,
    pub presets: Vec<&'static str>,
    pub supported_formats: Vec<String>,
    pub jobs: StateCounts,
}

pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    let encoders = ctx
        .orchestrator
        .driver()
        .backends()
        .map(|b| EncoderStatus {
            name: b.name(),
            tool: b.tool(),
            available: ctx.tools.is_available(b.tool()),
        })
        .collect();

    Json(HealthResponse {
        status: "healthy",
        message: "Video converter API is running",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: ctx.started_at.elapsed().as_secs(),
        encoders,
        presets: PresetName::ALL.iter().map(PresetName::as_str).collect(),
        supported_formats: ctx.config.conversion.supported_extensions.clone(),
        jobs: ctx.registry.counts(),
    })
}
