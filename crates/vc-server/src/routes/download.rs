//! `GET /api/download/{id}`: stream a finished output.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use tokio_util::io::ReaderStream;
use vc_core::{ConversionId, Error, JobState};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;

pub async fn download(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    open(&ctx, &id)
        .await
        .map_err(|e| AppError::from(e).with_request_id(request_id.0))
}

async fn open(ctx: &AppContext, raw_id: &str) -> vc_core::Result<Response> {
    let id: ConversionId = raw_id
        .parse()
        .map_err(|_| Error::not_found("conversion", raw_id))?;
    let job = ctx.registry.get(&id)?;

    if job.state != JobState::Completed {
        return Err(Error::Conflict(format!(
            "conversion {id} is {}, not completed",
            job.state.as_str()
        )));
    }

    let file = match tokio::fs::File::open(&job.output_path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(Error::not_found("output", id.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();

    let headers = [
        (header::CONTENT_TYPE, "video/webm".to_string()),
        (header::CONTENT_LENGTH, len.to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"converted_{id}.webm\""),
        ),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}
