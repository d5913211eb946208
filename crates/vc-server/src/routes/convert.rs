//! `POST /api/convert`: accept an upload and start a conversion.

use axum::extract::{Multipart, State};
use axum::{Extension, Json};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use vc_core::{settings, EncodingPlan, Error};

use crate::context::AppContext;
use crate::error::AppError;
use crate::middleware::request_id::RequestId;
use crate::orchestrator::StagedUpload;

#[derive(Debug, Serialize)]
pub struct ConvertResponse {
    pub conversion_id: String,
    pub message: String,
}

/// Multipart fields: `file` (the video) and optional `settings` (JSON text),
/// in either order.
pub async fn convert(
    State(ctx): State<AppContext>,
    Extension(request_id): Extension<RequestId>,
    multipart: Multipart,
) -> Result<Json<ConvertResponse>, AppError> {
    accept(&ctx, multipart)
        .await
        .map_err(|e| e.with_request_id(request_id.0))
}

async fn accept(ctx: &AppContext, mut multipart: Multipart) -> Result<Json<ConvertResponse>, AppError> {
    let mut upload: Option<StagedUpload> = None;
    let mut plan: Option<EncodingPlan> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("file") => {
                let name = field.file_name().unwrap_or_default().trim().to_string();
                if name.is_empty() {
                    return Err(Error::validation("file", "No file selected").into());
                }
                if !ctx.config.conversion.accepts(&name) {
                    return Err(Error::validation(
                        "file",
                        format!(
                            "Unsupported file format '{name}' (supported: {})",
                            ctx.config.conversion.supported_extensions.join(", ")
                        ),
                    )
                    .into());
                }

                let staged = ctx.storage.stage_upload()?;
                let mut writer = tokio::fs::File::from_std(staged.as_file().try_clone().map_err(Error::from)?);
                let mut size: u64 = 0;
                while let Some(chunk) = field.chunk().await? {
                    writer.write_all(&chunk).await.map_err(Error::from)?;
                    size += chunk.len() as u64;
                }
                writer.flush().await.map_err(Error::from)?;

                if size == 0 {
                    return Err(Error::validation("file", "Uploaded file is empty").into());
                }
                upload = Some(StagedUpload {
                    file: staged,
                    original_name: name,
                    size,
                });
            }
            // Resolved on arrival, before any later file part is read.
            Some("settings") => plan = Some(settings::resolve_json(&field.text().await?)?),
            other => {
                tracing::debug!(field = ?other, "Ignoring unexpected multipart field");
            }
        }
    }

    let upload = upload.ok_or_else(|| Error::validation("file", "No file provided"))?;
    let plan = match plan {
        Some(plan) => plan,
        None => settings::resolve_json("{}")?,
    };

    let id = ctx.orchestrator.submit(upload, plan)?;

    Ok(Json(ConvertResponse {
        conversion_id: id.to_string(),
        message: "Conversion started".to_string(),
    }))
}
