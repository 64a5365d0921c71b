use crate::detect::{DetectionResult, Upload};
use crate::utils::error::PpeError;
use crate::web::AppState;
use crate::Result;
use axum::extract::{Multipart, State};
use axum::response::Json;
use std::time::Instant;

/// Multipart 检测入口：取 file 字段，交给流水线
pub async fn predict_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<DetectionResult>> {
    let start_time = Instant::now();
    let request_id = uuid::Uuid::new_v4().to_string()[..8].to_string();

    tracing::info!("Processing detection request: request_id={}", request_id);

    let mut upload: Option<Upload> = None;

    // 解析multipart数据
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PpeError::InvalidInput(format!("Failed to read multipart field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("unknown").to_string();

        match field_name.as_str() {
            "file" => {
                let filename = field
                    .file_name()
                    .map(|n| n.to_string())
                    .ok_or_else(|| PpeError::InvalidInput("Missing filename".to_string()))?;
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();

                let bytes = field.bytes().await.map_err(|e| {
                    PpeError::InvalidInput(format!("Failed to read file data: {}", e))
                })?;
                if bytes.is_empty() {
                    return Err(PpeError::InvalidInput("Empty file".to_string()));
                }

                tracing::debug!(
                    "Received file: name={}, content_type={}, {} bytes",
                    filename,
                    content_type,
                    bytes.len()
                );
                upload = Some(Upload {
                    filename,
                    content_type,
                    bytes,
                });
            }
            _ => {
                tracing::debug!("Ignoring unknown field: {}", field_name);
            }
        }
    }

    let upload = upload.ok_or_else(|| PpeError::InvalidInput("No file provided".to_string()))?;

    let result = state.pipeline.process(upload).await?;

    tracing::info!(
        "Detection request completed: request_id={}, detections={}, time={:.3}s",
        request_id,
        result.detections.len(),
        start_time.elapsed().as_secs_f32()
    );

    Ok(Json(result))
}
