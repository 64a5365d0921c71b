use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PpeError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Model not loaded")]
    ModelNotLoaded,

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Media write failed: {0}")]
    MediaWrite(String),

    #[error("Format conversion failed: {0}")]
    Conversion(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Password hash error: {0}")]
    PasswordHash(String),

    #[error("ffmpeg error: {0}")]
    Ffmpeg(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image decode error: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("ORT error: {0}")]
    Ort(#[from] ort::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl PpeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            PpeError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PpeError::Json(_) => StatusCode::BAD_REQUEST,
            PpeError::ModelLoad(_) => StatusCode::SERVICE_UNAVAILABLE,
            PpeError::ModelNotLoaded => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PpeError::ModelLoad(_) => "MODEL_LOAD_ERROR",
            PpeError::ModelNotLoaded => "MODEL_NOT_LOADED",
            PpeError::Inference(_) => "INFERENCE_ERROR",
            PpeError::MediaWrite(_) => "MEDIA_WRITE_ERROR",
            PpeError::Conversion(_) => "CONVERSION_ERROR",
            PpeError::InvalidInput(_) => "INVALID_INPUT",
            PpeError::Config(_) => "CONFIG_ERROR",
            PpeError::PasswordHash(_) => "PASSWORD_HASH_ERROR",
            PpeError::Ffmpeg(_) => "FFMPEG_ERROR",
            PpeError::Database(_) => "DATABASE_ERROR",
            PpeError::Io(_) => "IO_ERROR",
            PpeError::Json(_) => "JSON_ERROR",
            PpeError::ImageDecode(_) => "IMAGE_DECODE_ERROR",
            PpeError::Ort(_) => "ORT_ERROR",
            PpeError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for PpeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // 对外只暴露单一的 {"error": ...} 结构，详细分类只进日志
        let error_response = serde_json::json!({
            "error": self.to_string(),
        });

        tracing::error!("Request failed: {} [{}] ({})", self, self.error_code(), status);

        (status, axum::Json(error_response)).into_response()
    }
}
