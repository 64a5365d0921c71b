pub mod auth;
pub mod handlers;

use crate::db;
use crate::detect::{DetectionPipeline, PpeDetector};
use crate::media::{Ffmpeg, FormatConverter, MediaStore};
use crate::models::YoloModel;
use crate::utils::error::PpeError;
use crate::{Config, Result};
use axum::{
    extract::DefaultBodyLimit,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, services::ServeDir, timeout::TimeoutLayer,
};

/// 路由层共享的应用状态
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pipeline: Arc<DetectionPipeline>,
    pub db: SqlitePool,
}

pub async fn serve(config: Config) -> Result<()> {
    let db = db::open_pool(&config.database_url).await?;

    // 模型在启动期加载，权重缺失直接拒绝启动
    let model = Arc::new(YoloModel::load(&config)?);
    let store = MediaStore::new(&config.storage_root)?;
    let ffmpeg = Ffmpeg::locate().await?;

    let detector = PpeDetector::new(model, store.clone(), ffmpeg.clone());
    let pipeline = Arc::new(DetectionPipeline::new(
        Arc::new(detector),
        store,
        FormatConverter::new(ffmpeg),
    ));

    let state = AppState {
        config: config.clone(),
        pipeline,
        db,
    };
    let app = create_app(state);

    // 解析绑定地址
    let addr: SocketAddr = config.bind_addr.parse().map_err(|e| {
        PpeError::Config(format!("Invalid bind address {}: {}", config.bind_addr, e))
    })?;

    tracing::info!("Server starting on http://{}", addr);
    tracing::info!("API endpoints:");
    tracing::info!("  POST /api/predict/ - Multipart media detection");
    tracing::info!("  POST /api/signup   - User registration");
    tracing::info!("  POST /api/login    - User login");
    tracing::info!("  GET  /             - Liveness message");
    tracing::info!("  GET  /health       - Health check");
    tracing::info!("  GET  /static/*     - Uploads and annotated artifacts");

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PpeError::Internal(format!("Failed to bind to address {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| PpeError::Internal(format!("Server failed to start: {}", e)))?;

    Ok(())
}

pub fn create_app(state: AppState) -> Router {
    let static_dir = state.config.storage_root.clone();
    let max_request_size = state.config.server_config.max_request_size;
    let request_timeout = state.config.server_config.request_timeout;

    Router::new()
        // 检测与账号 API
        .route("/api/predict/", post(handlers::predict_handler))
        .route("/api/signup", post(auth::signup_handler))
        .route("/api/login", post(auth::login_handler))
        // 系统路由
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        // 原始上传与标注产物
        .nest_service("/static", ServeDir::new(static_dir))
        // Multipart 提取器默认只收 2MB，放开到配置上限
        .layer(DefaultBodyLimit::max(max_request_size))
        .layer(RequestBodyLimitLayer::new(max_request_size))
        .layer(TimeoutLayer::new(Duration::from_secs(request_timeout)))
        .layer(CorsLayer::permissive()) // 开发环境使用宽松CORS
        .with_state(state)
}

/// 根路径探活
async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({ "message": "PPE detection API running!" }))
}

/// 健康检查端点
async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
