use axum::body::Body;
use axum::Router;
use http::{Request, StatusCode};
use http_body_util::BodyExt;
use ppe_detect::db;
use ppe_detect::detect::{Detection, DetectionPipeline, Detector, Inference};
use ppe_detect::media::{Ffmpeg, FormatConverter, MediaStore};
use ppe_detect::web::{create_app, AppState};
use ppe_detect::{Config, PpeError};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "test-boundary-7d93b1a0";

/// 推理桩：不碰 ONNX，按配置伪造结果并往产物目录写文件
struct StubDetector {
    store: MediaStore,
    frames: Vec<Vec<Detection>>,
    artifact_suffixes: Vec<&'static str>,
    report_artifact: bool,
    fail: bool,
}

#[async_trait::async_trait]
impl Detector for StubDetector {
    async fn infer(&self, source: &Path, _is_video: bool) -> ppe_detect::Result<Inference> {
        if self.fail {
            return Err(PpeError::Inference("stub failure".to_string()));
        }

        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap()
            .to_string();
        let mut written = Vec::new();
        for suffix in &self.artifact_suffixes {
            let path = self
                .store
                .detections_dir()
                .join(format!("{}{}", stem, suffix));
            tokio::fs::write(&path, b"annotated").await?;
            written.push(path);
        }

        Ok(Inference {
            frames: self.frames.clone(),
            artifact: if self.report_artifact {
                written.first().cloned()
            } else {
                None
            },
        })
    }
}

struct TestApp {
    app: Router,
    store: MediaStore,
    _storage: TempDir,
    _db_dir: TempDir,
}

async fn test_app(
    frames: Vec<Vec<Detection>>,
    artifact_suffixes: Vec<&'static str>,
    report_artifact: bool,
    fail: bool,
) -> TestApp {
    let storage = TempDir::new().unwrap();
    let db_dir = TempDir::new().unwrap();

    let store = MediaStore::new(storage.path()).unwrap();
    let db_url = format!(
        "sqlite://{}?mode=rwc",
        db_dir.path().join("users.db").display()
    );
    let db = db::open_pool(&db_url).await.unwrap();

    let config = Config::new(
        "127.0.0.1:0".to_string(),
        "weights/best.onnx".to_string(),
        storage.path().to_string_lossy().into_owned(),
        db_url,
        0.6,
        Some(1),
    )
    .unwrap();

    let stub = StubDetector {
        store: store.clone(),
        frames,
        artifact_suffixes,
        report_artifact,
        fail,
    };
    let converter = FormatConverter::new(Ffmpeg::with_paths(
        PathBuf::from("/nonexistent/ffmpeg"),
        PathBuf::from("/nonexistent/ffprobe"),
    ));
    let pipeline = Arc::new(DetectionPipeline::new(
        Arc::new(stub),
        store.clone(),
        converter,
    ));

    let app = create_app(AppState {
        config,
        pipeline,
        db,
    });

    TestApp {
        app,
        store,
        _storage: storage,
        _db_dir: db_dir,
    }
}

fn detection(class_name: &str, confidence: f32) -> Detection {
    Detection {
        class_name: class_name.to_string(),
        confidence,
    }
}

fn multipart_request(field: &str, filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/predict/")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn json_request(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn root_reports_liveness() {
    let harness = test_app(vec![], vec![], false, false).await;

    let (status, body) = send(&harness.app, get_request("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "PPE detection API running!");
}

#[tokio::test]
async fn health_reports_status_and_version() {
    let harness = test_app(vec![], vec![], false, false).await;

    let (status, body) = send(&harness.app, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn predict_image_returns_detections_and_web_paths() {
    let harness = test_app(
        vec![vec![detection("Hardhat", 0.91), detection("Person", 0.84)]],
        vec![".jpg"],
        true,
        false,
    )
    .await;

    let request = multipart_request("file", "site.jpg", "image/jpeg", b"fake jpeg bytes");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["detections"].as_array().unwrap().len(), 2);
    assert_eq!(body["detections"][0]["class"], "Hardhat");
    assert!(body["detections"][0]["confidence"].as_f64().unwrap() > 0.9);
    assert_eq!(body["summary"]["Hardhat"], 1);
    assert_eq!(body["summary"]["Person"], 1);
    assert_eq!(body["is_video"], false);

    let original = body["original_image"].as_str().unwrap();
    assert!(original.starts_with("/static/uploads/site-"));
    assert!(original.ends_with(".jpg"));
    let annotated = body["annotated_image"].as_str().unwrap();
    assert!(annotated.starts_with("/static/detections/site-"));
}

#[tokio::test]
async fn predict_video_sets_flag_and_artifact() {
    let harness = test_app(vec![], vec![".mp4"], true, false).await;

    let request = multipart_request("file", "clip.mp4", "video/mp4", b"fake mp4 bytes");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_video"], true);
    assert_eq!(body["detections"].as_array().unwrap().len(), 0);
    assert_eq!(body["summary"], json!({}));
    assert!(body["annotated_image"]
        .as_str()
        .unwrap()
        .ends_with(".mp4"));
}

#[tokio::test]
async fn predict_without_artifact_returns_null_annotated_path() {
    let harness = test_app(vec![vec![detection("vehicle", 0.7)]], vec![], false, false).await;

    let request = multipart_request("file", "lot.png", "image/png", b"png bytes");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["annotated_image"].is_null());
    assert_eq!(body["detections"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn predict_without_file_field_is_rejected() {
    let harness = test_app(vec![], vec![], false, false).await;

    let request = multipart_request("attachment", "site.jpg", "image/jpeg", b"bytes");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input: No file provided");
}

#[tokio::test]
async fn predict_with_empty_file_is_rejected() {
    let harness = test_app(vec![], vec![], false, false).await;

    let request = multipart_request("file", "site.jpg", "image/jpeg", b"");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid input: Empty file");
}

#[tokio::test]
async fn predict_failure_maps_to_500_error_body() {
    let harness = test_app(vec![], vec![], false, true).await;

    let request = multipart_request("file", "site.jpg", "image/jpeg", b"bytes");
    let (status, body) = send(&harness.app, request).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Inference failed: stub failure");
    assert!(body.get("detections").is_none());
    assert!(body.get("summary").is_none());
}

#[tokio::test]
async fn predict_requires_trailing_slash() {
    let harness = test_app(vec![], vec![], false, false).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::empty())
        .unwrap();
    let response = harness.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn uploaded_file_is_served_under_static() {
    let harness = test_app(vec![], vec![".jpg"], true, false).await;

    let payload = b"original upload bytes";
    let request = multipart_request("file", "cam.jpg", "image/jpeg", payload);
    let (status, body) = send(&harness.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let original = body["original_image"].as_str().unwrap().to_string();
    let response = harness.app.clone().oneshot(get_request(&original)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.as_ref(), payload);

    // 存储名里带请求短键，磁盘上也确实只有这一个
    let stored = original.strip_prefix("/static/uploads/").unwrap();
    assert!(harness.store.uploads_dir().join(stored).exists());
}

#[tokio::test]
async fn signup_login_flow_uses_message_envelope() {
    let harness = test_app(vec![], vec![], false, false).await;

    // 注册
    let (status, body) = send(
        &harness.app,
        json_request(
            "/api/signup",
            json!({ "name": "Site Admin", "email": "admin@site.io", "password": "hardhat-42" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully.");

    // 重复注册
    let (status, body) = send(
        &harness.app,
        json_request(
            "/api/signup",
            json!({ "email": "admin@site.io", "password": "other" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Email already exists.");

    // 正确口令
    let (status, body) = send(
        &harness.app,
        json_request(
            "/api/login",
            json!({ "email": "admin@site.io", "password": "hardhat-42" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful.");

    // 错误口令
    let (status, body) = send(
        &harness.app,
        json_request(
            "/api/login",
            json!({ "email": "admin@site.io", "password": "wrong" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Incorrect password.");

    // 未注册邮箱
    let (status, body) = send(
        &harness.app,
        json_request(
            "/api/login",
            json!({ "email": "ghost@site.io", "password": "whatever" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User does not exist. Please sign up first.");
}

#[tokio::test]
async fn signup_accepts_missing_name() {
    let harness = test_app(vec![], vec![], false, false).await;

    let (status, body) = send(
        &harness.app,
        json_request(
            "/api/signup",
            json!({ "email": "anon@site.io", "password": "pw" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["message"], "User registered successfully.");
}

/// 走真 ffmpeg 的回归：avi 产物要变成 mp4 且源文件消失。
/// 环境里装不了 ffmpeg 时直接放过。
#[tokio::test]
async fn avi_artifact_converts_to_mp4_and_source_is_removed() {
    let ffmpeg = match Ffmpeg::locate().await {
        Ok(f) => f,
        Err(_) => return,
    };

    let tmp = TempDir::new().unwrap();
    let avi = tmp.path().join("clip.avi");
    let synthesize = [
        std::ffi::OsString::from("-y"),
        std::ffi::OsString::from("-f"),
        std::ffi::OsString::from("lavfi"),
        std::ffi::OsString::from("-i"),
        std::ffi::OsString::from("testsrc=duration=1:size=64x64:rate=10"),
        std::ffi::OsString::from("-c:v"),
        std::ffi::OsString::from("mjpeg"),
        avi.as_os_str().to_owned(),
    ];
    ffmpeg.run(&synthesize).await.unwrap();
    assert!(avi.exists());

    let converted = FormatConverter::new(ffmpeg).convert(&avi).await.unwrap();

    assert_eq!(converted, tmp.path().join("clip.mp4"));
    assert!(converted.exists());
    assert!(!avi.exists());
}

#[tokio::test]
async fn repeated_uploads_with_same_name_do_not_collide() {
    let harness = test_app(vec![], vec![], false, false).await;

    for _ in 0..2 {
        let request = multipart_request("file", "same.jpg", "image/jpeg", b"bytes");
        let (status, _) = send(&harness.app, request).await;
        assert_eq!(status, StatusCode::OK);
    }

    let uploads = harness
        .store
        .list_by_prefix(&harness.store.uploads_dir(), "same-")
        .unwrap();
    assert_eq!(uploads.len(), 2);
}
