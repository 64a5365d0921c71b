use crate::detect::detector::Detector;
use crate::detect::types::{Detection, DetectionResult, DetectionSummary, Inference, Upload};
use crate::media::{store, FormatConverter, MediaStore};
use crate::utils::error::PpeError;
use crate::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// 检测流水线：上传落盘、推理、产物定位、容器转换、拼对外路径
pub struct DetectionPipeline {
    detector: Arc<dyn Detector>,
    store: MediaStore,
    converter: FormatConverter,
}

impl DetectionPipeline {
    pub fn new(detector: Arc<dyn Detector>, store: MediaStore, converter: FormatConverter) -> Self {
        Self {
            detector,
            store,
            converter,
        }
    }

    /// 处理一次上传，返回对外响应体
    pub async fn process(&self, upload: Upload) -> Result<DetectionResult> {
        // 同名上传互不覆盖：文件名里揉进请求级短键
        let stored_name = keyed_name(&upload.filename, &short_key())?;
        let source = self.store.save(&stored_name, &upload.bytes).await?;
        let is_video = upload.content_type.starts_with("video/");

        let inference = self.detector.infer(&source, is_video).await?;
        let Inference { frames, artifact } = inference;
        let frame_count = frames.len();

        let detections: Vec<Detection> = frames.into_iter().flatten().collect();
        let summary = summarize(&detections);

        // 推理器没有上报产物路径时，按存储名前缀在产物目录里找
        let stem = stem_of(&stored_name);
        let artifact = match artifact {
            Some(path) => Some(path),
            None => self.find_artifact(stem)?,
        };

        // avi 容器浏览器播不了，转成 mp4 再暴露
        let artifact = match artifact {
            Some(path) if is_avi(&path) => Some(self.converter.convert(&path).await?),
            other => other,
        };

        let annotated_image = match &artifact {
            Some(path) => Some(format!("/static/detections/{}", file_name_of(path)?)),
            None => None,
        };

        tracing::info!(
            "Detection completed: file={}, frames={}, detections={}, is_video={}",
            stored_name,
            frame_count,
            detections.len(),
            is_video
        );

        Ok(DetectionResult {
            detections,
            summary,
            original_image: format!("/static/uploads/{}", stored_name),
            annotated_image,
            is_video,
        })
    }

    /// 前缀检索兜底：多个候选时取字典序最小的并告警
    fn find_artifact(&self, stem: &str) -> Result<Option<PathBuf>> {
        let matches = self
            .store
            .list_by_prefix(&self.store.detections_dir(), stem)?;
        if matches.len() > 1 {
            tracing::warn!(
                "Found {} artifacts with prefix '{}', using {}",
                matches.len(),
                stem,
                matches[0].display()
            );
        }
        Ok(matches.into_iter().next())
    }
}

/// 8 位十六进制请求短键
fn short_key() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 把短键揉进文件名主干："clip.mp4" -> "clip-a1b2c3d4.mp4"
fn keyed_name(filename: &str, key: &str) -> Result<String> {
    store::validate_name(filename)?;

    let path = Path::new(filename);
    let name = match (
        path.file_stem().and_then(|s| s.to_str()),
        path.extension().and_then(|e| e.to_str()),
    ) {
        (Some(stem), Some(ext)) => format!("{}-{}.{}", stem, key, ext),
        _ => format!("{}-{}", filename, key),
    };
    Ok(name)
}

fn summarize(detections: &[Detection]) -> DetectionSummary {
    let mut summary = DetectionSummary::new();
    for d in detections {
        *summary.entry(d.class_name.clone()).or_insert(0) += 1;
    }
    summary
}

fn stem_of(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[..idx],
        _ => name,
    }
}

fn is_avi(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("avi"))
        .unwrap_or(false)
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| {
            PpeError::Internal(format!("Artifact path has no file name: {}", path.display()))
        })
}
