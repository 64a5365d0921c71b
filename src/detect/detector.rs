use crate::detect::types::{Detection, Inference};
use crate::media::convert::DEFAULT_FPS;
use crate::media::{annotate, Ffmpeg, MediaStore};
use crate::models::yolo::{PredictedBox, YoloModel};
use crate::utils::error::PpeError;
use crate::Result;
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

/// 推理后端的接入点，测试里用桩实现替换真实模型
#[async_trait::async_trait]
pub trait Detector: Send + Sync {
    /// 对存储里的一个媒体文件做检测，产出逐帧结果与标注产物
    async fn infer(&self, source: &Path, is_video: bool) -> Result<Inference>;
}

/// 基于 ONNX 会话的默认实现。图片直接标注；
/// 视频先抽帧，逐帧标注后重新编码成 avi。
pub struct PpeDetector {
    model: Arc<YoloModel>,
    store: MediaStore,
    ffmpeg: Ffmpeg,
}

impl PpeDetector {
    pub fn new(model: Arc<YoloModel>, store: MediaStore, ffmpeg: Ffmpeg) -> Self {
        Self {
            model,
            store,
            ffmpeg,
        }
    }

    async fn infer_image(&self, source: &Path) -> Result<Inference> {
        let file_name = file_name_of(source)?;
        let target = self.store.detections_dir().join(&file_name);

        let model = Arc::clone(&self.model);
        let source = source.to_path_buf();
        let artifact = target.clone();

        // 解码、推理、标注都是 CPU 密集操作，挪到阻塞线程池
        let outcome = tokio::task::spawn_blocking(move || {
            let mut image = image::open(&source)?.to_rgb8();
            let boxes = model.run_frame(&image)?;
            annotate::draw_boxes(&mut image, &boxes);
            image.save(&target)?;
            Ok::<_, PpeError>(boxes)
        })
        .await
        .map_err(|e| PpeError::Internal(format!("Inference task failed: {}", e)))?;

        // 保存标注图失败时清掉写了一半的文件
        let boxes = match outcome {
            Ok(boxes) => boxes,
            Err(e) => {
                crate::media::remove_partial(&artifact).await;
                return Err(e);
            }
        };

        Ok(Inference {
            frames: vec![to_detections(&boxes)],
            artifact: Some(artifact),
        })
    }

    async fn infer_video(&self, source: &Path) -> Result<Inference> {
        let stem = file_stem_of(source)?;

        let fps = match self.ffmpeg.probe(source).await {
            Ok(info) => info.fps.unwrap_or(DEFAULT_FPS),
            Err(e) => {
                tracing::warn!(
                    "Probe failed for {}: {}, falling back to {} fps",
                    source.display(),
                    e,
                    DEFAULT_FPS
                );
                DEFAULT_FPS
            }
        };

        let workdir = tempfile::tempdir()?;
        let frames_dir = workdir.path().join("frames");
        tokio::fs::create_dir_all(&frames_dir).await?;

        // 抽帧，%06d 命名保证按字典序即按时间序
        let pattern = frames_dir.join("%06d.jpg");
        let extract: Vec<OsString> = vec![
            OsString::from("-i"),
            source.as_os_str().to_owned(),
            OsString::from("-qscale:v"),
            OsString::from("2"),
            pattern.as_os_str().to_owned(),
        ];
        self.ffmpeg
            .run(&extract)
            .await
            .map_err(|e| PpeError::Inference(format!("Frame extraction failed: {}", e)))?;

        let frame_files = self.store.list_by_prefix(&frames_dir, "")?;
        if frame_files.is_empty() {
            return Err(PpeError::Inference(format!(
                "No frames extracted from {}",
                source.display()
            )));
        }
        tracing::debug!("Extracted {} frames at {:.3} fps", frame_files.len(), fps);

        let model = Arc::clone(&self.model);
        let files = frame_files.clone();
        let frames: Vec<Vec<PredictedBox>> = tokio::task::spawn_blocking(move || {
            let mut all = Vec::with_capacity(files.len());
            for path in &files {
                let mut image = image::open(path)?.to_rgb8();
                let boxes = model.run_frame(&image)?;
                annotate::draw_boxes(&mut image, &boxes);
                image.save(path)?;
                all.push(boxes);
            }
            Ok::<_, PpeError>(all)
        })
        .await
        .map_err(|e| PpeError::Internal(format!("Inference task failed: {}", e)))??;

        // 标注帧重新编码；后续由格式转换补成浏览器可播的 mp4
        let artifact = self.store.detections_dir().join(format!("{}.avi", stem));
        let encode: Vec<OsString> = vec![
            OsString::from("-y"),
            OsString::from("-framerate"),
            OsString::from(format!("{:.3}", fps)),
            OsString::from("-i"),
            pattern.as_os_str().to_owned(),
            OsString::from("-c:v"),
            OsString::from("mjpeg"),
            OsString::from("-q:v"),
            OsString::from("3"),
            artifact.as_os_str().to_owned(),
        ];
        // 编码中途失败会留下残缺的 avi
        if let Err(e) = self.ffmpeg.run(&encode).await {
            crate::media::remove_partial(&artifact).await;
            return Err(PpeError::Inference(format!("Video encoding failed: {}", e)));
        }

        tracing::info!("Annotated video written to {}", artifact.display());
        Ok(Inference {
            frames: frames.iter().map(|b| to_detections(b)).collect(),
            artifact: Some(artifact),
        })
    }
}

#[async_trait::async_trait]
impl Detector for PpeDetector {
    async fn infer(&self, source: &Path, is_video: bool) -> Result<Inference> {
        if is_video {
            self.infer_video(source).await
        } else {
            self.infer_image(source).await
        }
    }
}

pub(crate) fn to_detections(boxes: &[PredictedBox]) -> Vec<Detection> {
    boxes
        .iter()
        .map(|b| Detection {
            class_name: b.class_name().to_string(),
            confidence: b.score,
        })
        .collect()
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| PpeError::InvalidInput(format!("Invalid media path: {}", path.display())))
}

fn file_stem_of(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|n| n.to_str())
        .map(|n| n.to_string())
        .ok_or_else(|| PpeError::InvalidInput(format!("Invalid media path: {}", path.display())))
}
