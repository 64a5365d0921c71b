use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// 收到的一个上传文件
#[derive(Debug, Clone)]
pub struct Upload {
    /// 客户端上报的文件名
    pub filename: String,
    /// 客户端上报的 MIME 类型，据此区分图片和视频
    pub content_type: String,
    pub bytes: axum::body::Bytes,
}

/// 单个检测框的对外表示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: f32,
}

/// 按类别聚合的出现次数，BTreeMap 保证键序稳定
pub type DetectionSummary = BTreeMap<String, usize>;

/// 推理器产出：逐帧检测结果，外加可选的标注产物路径
#[derive(Debug, Clone, Default)]
pub struct Inference {
    pub frames: Vec<Vec<Detection>>,
    /// 标注产物在磁盘上的位置，推理器未上报时走前缀检索兜底
    pub artifact: Option<PathBuf>,
}

/// POST /api/predict/ 的响应体
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub summary: DetectionSummary,
    /// 原始上传的静态访问路径
    pub original_image: String,
    /// 标注产物的静态访问路径，找不到产物时为 null
    pub annotated_image: Option<String>,
    pub is_video: bool,
}
