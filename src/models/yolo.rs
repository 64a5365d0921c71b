use crate::utils::error::PpeError;
use crate::{Config, Result};
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::{s, Array4, ArrayViewD};
use ort::{
    inputs,
    session::{builder::GraphOptimizationLevel, Session},
    value::Tensor,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// 模型输入边长，非方形输入会被拉伸到该尺寸
pub const INPUT_SIZE: u32 = 640;

/// NMS 的同类框重叠阈值
const IOU_THRESHOLD: f32 = 0.45;

/// 训练集的类别表，顺序与模型输出通道一致
pub const CLASS_NAMES: [&str; 10] = [
    "Hardhat",
    "Mask",
    "NO-Hardhat",
    "NO-Mask",
    "NO-Safety Vest",
    "Person",
    "Safety Cone",
    "Safety Vest",
    "machinery",
    "vehicle",
];

/// 单帧上的一个检测框，坐标为原图像素
#[derive(Debug, Clone, PartialEq)]
pub struct PredictedBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub score: f32,
}

impl PredictedBox {
    pub fn class_name(&self) -> &'static str {
        CLASS_NAMES.get(self.class_id).copied().unwrap_or("unknown")
    }
}

/// YOLOv8 安全装备检测模型，持有单个 ONNX 会话
#[derive(Debug)]
pub struct YoloModel {
    session: Arc<Mutex<Session>>,
    output_name: String, // 动态发现的输出名称
    confidence_threshold: f32,
}

impl YoloModel {
    pub fn load(config: &Config) -> Result<Self> {
        let weights = &config.weights_path;

        if !weights.exists() {
            return Err(PpeError::ModelLoad(format!(
                "Model weights not found: {}",
                weights.display()
            )));
        }

        tracing::info!("Loading detection model from: {}", weights.display());

        let optimization = match config.onnx_config.optimization_level {
            0 => GraphOptimizationLevel::Disable,
            1 => GraphOptimizationLevel::Level1,
            2 => GraphOptimizationLevel::Level2,
            _ => GraphOptimizationLevel::Level3,
        };

        let session = Session::builder()?
            .with_optimization_level(optimization)?
            .with_intra_threads(config.onnx_config.intra_threads)?
            .commit_from_file(weights)?;

        // 动态发现输出名称
        if session.outputs.is_empty() {
            return Err(PpeError::ModelLoad(
                "Detection model has no outputs".to_string(),
            ));
        }
        let output_name = session.outputs[0].name.clone();
        tracing::info!("Detection model output: '{}'", output_name);

        for (i, output) in session.outputs.iter().enumerate() {
            tracing::debug!("Model output[{}]: '{}'", i, output.name);
        }

        Ok(Self {
            session: Arc::new(Mutex::new(session)),
            output_name,
            confidence_threshold: config.confidence_threshold,
        })
    }

    /// 单帧推理：缩放到模型输入尺寸、前向、解码回原图坐标
    pub fn run_frame(&self, image: &RgbImage) -> Result<Vec<PredictedBox>> {
        let (orig_w, orig_h) = image.dimensions();
        let input = preprocess(image);

        // 推理 - 立即提取数据避免生命周期冲突
        let input_tensor = Tensor::from_array(input)?;
        let prediction = {
            let mut session = self.session.lock();
            let outputs = session.run(inputs!["images" => input_tensor])?;

            match outputs.get(&self.output_name) {
                Some(output) => output.try_extract_array::<f32>()?.into_owned(),
                None => {
                    let available_outputs: Vec<String> =
                        outputs.keys().map(|s| s.to_string()).collect();
                    return Err(PpeError::Inference(format!(
                        "Output '{}' not found. Available outputs: {:?}",
                        self.output_name, available_outputs
                    )));
                }
            }
        };

        let candidates =
            decode_predictions(&prediction.view(), self.confidence_threshold, orig_w, orig_h)?;
        let boxes = nms(candidates, IOU_THRESHOLD);

        tracing::debug!("Frame produced {} boxes after NMS", boxes.len());
        Ok(boxes)
    }
}

/// HWC u8 -> NCHW f32，像素归一化到 [0,1]
fn preprocess(image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(image, INPUT_SIZE, INPUT_SIZE, FilterType::Triangle);
    let size = INPUT_SIZE as usize;

    let mut input = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y, x]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y, x]] = pixel[2] as f32 / 255.0;
    }

    input
}

/// 解码 (1, 4+类别数, 锚点数) 的原始输出：
/// 每个锚点取最高类别分，过阈值的转为原图坐标下的 xyxy 框
fn decode_predictions(
    prediction: &ArrayViewD<f32>,
    threshold: f32,
    orig_w: u32,
    orig_h: u32,
) -> Result<Vec<PredictedBox>> {
    let shape = prediction.shape();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(PpeError::Inference(format!(
            "Unsupported model output shape: {:?}. Expected (1, 4+classes, anchors)",
            shape
        )));
    }

    let num_classes = shape[1] - 4;
    let num_anchors = shape[2];
    let scale_x = orig_w as f32 / INPUT_SIZE as f32;
    let scale_y = orig_h as f32 / INPUT_SIZE as f32;
    let view = prediction.slice(s![0, .., ..]);

    let mut boxes = Vec::new();
    for a in 0..num_anchors {
        let mut best_class = 0usize;
        let mut best_score = 0.0f32;
        for c in 0..num_classes {
            let score = view[[4 + c, a]];
            if score > best_score {
                best_score = score;
                best_class = c;
            }
        }
        if best_score < threshold {
            continue;
        }

        let cx = view[[0, a]] * scale_x;
        let cy = view[[1, a]] * scale_y;
        let w = view[[2, a]] * scale_x;
        let h = view[[3, a]] * scale_y;

        boxes.push(PredictedBox {
            x1: (cx - w / 2.0).clamp(0.0, orig_w as f32),
            y1: (cy - h / 2.0).clamp(0.0, orig_h as f32),
            x2: (cx + w / 2.0).clamp(0.0, orig_w as f32),
            y2: (cy + h / 2.0).clamp(0.0, orig_h as f32),
            class_id: best_class,
            score: best_score,
        });
    }

    Ok(boxes)
}

/// 类内 NMS：按置信度降序保留，与已保留同类框 IoU 超阈值的丢弃
fn nms(mut boxes: Vec<PredictedBox>, iou_threshold: f32) -> Vec<PredictedBox> {
    boxes.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<PredictedBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

fn iou(a: &PredictedBox, b: &PredictedBox) -> f32 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    if intersection <= 0.0 {
        return 0.0;
    }

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - intersection;

    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}
