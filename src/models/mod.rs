pub mod yolo;

pub use yolo::{PredictedBox, YoloModel, CLASS_NAMES};
