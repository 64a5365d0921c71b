pub mod detector;
pub mod pipeline;
pub mod types;

pub use detector::{Detector, PpeDetector};
pub use pipeline::DetectionPipeline;
pub use types::{Detection, DetectionResult, DetectionSummary, Inference, Upload};
