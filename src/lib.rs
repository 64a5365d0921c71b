pub mod config;
pub mod db;
pub mod detect;
pub mod media;
pub mod models;
pub mod utils;
pub mod web;

// 重新导出主要类型
pub use config::Config;
pub use detect::DetectionResult;
pub use utils::error::PpeError;

pub type Result<T> = std::result::Result<T, PpeError>;
