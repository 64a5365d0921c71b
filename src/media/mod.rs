pub mod annotate;
pub mod convert;
pub mod ffmpeg;
pub mod store;

pub use convert::FormatConverter;
pub use ffmpeg::Ffmpeg;
pub use store::MediaStore;

use std::path::Path;

/// 清理失败路径上写了一半的输出文件，路径不存在不算错
pub(crate) async fn remove_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!("Removed partial output: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!("Failed to remove partial output {}: {}", path.display(), e);
        }
    }
}
