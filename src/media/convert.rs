use crate::media::ffmpeg::Ffmpeg;
use crate::utils::error::PpeError;
use crate::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// 目标容器
const TARGET_EXT: &str = "mp4";

/// 源未上报帧率时的兜底值
pub const DEFAULT_FPS: f64 = 20.0;

/// 把播放端不兼容的视频容器（渲染器输出的 avi）重编码为 mp4
#[derive(Debug, Clone)]
pub struct FormatConverter {
    ffmpeg: Ffmpeg,
}

impl FormatConverter {
    pub fn new(ffmpeg: Ffmpeg) -> Self {
        Self { ffmpeg }
    }

    /// 已是目标容器则原样返回，不触碰文件系统。
    /// 否则以 H.264/AAC 按源帧率重编码到同级 .mp4，
    /// 写入成功后才删除源文件；失败时源文件保持原样，
    /// 写了一半的目标文件会被清掉。
    pub async fn convert(&self, path: &Path) -> Result<PathBuf> {
        if has_extension(path, TARGET_EXT) {
            return Ok(path.to_path_buf());
        }

        let fps = match self.ffmpeg.probe(path).await {
            Ok(info) => info.fps.unwrap_or(DEFAULT_FPS),
            Err(e) => {
                tracing::warn!(
                    "Probe failed for {}: {}, falling back to {} fps",
                    path.display(),
                    e,
                    DEFAULT_FPS
                );
                DEFAULT_FPS
            }
        };

        let target = path.with_extension(TARGET_EXT);
        let args: Vec<OsString> = vec![
            OsString::from("-y"),
            OsString::from("-i"),
            path.as_os_str().to_owned(),
            OsString::from("-c:v"),
            OsString::from("libx264"),
            OsString::from("-c:a"),
            OsString::from("aac"),
            OsString::from("-r"),
            OsString::from(format!("{:.3}", fps)),
            target.as_os_str().to_owned(),
        ];

        // 非零退出和超时都可能留下写到一半的目标文件
        if let Err(e) = self.ffmpeg.run(&args).await {
            crate::media::remove_partial(&target).await;
            return Err(PpeError::Conversion(e.to_string()));
        }

        if !target.exists() {
            return Err(PpeError::Conversion(format!(
                "Converted file missing: {}",
                target.display()
            )));
        }

        tokio::fs::remove_file(path).await.map_err(|e| {
            PpeError::Conversion(format!(
                "Failed to remove source {} after conversion: {}",
                path.display(),
                e
            ))
        })?;

        tracing::info!("Converted {} -> {}", path.display(), target.display());
        Ok(target)
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}
