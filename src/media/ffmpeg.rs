use crate::utils::error::PpeError;
use crate::Result;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// ffmpeg/ffprobe 侧车进程封装
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    timeout: Duration,
}

impl Ffmpeg {
    /// 在 PATH 和常见安装位置查找两个二进制
    pub async fn locate() -> Result<Self> {
        let ffmpeg = find_binary("ffmpeg")
            .await
            .ok_or_else(|| PpeError::Ffmpeg("ffmpeg binary not found".to_string()))?;
        let ffprobe = find_binary("ffprobe")
            .await
            .ok_or_else(|| PpeError::Ffmpeg("ffprobe binary not found".to_string()))?;

        tracing::info!("Using ffmpeg: {}", ffmpeg.display());
        tracing::info!("Using ffprobe: {}", ffprobe.display());

        Ok(Self::with_paths(ffmpeg, ffprobe))
    }

    /// 指定二进制路径构造（测试中用来模拟不可用的环境）
    pub fn with_paths(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self {
            ffmpeg,
            ffprobe,
            timeout: Duration::from_secs(300),
        }
    }

    /// 覆盖默认的侧车进程超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 运行一条 ffmpeg 命令，非零退出时携带 stderr 末尾作为上下文
    pub async fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<()> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ffmpeg)
                .args(args)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            PpeError::Ffmpeg(format!("ffmpeg timed out after {}s", self.timeout.as_secs()))
        })?
        .map_err(|e| PpeError::Ffmpeg(format!("Failed to launch ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PpeError::Ffmpeg(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                tail(&stderr, 400)
            )));
        }
        Ok(())
    }

    /// 用 ffprobe 读取媒体信息，与 run 一样受超时约束
    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.ffprobe)
                .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
                .arg(path)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            PpeError::Ffmpeg(format!("ffprobe timed out after {}s", self.timeout.as_secs()))
        })?
        .map_err(|e| PpeError::Ffmpeg(format!("Failed to launch ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PpeError::Ffmpeg(format!(
                "ffprobe exited with {} for {}",
                output.status,
                path.display()
            )));
        }

        parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// 先问 which/where，再查常见安装目录
async fn find_binary(name: &str) -> Option<PathBuf> {
    let finder = if cfg!(windows) { "where" } else { "which" };
    if let Ok(output) = Command::new(finder).arg(name).output().await {
        if output.status.success() {
            if let Some(line) = String::from_utf8_lossy(&output.stdout).lines().next() {
                let path = PathBuf::from(line.trim());
                if path.exists() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin",
        "/usr/local/bin",
        "/opt/homebrew/bin",
        "/opt/local/bin",
    ];
    for dir in candidates {
        let path = Path::new(dir).join(name);
        if path.exists() {
            return Some(path);
        }
    }
    None
}

fn tail(text: &str, max: usize) -> &str {
    let trimmed = text.trim_end();
    match trimmed.char_indices().nth_back(max.saturating_sub(1)) {
        Some((idx, _)) => &trimmed[idx..],
        None => trimmed,
    }
}

/// ffprobe 结果中本服务关心的字段
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

fn parse_probe_output(json: &str) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));

    Ok(MediaInfo {
        fps: video
            .and_then(|s| s.r_frame_rate.as_deref())
            .and_then(parse_frame_rate),
        width: video.and_then(|s| s.width),
        height: video.and_then(|s| s.height),
        duration_seconds: probe
            .format
            .and_then(|f| f.duration)
            .and_then(|d| d.parse().ok()),
    })
}

/// r_frame_rate 形如 "30000/1001" 或 "25"
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let fps = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
