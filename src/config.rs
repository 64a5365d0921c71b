use anyhow::Result;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    /// 服务器绑定地址
    pub bind_addr: String,

    /// ONNX 权重文件路径
    pub weights_path: PathBuf,

    /// 媒体存储根目录（uploads 与 detections 位于其下）
    pub storage_root: PathBuf,

    /// SQLite 连接串
    pub database_url: String,

    /// 检测结果的最低置信度
    pub confidence_threshold: f32,

    /// ONNX Runtime配置
    pub onnx_config: OnnxConfig,

    /// 服务器配置
    pub server_config: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct OnnxConfig {
    /// CPU线程数
    pub intra_threads: usize,

    /// 图优化级别
    pub optimization_level: i32,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 请求超时时间（秒）
    pub request_timeout: u64,

    /// 最大请求体大小（字节）
    pub max_request_size: usize,
}

impl Config {
    pub fn new(
        bind_addr: String,
        weights_path: String,
        storage_root: String,
        database_url: String,
        confidence_threshold: f32,
        threads: Option<usize>,
    ) -> Result<Self> {
        let cpu_cores = num_cpus::get();

        let onnx_config = OnnxConfig {
            intra_threads: threads.unwrap_or((cpu_cores * 3 / 4).max(1)),
            optimization_level: 3,
        };

        let server_config = ServerConfig {
            // 视频逐帧推理耗时较长，超时要覆盖整段处理
            request_timeout: 300,
            max_request_size: 100 * 1024 * 1024, // 100MB
        };

        Ok(Self {
            bind_addr,
            weights_path: PathBuf::from(weights_path),
            storage_root: PathBuf::from(storage_root),
            database_url,
            confidence_threshold,
            onnx_config,
            server_config,
        })
    }

    /// 上传文件目录
    pub fn uploads_dir(&self) -> PathBuf {
        self.storage_root.join("uploads")
    }

    /// 标注产物目录
    pub fn detections_dir(&self) -> PathBuf {
        self.storage_root.join("detections")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_dirs_under_root() {
        let config = Config::new(
            "127.0.0.1:8000".to_string(),
            "weights/best.onnx".to_string(),
            "static".to_string(),
            "sqlite://users.db?mode=rwc".to_string(),
            0.6,
            Some(2),
        )
        .unwrap();

        assert_eq!(config.uploads_dir(), PathBuf::from("static/uploads"));
        assert_eq!(config.detections_dir(), PathBuf::from("static/detections"));
        assert_eq!(config.onnx_config.intra_threads, 2);
    }
}
