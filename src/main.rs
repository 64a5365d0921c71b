use anyhow::Result;
use clap::Parser;
use ppe_detect::{config::Config, web::serve};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ppe-detect")]
#[command(about = "ONNX-powered PPE detection service")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Path to the ONNX model weights
    #[arg(long, default_value = "weights/best.onnx")]
    weights: String,

    /// Root directory for uploads and annotated artifacts
    #[arg(long, default_value = "static")]
    storage: String,

    /// SQLite connection string
    #[arg(long, default_value = "sqlite://users.db?mode=rwc")]
    database_url: String,

    /// Minimum confidence for reported detections
    #[arg(long, default_value_t = 0.60)]
    confidence: f32,

    /// Number of ONNX intra-op threads
    #[arg(long)]
    threads: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    tracing::info!("Starting PPE detection service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Model weights: {}", args.weights);
    tracing::info!("Storage root: {}", args.storage);

    // 创建配置
    let config = Config::new(
        args.bind,
        args.weights,
        args.storage,
        args.database_url,
        args.confidence,
        args.threads,
    )?;

    // 启动服务器
    serve(config).await?;

    Ok(())
}
