use anyhow::Context;
use chunk_uploader::{
    config::{AppConfig, LogConfig, DEFAULT_CONFIG_PATH},
    logging, BatchUploader, HttpChunkTransport, SelectedFile, UploadEngine, UploadSinks,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// 分片上传客户端
#[derive(Parser, Debug)]
#[command(name = "chunk-uploader", version, about = "按顺序分片上传本地文件")]
struct Args {
    /// 配置文件路径
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// 覆盖配置中的上传接口地址
    #[arg(long)]
    endpoint: Option<String>,

    /// 覆盖配置中的服务端目标目录
    #[arg(long)]
    target_dir: Option<String>,

    /// 覆盖配置中的分片大小（字节）
    #[arg(long)]
    chunk_size: Option<u64>,

    /// 完成后以 JSON 输出批次结果
    #[arg(long)]
    json: bool,

    /// 待上传的文件，按给定顺序上传
    #[arg(required = true, num_args = 1..)]
    files: Vec<PathBuf>,
}

/// 加载日志配置
///
/// 只读取配置文件中的 [log] 表，失败时返回默认配置
async fn load_log_config(config_path: &Path) -> LogConfig {
    if let Ok(content) = tokio::fs::read_to_string(config_path).await {
        if let Ok(config) = toml::from_str::<toml::Value>(&content) {
            if let Some(log_table) = config.get("log") {
                if let Ok(log_config) = log_table.clone().try_into::<LogConfig>() {
                    return log_config;
                }
            }
        }
    }

    LogConfig::default()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 先初始化日志（必须保持 _log_guard 存活）
    let log_config = load_log_config(&args.config).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("chunk-uploader v{} 启动", env!("CARGO_PKG_VERSION"));

    let mut config = AppConfig::load_if_present(&args.config).await?;
    if let Some(endpoint) = args.endpoint {
        config.upload.endpoint = endpoint;
    }
    if let Some(target_dir) = args.target_dir {
        config.upload.target_dir = target_dir;
    }
    if let Some(chunk_size) = args.chunk_size {
        config.upload.chunk_size_bytes = chunk_size;
    }
    config.upload.validate().context("上传配置无效")?;

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(SelectedFile::from_path(path).await?);
    }

    let transport = HttpChunkTransport::new(config.upload.endpoint.clone())?;
    info!(
        "上传接口: {}, 目标目录: {}, 分片大小: {} 字节, 文件数: {}",
        transport.endpoint(),
        config.upload.target_dir,
        config.upload.chunk_size_bytes,
        files.len()
    );

    let engine = UploadEngine::from_config(Arc::new(transport), &config.upload);
    // 失败信息由 main 返回的错误统一输出
    let json = args.json;
    let sinks = UploadSinks::new()
        .with_progress(move |percent| {
            if !json {
                println!("上传进度: {}%", percent);
            }
        })
        .with_completion(move |summary| {
            if json {
                return;
            }
            println!(
                "全部上传完成: {} 个文件, {} 字节",
                summary.files.len(),
                summary.uploaded_bytes
            );
            for report in &summary.files {
                match &report.stored_path {
                    Some(stored) => println!("  {} -> {}", report.file_name, stored),
                    None => println!("  {}", report.file_name),
                }
            }
        });

    let summary = BatchUploader::new(engine, sinks).run(&files).await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("序列化上传结果失败")?
        );
    }

    Ok(())
}
