// 配置管理模块

use crate::uploader::chunk::DEFAULT_UPLOAD_CHUNK_SIZE;
use crate::uploader::transmitter::{
    RetryPolicy, DEFAULT_BACKOFF_BASE_MS, DEFAULT_BACKOFF_JITTER_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_REQUEST_TIMEOUT_MS,
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（按天滚动，最多保留这么多个文件，默认 7）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
}

// 命令行工具默认只输出到控制台
fn default_log_enabled() -> bool {
    false
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadConfig {
    /// 分片上传接口地址
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// 分片大小（字节）
    #[serde(default = "default_chunk_size_bytes")]
    pub chunk_size_bytes: u64,
    /// 单次请求超时（毫秒）
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 每个分片的最大尝试次数（含首次请求）
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 服务端目标目录
    #[serde(default = "default_target_dir")]
    pub target_dir: String,
    /// 初始退避延迟（毫秒）
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// 退避随机抖动上限（毫秒）
    #[serde(default = "default_backoff_jitter_ms")]
    pub backoff_jitter_ms: u64,
}

fn default_endpoint() -> String {
    "http://127.0.0.1:5000/upload_chunk".to_string()
}

fn default_chunk_size_bytes() -> u64 {
    DEFAULT_UPLOAD_CHUNK_SIZE
}

fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_target_dir() -> String {
    "mzML_samples".to_string()
}

fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

fn default_backoff_jitter_ms() -> u64 {
    DEFAULT_BACKOFF_JITTER_MS
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            chunk_size_bytes: default_chunk_size_bytes(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            target_dir: default_target_dir(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_jitter_ms: default_backoff_jitter_ms(),
        }
    }
}

impl UploadConfig {
    /// 校验上传配置
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            anyhow::bail!("上传接口地址不能为空");
        }
        if self.chunk_size_bytes == 0 {
            anyhow::bail!("分片大小必须大于 0");
        }
        if self.request_timeout_ms == 0 {
            anyhow::bail!("请求超时必须大于 0");
        }
        if self.max_retries == 0 {
            anyhow::bail!("最大尝试次数必须大于 0");
        }
        Ok(())
    }

    /// 单次请求超时
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// 转换为分片重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_jitter: Duration::from_millis(self.backoff_jitter_ms),
            request_timeout: self.request_timeout(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传配置验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.upload.validate().context("保存配置失败：上传配置无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {:?}", path);

        Ok(())
    }

    /// 加载配置文件；文件不存在时使用默认配置
    ///
    /// 文件存在但无法解析或校验失败时返回错误
    pub async fn load_if_present(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let exists = fs::try_exists(path)
            .await
            .with_context(|| format!("Failed to access config file: {:?}", path))?;

        if !exists {
            tracing::info!("配置文件不存在，使用默认配置: {:?}", path);
            return Ok(Self::default());
        }

        let config = Self::load_from_file(path).await?;
        tracing::info!("配置文件加载成功: {:?}", path);
        Ok(config)
    }
}
