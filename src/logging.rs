//! 日志系统配置
//!
//! 控制台输出始终开启。启用文件日志时按天滚动写入 `chunk-uploader.YYYY-MM-DD.log`，
//! 超出保留数量的旧文件由 tracing-appender 在滚动时删除

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const LOG_FILE_PREFIX: &str = "chunk-uploader";
const LOG_FILE_SUFFIX: &str = "log";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 日志系统守卫
/// 必须保持存活，否则缓冲中的文件日志会丢失
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 创建按天滚动的日志文件写入器
///
/// 最多保留 `retention_days` 个文件（至少 1 个）
fn daily_appender(log_dir: &Path, retention_days: u32) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("创建日志目录失败: {:?}", log_dir))?;

    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(retention_days.max(1) as usize)
        .build(log_dir)
        .with_context(|| format!("创建日志文件失败: {:?}", log_dir))
}

/// 初始化日志系统
///
/// `RUST_LOG` 优先于配置中的级别；文件日志创建失败时只输出到控制台
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()));

    let appender = if config.enabled {
        match daily_appender(&config.log_dir, config.retention_days) {
            Ok(appender) => Some(appender),
            Err(e) => {
                eprintln!("{:#}，仅输出到控制台", e);
                None
            }
        }
    } else {
        None
    };

    let (file_layer, file_guard) = match appender {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_timer(ChronoLocal::new(TIMESTAMP_FORMAT.to_string()))
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let file_enabled = file_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if file_enabled {
        tracing::info!(
            "文件日志已启用: 目录={:?}, 保留={} 天, 级别={}",
            config.log_dir,
            config.retention_days.max(1),
            config.level
        );
    }

    LogGuard {
        _file_guard: file_guard,
    }
}
