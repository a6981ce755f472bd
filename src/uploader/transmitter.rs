// 分片发送器
//
// 核心功能：
// 1. 单次请求超时（每次尝试独立计时，超时即丢弃请求 future，释放连接）
// 2. 响应分类
// 3. 指数退避 + 随机抖动重试同一个分片
//
// 不修改任何共享进度状态，结果交给调用方记账

use crate::uploader::error::{TransmitError, UploadError};
use crate::uploader::transport::{classify_response, ChunkMetadata, ChunkTransport, ServerAck};
use bytes::Bytes;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

// =====================================================
// 重试配置
// =====================================================

/// 默认最大尝试次数（含首次请求）
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// 初始退避延迟（毫秒）
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 500;

/// 随机抖动上限（毫秒，不含）
pub const DEFAULT_BACKOFF_JITTER_MS: u64 = 200;

/// 单次请求超时（毫秒）
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次请求）
    pub max_attempts: u32,
    /// 初始退避延迟
    pub base_delay: Duration,
    /// 随机抖动上限
    pub max_jitter: Duration,
    /// 单次请求超时
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_BASE_MS),
            max_jitter: Duration::from_millis(DEFAULT_BACKOFF_JITTER_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次尝试失败后的退避基数（不含抖动）
    ///
    /// # 延迟序列（默认配置）
    /// - attempt=1: 500ms
    /// - attempt=2: 1000ms
    /// - attempt=3: 2000ms
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// 退避基数加上给定抖动
    pub fn backoff_delay(&self, attempt: u32, jitter: Duration) -> Duration {
        self.base_backoff(attempt).saturating_add(jitter)
    }

    /// 在 [0, max_jitter) 内随机取一个抖动
    fn random_jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
    }
}

// =====================================================
// 分片发送器
// =====================================================

/// 分片发送器
#[derive(Clone)]
pub struct ChunkTransmitter {
    transport: Arc<dyn ChunkTransport>,
    policy: RetryPolicy,
}

impl ChunkTransmitter {
    pub fn new(transport: Arc<dyn ChunkTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    /// 发送一个分片，失败时重试同一个分片
    ///
    /// 每次尝试共享同一块缓冲区，不复制分片数据
    ///
    /// # 返回
    /// 服务端确认，或尝试次数耗尽后的 `UploadError::ChunkExhausted`
    pub async fn send(&self, data: Bytes, meta: &ChunkMetadata) -> Result<ServerAck, UploadError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.send_once(data.clone(), meta).await {
                Ok(ack) => {
                    debug!(
                        "[分片#{}] ✓ 已确认 (第 {} 次尝试, upload_id={})",
                        meta.chunk_index, attempt, meta.upload_id
                    );
                    return Ok(ack);
                }
                Err(e) if attempt < max_attempts => {
                    let delay = self
                        .policy
                        .backoff_delay(attempt, self.policy.random_jitter());
                    warn!(
                        "[分片#{}] 上传失败，等待 {}ms 后重试 ({}/{}): {}",
                        meta.chunk_index,
                        delay.as_millis(),
                        attempt,
                        max_attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        "[分片#{}] 上传失败，已达最大尝试次数 ({}): {}",
                        meta.chunk_index, max_attempts, e
                    );
                    return Err(UploadError::ChunkExhausted {
                        filename: meta.filename.clone(),
                        chunk_index: meta.chunk_index,
                        attempts: attempt,
                        last_error: e,
                    });
                }
            }
        }
    }

    /// 单次尝试：超时控制 + 响应分类
    async fn send_once(&self, data: Bytes, meta: &ChunkMetadata) -> Result<ServerAck, TransmitError> {
        let timeout = self.policy.request_timeout;
        let response =
            match tokio::time::timeout(timeout, self.transport.post_chunk(meta, data))
                .await
            {
                Ok(result) => result?,
                Err(_) => return Err(TransmitError::Timeout(timeout)),
            };

        classify_response(&response)
    }
}
