// 分片传输层
//
// 负责把一个分片作为 multipart 表单 POST 到上传接口，并把 HTTP 响应分类为
// 服务端确认（ServerAck）或可重试错误（TransmitError）。超时与重试由上层处理

use crate::uploader::error::TransmitError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

/// 分片请求元数据（与分片数据一起作为表单字段发送）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkMetadata {
    /// 上传会话 ID
    pub upload_id: String,
    /// 原始文件名
    pub filename: String,
    /// 分片索引（从 0 开始）
    pub chunk_index: usize,
    /// 分片总数
    pub total_chunks: usize,
    /// 服务端目标目录
    pub target_dir: String,
}

/// 原始 HTTP 响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 服务端对分片的确认
///
/// 响应体为空或无法解析时所有字段均为 None，此时由分片计数判断文件是否完成
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerAck {
    /// "complete" / "incomplete"
    pub status: Option<String>,
    /// 服务端组装后的文件路径
    pub file_path: Option<String>,
    /// 服务端已收到的分片数
    pub received: Option<u64>,
    /// 服务端期望的分片总数
    pub total: Option<u64>,
}

impl ServerAck {
    /// 服务端是否声明文件已组装完成
    pub fn is_complete(&self) -> bool {
        self.status.as_deref() == Some("complete")
    }

    fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Self {
                status: map.get("status").and_then(Value::as_str).map(str::to_owned),
                file_path: map
                    .get("file_path")
                    .and_then(Value::as_str)
                    .map(str::to_owned),
                received: map.get("received").and_then(Value::as_u64),
                total: map.get("total").and_then(Value::as_u64),
            },
            _ => Self::default(),
        }
    }
}

/// 分类响应
///
/// - 成功状态码：解析确认体，解析失败按空确认处理
/// - 其他状态码：提取可读错误信息，作为可重试的服务端错误
pub fn classify_response(response: &TransportResponse) -> Result<ServerAck, TransmitError> {
    if response.is_success() {
        Ok(ServerAck::from_body(&response.body))
    } else {
        Err(TransmitError::Server {
            status: response.status,
            message: extract_error_message(response.status, &response.body),
        })
    }
}

/// 从错误响应体中提取可读信息
///
/// 优先取 JSON 的 `error` 字段；JSON 中没有该字段时使用原始响应体；
/// 响应体为空或不是 JSON 时返回通用的状态码提示
fn extract_error_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("服务器返回状态码 {}", status);
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => match value.get("error").and_then(Value::as_str) {
            Some(message) if !message.is_empty() => message.to_string(),
            _ => trimmed.to_string(),
        },
        Err(_) => format!("服务器返回状态码 {}", status),
    }
}

/// 分片传输
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    /// 发送一次分片请求
    ///
    /// 只负责单次请求，不做重试；调用方丢弃返回的 future 即中止请求
    async fn post_chunk(
        &self,
        meta: &ChunkMetadata,
        data: Bytes,
    ) -> Result<TransportResponse, TransmitError>;
}

/// 基于 reqwest 的 HTTP 分片传输
#[derive(Debug, Clone)]
pub struct HttpChunkTransport {
    client: Client,
    endpoint: String,
}

impl HttpChunkTransport {
    /// 创建传输层
    ///
    /// # 参数
    /// * `endpoint` - 分片上传接口地址，如 `http://127.0.0.1:5000/upload_chunk`
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("chunk-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("创建 HTTP 客户端失败")?;
        Ok(Self::with_client(client, endpoint))
    }

    /// 使用已有的 HTTP 客户端
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn network_error(err: reqwest::Error) -> TransmitError {
    TransmitError::Network(err.to_string())
}

#[async_trait]
impl ChunkTransport for HttpChunkTransport {
    async fn post_chunk(
        &self,
        meta: &ChunkMetadata,
        data: Bytes,
    ) -> Result<TransportResponse, TransmitError> {
        let size = data.len();

        // 构建 multipart form
        let part = multipart::Part::stream_with_length(data, size as u64)
            .file_name(meta.filename.clone())
            .mime_str("application/octet-stream")
            .map_err(network_error)?;

        let form = multipart::Form::new()
            .part("chunk", part)
            .text("filename", meta.filename.clone())
            .text("upload_id", meta.upload_id.clone())
            .text("chunk_index", meta.chunk_index.to_string())
            .text("total_chunks", meta.total_chunks.to_string())
            .text("target_dir", meta.target_dir.clone());

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(network_error)?;

        debug!(
            "分片响应: upload_id={}, chunk={}/{}, size={}, status={}, body={}",
            meta.upload_id, meta.chunk_index, meta.total_chunks, size, status, body
        );

        Ok(TransportResponse { status, body })
    }
}
