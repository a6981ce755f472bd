// 测试用的脚本化传输层
//
// 按预设顺序返回响应，并记录每次请求，用于验证发送顺序与重试次数

use crate::uploader::error::TransmitError;
use crate::uploader::transport::{ChunkMetadata, ChunkTransport, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::Mutex;

/// 预设的单次响应
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// 成功状态码 + 响应体
    Ok(String),
    /// 指定状态码 + 响应体
    Status(u16, String),
    /// 连接失败
    NetworkDown,
    /// 永不返回（触发超时）
    Hang,
}

impl Reply {
    pub(crate) fn empty_ok() -> Self {
        Reply::Ok(String::new())
    }

    pub(crate) fn complete() -> Self {
        Reply::Ok(r#"{"status":"complete"}"#.to_string())
    }

    pub(crate) fn server_error(message: &str) -> Self {
        Reply::Status(500, format!(r#"{{"status":"error","error":"{}"}}"#, message))
    }
}

/// 一次已发出的请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub meta: ChunkMetadata,
    pub len: usize,
    pub data: Bytes,
}

/// 脚本化传输层
///
/// 预设响应用完后一律返回 `fallback`
pub(crate) struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedTransport {
    pub(crate) fn new(script: Vec<Reply>, fallback: Reply) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 所有请求都成功（空响应体）
    pub(crate) fn always_ok() -> Self {
        Self::new(Vec::new(), Reply::empty_ok())
    }

    pub(crate) fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// (文件名, 分片索引) 发送顺序
    pub(crate) fn trace(&self) -> Vec<(String, usize)> {
        self.calls()
            .into_iter()
            .map(|c| (c.meta.filename, c.meta.chunk_index))
            .collect()
    }
}

#[async_trait]
impl ChunkTransport for ScriptedTransport {
    async fn post_chunk(
        &self,
        meta: &ChunkMetadata,
        data: Bytes,
    ) -> Result<TransportResponse, TransmitError> {
        self.calls.lock().unwrap().push(RecordedCall {
            meta: meta.clone(),
            len: data.len(),
            data,
        });

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Ok(body) => Ok(TransportResponse::new(200, body)),
            Reply::Status(status, body) => Ok(TransportResponse::new(status, body)),
            Reply::NetworkDown => Err(TransmitError::Network("connection refused".to_string())),
            Reply::Hang => std::future::pending().await,
        }
    }
}
