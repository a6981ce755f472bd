// 上传引擎
//
// 负责单个文件的上传过程：
// 1. 生成 upload_id，计算分片计划
// 2. 严格按索引顺序逐个发送分片（上一个分片确认或最终失败前不发送下一个）
// 3. 每个分片确认后上报其字节数
// 4. 服务端声明 complete 或分片计数到达总数时，文件完成

use crate::config::UploadConfig;
use crate::uploader::chunk::plan_chunks;
use crate::uploader::error::UploadError;
use crate::uploader::session::{generate_upload_id, UploadSession};
use crate::uploader::source::SelectedFile;
use crate::uploader::transmitter::ChunkTransmitter;
use crate::uploader::transport::{ChunkMetadata, ChunkTransport};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};

/// 单个文件的上传结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileReport {
    /// 文件名
    pub file_name: String,
    /// 上传会话 ID
    pub upload_id: String,
    /// 文件大小
    pub size: u64,
    /// 计划分片数
    pub total_chunks: usize,
    /// 已确认的分片数
    pub chunks_sent: usize,
    /// 是否由服务端声明完成
    pub completed_by_server: bool,
    /// 服务端返回的文件存放路径
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_path: Option<String>,
}

/// 上传引擎
#[derive(Clone)]
pub struct UploadEngine {
    transmitter: ChunkTransmitter,
    chunk_size: u64,
    target_dir: String,
}

impl UploadEngine {
    /// 创建上传引擎
    ///
    /// # 参数
    /// * `transmitter` - 分片发送器
    /// * `chunk_size` - 分片大小，必须大于 0
    /// * `target_dir` - 服务端目标目录
    pub fn new(transmitter: ChunkTransmitter, chunk_size: u64, target_dir: impl Into<String>) -> Self {
        Self {
            transmitter,
            chunk_size,
            target_dir: target_dir.into(),
        }
    }

    /// 根据上传配置创建
    pub fn from_config(transport: Arc<dyn ChunkTransport>, config: &UploadConfig) -> Self {
        let transmitter = ChunkTransmitter::new(transport, config.retry_policy());
        Self::new(transmitter, config.chunk_size_bytes, config.target_dir.clone())
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// 上传一个文件
    ///
    /// # 参数
    /// * `file` - 待上传文件
    /// * `on_chunk_acked` - 每个分片被服务端确认后调用一次，参数为该分片字节数
    pub async fn upload_file<F>(
        &self,
        file: &SelectedFile,
        mut on_chunk_acked: F,
    ) -> Result<FileReport, UploadError>
    where
        F: FnMut(u64),
    {
        let plan = plan_chunks(file.size(), self.chunk_size);
        let mut session = UploadSession::new(generate_upload_id(file.name()), plan.len());

        info!(
            "开始上传: file={}, size={}, 分片数={}, upload_id={}",
            file.name(),
            file.size(),
            plan.len(),
            session.upload_id()
        );

        let mut meta = ChunkMetadata {
            upload_id: session.upload_id().to_string(),
            filename: file.name().to_string(),
            chunk_index: 0,
            total_chunks: plan.len(),
            target_dir: self.target_dir.clone(),
        };
        let mut completed_by_server = false;
        let mut stored_path = None;

        while let Some(chunk) = plan.get(session.next_chunk_index()) {
            session.mark_in_flight();

            let data = match file.read_chunk(chunk).await {
                Ok(data) => Bytes::from(data),
                Err(source) => {
                    session.mark_failed();
                    error!("读取分片 #{} 失败: file={}, 错误: {}", chunk.index, file.name(), source);
                    return Err(UploadError::Read {
                        filename: file.name().to_string(),
                        source,
                    });
                }
            };

            meta.chunk_index = chunk.index;
            let ack = match self.transmitter.send(data, &meta).await {
                Ok(ack) => ack,
                Err(e) => {
                    session.mark_failed();
                    error!("文件上传失败: file={}, 错误: {}", file.name(), e);
                    return Err(e);
                }
            };

            on_chunk_acked(chunk.size());
            session.advance();

            if ack.file_path.is_some() {
                stored_path = ack.file_path.clone();
            }
            if ack.is_complete() {
                // 服务端已组装完成，剩余分片不再发送
                completed_by_server = true;
                break;
            }
        }

        session.mark_complete();
        info!(
            "上传完成: file={}, 已确认分片 {}/{}, 服务端确认={}",
            file.name(),
            session.next_chunk_index(),
            session.total_chunks(),
            completed_by_server
        );

        Ok(FileReport {
            file_name: file.name().to_string(),
            upload_id: session.upload_id().to_string(),
            size: file.size(),
            total_chunks: session.total_chunks(),
            chunks_sent: session.next_chunk_index(),
            completed_by_server,
            stored_path,
        })
    }
}
