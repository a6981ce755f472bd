// 分片上传模块
//
// 分层结构：
// - chunk: 分片计划
// - session: upload_id 与单文件会话状态
// - source: 分片数据来源（本地文件 / 内存）
// - transport: HTTP 传输与响应分类
// - transmitter: 超时 + 指数退避重试
// - engine: 单文件顺序上传
// - batch: 多文件批次与整体进度

pub mod batch;
pub mod chunk;
pub mod engine;
pub mod error;
pub mod session;
pub mod source;
pub mod transmitter;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

pub use batch::{BatchProgress, BatchSummary, BatchUploader, UploadSinks};
pub use chunk::{chunk_count, plan_chunks, ChunkDescriptor, DEFAULT_UPLOAD_CHUNK_SIZE};
pub use engine::{FileReport, UploadEngine};
pub use error::{BatchFailure, TransmitError, UploadError};
pub use session::{generate_upload_id, normalize_file_name, SessionState, UploadSession};
pub use source::{ChunkSource, LocalFileSource, MemorySource, SelectedFile};
pub use transmitter::{ChunkTransmitter, RetryPolicy};
pub use transport::{
    classify_response, ChunkMetadata, ChunkTransport, HttpChunkTransport, ServerAck,
    TransportResponse,
};
