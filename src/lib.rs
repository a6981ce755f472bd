// Chunk Uploader Library
// 顺序分片上传客户端核心库

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// 分片上传模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, LogConfig, UploadConfig};
pub use uploader::{
    BatchFailure, BatchProgress, BatchSummary, BatchUploader, ChunkMetadata, ChunkSource,
    ChunkTransport, FileReport, HttpChunkTransport, RetryPolicy, SelectedFile, ServerAck,
    TransmitError, UploadEngine, UploadError, UploadSinks,
};
