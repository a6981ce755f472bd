// 上传错误类型
//
// 单次请求的失败（超时、网络、服务端错误）都视为暂时性错误，由重试循环吸收；
// 只有重试耗尽或本地读取失败才会作为终止性错误向上传播

use std::time::Duration;

/// 单次分片请求失败（可重试）
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransmitError {
    /// 请求超时
    #[error("请求超时（{}ms）", .0.as_millis())]
    Timeout(Duration),
    /// 连接层面的网络错误
    #[error("网络错误: {0}")]
    Network(String),
    /// 服务端返回非成功状态码
    #[error("{message}")]
    Server { status: u16, message: String },
}

/// 文件上传失败（终止性）
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// 分片重试次数耗尽
    #[error("分片 #{chunk_index} 上传失败（已尝试 {attempts} 次）: {last_error}")]
    ChunkExhausted {
        filename: String,
        chunk_index: usize,
        attempts: u32,
        #[source]
        last_error: TransmitError,
    },
    /// 读取本地分片数据失败
    #[error("读取文件 {filename} 失败: {source}")]
    Read {
        filename: String,
        #[source]
        source: std::io::Error,
    },
}

impl UploadError {
    /// 出错的文件名
    pub fn filename(&self) -> &str {
        match self {
            UploadError::ChunkExhausted { filename, .. } | UploadError::Read { filename, .. } => {
                filename
            }
        }
    }
}

/// 批量上传中止
#[derive(Debug, thiserror::Error)]
#[error("上传文件 \"{filename}\" 失败: {error}")]
pub struct BatchFailure {
    /// 失败的文件名
    pub filename: String,
    /// 失败文件在批次中的位置
    pub file_index: usize,
    /// 底层错误
    #[source]
    pub error: UploadError,
}
