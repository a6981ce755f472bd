// 上传会话
//
// 每个文件一次上传对应一个会话，会话随文件完成或失败而丢弃，不做持久化

use rand::Rng;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 等待发送下一个分片
    Pending,
    /// 分片请求进行中
    InFlight,
    /// 文件已完成
    Complete,
    /// 文件失败
    Failed,
}

/// 生成 upload_id
///
/// 格式：`<毫秒时间戳>-<随机数>-<文件名>`，文件名中的连续空白替换为 `_`，
/// 方便在服务端日志中辨认。只需在同一进程内区分并发提交，不作为安全边界
pub fn generate_upload_id(file_name: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000_000);
    format!("{}-{}-{}", millis, nonce, normalize_file_name(file_name))
}

/// 连续空白折叠为一个 `_`
pub fn normalize_file_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_whitespace = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                out.push('_');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

/// 上传会话
#[derive(Debug, Clone)]
pub struct UploadSession {
    upload_id: String,
    total_chunks: usize,
    next_chunk_index: usize,
    state: SessionState,
}

impl UploadSession {
    /// 创建新会话，`total_chunks` 至少为 1
    pub fn new(upload_id: String, total_chunks: usize) -> Self {
        Self {
            upload_id,
            total_chunks: total_chunks.max(1),
            next_chunk_index: 0,
            state: SessionState::Pending,
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn total_chunks(&self) -> usize {
        self.total_chunks
    }

    /// 下一个待发送的分片索引（也等于已确认的分片数）
    pub fn next_chunk_index(&self) -> usize {
        self.next_chunk_index
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// 标记分片请求开始
    pub fn mark_in_flight(&mut self) {
        self.state = SessionState::InFlight;
    }

    /// 当前分片已被服务端确认，前进到下一个分片
    ///
    /// # 返回
    /// 是否所有分片都已确认
    pub fn advance(&mut self) -> bool {
        self.next_chunk_index += 1;
        self.state = SessionState::Pending;
        self.is_exhausted()
    }

    /// 索引计数是否已到达分片总数
    pub fn is_exhausted(&self) -> bool {
        self.next_chunk_index >= self.total_chunks
    }

    /// 标记为已完成
    pub fn mark_complete(&mut self) {
        self.state = SessionState::Complete;
    }

    /// 标记为失败
    pub fn mark_failed(&mut self) {
        self.state = SessionState::Failed;
    }
}
