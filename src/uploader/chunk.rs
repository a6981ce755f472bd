// 上传分片规划
//
// 分片规则：
// - 分片按字节区间顺序切分，互不重叠、首尾相接，恰好覆盖 [0, 文件大小)
// - 最后一个分片可以小于分片大小
// - 空文件也产生一个长度为 0 的分片（服务端需要收到它才能完成组装）

use std::ops::Range;

/// 默认上传分片大小: 2MB
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// 上传分片描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// 分片索引（从 0 开始）
    pub index: usize,
    /// 字节范围
    pub range: Range<u64>,
    /// 是否为最后一个分片
    pub is_last: bool,
}

impl ChunkDescriptor {
    /// 分片大小
    pub fn size(&self) -> u64 {
        self.range.end - self.range.start
    }
}

/// 计算分片数量，至少为 1
pub fn chunk_count(total_size: u64, chunk_size: u64) -> usize {
    total_size.div_ceil(chunk_size).max(1) as usize
}

/// 计算文件的分片计划
///
/// # 参数
/// * `total_size` - 文件总大小
/// * `chunk_size` - 分片大小，必须大于 0（由 `UploadConfig::validate` 保证）
///
/// # 返回
/// 按索引递增排列的分片列表
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    debug_assert!(chunk_size > 0, "分片大小必须大于 0");

    let count = chunk_count(total_size, chunk_size);
    (0..count)
        .map(|index| {
            let start = (index as u64).saturating_mul(chunk_size).min(total_size);
            let end = start.saturating_add(chunk_size).min(total_size);
            ChunkDescriptor {
                index,
                range: start..end,
                is_last: index + 1 == count,
            }
        })
        .collect()
}
