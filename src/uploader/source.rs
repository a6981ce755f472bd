// 待上传文件
//
// SelectedFile 只持有文件名、大小和一个按字节区间读取的数据源，
// 上传过程中只读不写

use crate::uploader::chunk::ChunkDescriptor;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::fmt;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// 按字节区间读取数据的数据源
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// 读取 `range` 范围内的全部字节
    async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>>;
}

/// 本地磁盘文件
#[derive(Debug, Clone)]
pub struct LocalFileSource {
    path: PathBuf,
}

impl LocalFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ChunkSource for LocalFileSource {
    async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let mut file = File::open(&self.path).await?;

        // 定位到分片起始位置
        file.seek(io::SeekFrom::Start(range.start)).await?;

        let mut buffer = vec![0u8; (range.end - range.start) as usize];
        file.read_exact(&mut buffer).await?;

        debug!(
            "读取分片数据: path={:?}, bytes={}..{}, 大小={} bytes",
            self.path,
            range.start,
            range.end,
            buffer.len()
        );

        Ok(buffer)
    }
}

/// 内存中的数据
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    async fn read_range(&self, range: Range<u64>) -> io::Result<Vec<u8>> {
        let start = range.start as usize;
        let end = range.end as usize;
        self.data
            .get(start..end)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("区间 {}..{} 超出数据长度 {}", start, end, self.data.len()),
                )
            })
    }
}

/// 用户选择的待上传文件
#[derive(Clone)]
pub struct SelectedFile {
    name: String,
    size: u64,
    source: Arc<dyn ChunkSource>,
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl SelectedFile {
    /// 使用任意数据源创建
    pub fn new(name: impl Into<String>, size: u64, source: Arc<dyn ChunkSource>) -> Self {
        Self {
            name: name.into(),
            size,
            source,
        }
    }

    /// 从本地路径创建，文件名取路径最后一段
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("读取文件信息失败: {:?}", path))?;
        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("无法从路径获取文件名: {:?}", path))?;

        Ok(Self::new(
            name,
            metadata.len(),
            Arc::new(LocalFileSource::new(path)),
        ))
    }

    /// 从内存数据创建
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self::new(name, size, Arc::new(MemorySource::new(data)))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// 读取一个分片的数据
    pub async fn read_chunk(&self, chunk: &ChunkDescriptor) -> io::Result<Vec<u8>> {
        self.source.read_range(chunk.range.clone()).await
    }
}
