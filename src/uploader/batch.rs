// 批量上传
//
// 按选择顺序逐个上传文件（不并发、不重排），按字节聚合整体进度：
// - 进度是跨文件连续的一条进度条，不按文件重置
// - 任一文件最终失败即中止整个批次，后续文件不再开始
// - 完成回调与错误回调各自最多调用一次，且互斥

use crate::uploader::engine::{FileReport, UploadEngine};
use crate::uploader::error::{BatchFailure, UploadError};
use crate::uploader::source::SelectedFile;
use serde::Serialize;
use tracing::{error, info};

/// 进度回调，参数为 0-100 的整数百分比
pub type ProgressSink = Box<dyn Fn(u8) + Send + Sync>;

/// 完成回调
pub type CompletionSink = Box<dyn Fn(&BatchSummary) + Send + Sync>;

/// 错误回调，参数为失败文件名与错误
pub type ErrorSink = Box<dyn Fn(&str, &UploadError) + Send + Sync>;

/// 批量上传的外部回调
pub struct UploadSinks {
    on_progress: ProgressSink,
    on_complete: CompletionSink,
    on_error: ErrorSink,
}

impl Default for UploadSinks {
    fn default() -> Self {
        Self {
            on_progress: Box::new(|_| {}),
            on_complete: Box::new(|_| {}),
            on_error: Box::new(|_, _| {}),
        }
    }
}

impl UploadSinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, f: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.on_progress = Box::new(f);
        self
    }

    pub fn with_completion(mut self, f: impl Fn(&BatchSummary) + Send + Sync + 'static) -> Self {
        self.on_complete = Box::new(f);
        self
    }

    pub fn with_error(mut self, f: impl Fn(&str, &UploadError) + Send + Sync + 'static) -> Self {
        self.on_error = Box::new(f);
        self
    }
}

/// 批次整体进度
///
/// 只有服务端确认过的分片才计入 `uploaded_bytes`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    total_bytes: u64,
    uploaded_bytes: u64,
}

impl BatchProgress {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            uploaded_bytes: 0,
        }
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes
    }

    /// 记录一个已确认分片的字节数，返回最新百分比
    pub fn record(&mut self, bytes: u64) -> u8 {
        self.uploaded_bytes = self
            .uploaded_bytes
            .saturating_add(bytes)
            .min(self.total_bytes);
        self.percent()
    }

    /// 向下取整的百分比；总字节数为 0 时为 0
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        (self.uploaded_bytes as u128 * 100 / self.total_bytes as u128) as u8
    }

    /// 已上传字节数是否等于总字节数
    pub fn is_finished(&self) -> bool {
        self.uploaded_bytes == self.total_bytes
    }
}

/// 批量上传结果
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BatchSummary {
    /// 所有文件总字节数
    pub total_bytes: u64,
    /// 已确认字节数
    pub uploaded_bytes: u64,
    /// 各文件结果（按选择顺序）
    pub files: Vec<FileReport>,
}

impl BatchSummary {
    /// 已上传的文件名（按选择顺序），用于后续提交
    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.file_name.as_str()).collect()
    }
}

/// 批量上传器
pub struct BatchUploader {
    engine: UploadEngine,
    sinks: UploadSinks,
}

impl BatchUploader {
    pub fn new(engine: UploadEngine, sinks: UploadSinks) -> Self {
        Self { engine, sinks }
    }

    /// 依次上传所有文件
    ///
    /// # 返回
    /// 全部成功返回批次结果；任一文件失败返回第一个失败的文件及其错误
    pub async fn run(&self, files: &[SelectedFile]) -> Result<BatchSummary, BatchFailure> {
        let total_bytes = files.iter().map(SelectedFile::size).sum();
        let mut progress = BatchProgress::new(total_bytes);
        (self.sinks.on_progress)(0);

        info!(
            "开始批量上传: 文件数={}, 总大小={} bytes, 分片大小={} bytes",
            files.len(),
            total_bytes,
            self.engine.chunk_size()
        );

        let mut reports = Vec::with_capacity(files.len());
        for (file_index, file) in files.iter().enumerate() {
            let on_progress = &self.sinks.on_progress;
            let result = self
                .engine
                .upload_file(file, |bytes| on_progress(progress.record(bytes)))
                .await;

            match result {
                Ok(report) => reports.push(report),
                Err(error) => {
                    error!(
                        "批量上传中止: 文件 #{} ({}) 失败, 已上传 {}/{} bytes: {}",
                        file_index,
                        file.name(),
                        progress.uploaded_bytes(),
                        progress.total_bytes(),
                        error
                    );
                    (self.sinks.on_error)(file.name(), &error);
                    return Err(BatchFailure {
                        filename: file.name().to_string(),
                        file_index,
                        error,
                    });
                }
            }
        }

        // 整数百分比向下取整，全部上传后补一次 100
        if progress.is_finished() {
            (self.sinks.on_progress)(100);
        }

        let summary = BatchSummary {
            total_bytes,
            uploaded_bytes: progress.uploaded_bytes(),
            files: reports,
        };
        info!(
            "批量上传完成: 文件数={}, 已上传 {}/{} bytes",
            summary.files.len(),
            summary.uploaded_bytes,
            summary.total_bytes
        );
        (self.sinks.on_complete)(&summary);

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uploader::test_support::{Reply, ScriptedTransport};
    use crate::uploader::transmitter::{ChunkTransmitter, RetryPolicy};
    use std::sync::{Arc, Mutex};

    const MB: u64 = 1024 * 1024;

    /// 记录所有回调调用
    #[derive(Default)]
    struct Recorder {
        progress: Mutex<Vec<u8>>,
        completions: Mutex<Vec<BatchSummary>>,
        errors: Mutex<Vec<(String, String)>>,
    }

    fn sinks(recorder: &Arc<Recorder>) -> UploadSinks {
        let p = Arc::clone(recorder);
        let c = Arc::clone(recorder);
        let e = Arc::clone(recorder);
        UploadSinks::new()
            .with_progress(move |percent| p.progress.lock().unwrap().push(percent))
            .with_completion(move |summary| c.completions.lock().unwrap().push(summary.clone()))
            .with_error(move |name, err| {
                e.errors
                    .lock()
                    .unwrap()
                    .push((name.to_string(), err.to_string()))
            })
    }

    impl Recorder {
        fn progress(&self) -> Vec<u8> {
            self.progress.lock().unwrap().clone()
        }
    }

    fn uploader(transport: Arc<ScriptedTransport>, chunk_size: u64, recorder: &Arc<Recorder>) -> BatchUploader {
        let transmitter = ChunkTransmitter::new(transport, RetryPolicy::default());
        let engine = UploadEngine::new(transmitter, chunk_size, "mzML_samples");
        BatchUploader::new(engine, sinks(recorder))
    }

    fn file(name: &str, size: u64) -> SelectedFile {
        SelectedFile::from_bytes(name, vec![1u8; size as usize])
    }

    #[test]
    fn test_progress_percent_floor() {
        let mut progress = BatchProgress::new(3);
        assert_eq!(progress.percent(), 0);
        assert_eq!(progress.record(1), 33);
        assert_eq!(progress.record(1), 66);
        assert_eq!(progress.record(1), 100);
        assert!(progress.is_finished());
    }

    #[test]
    fn test_progress_never_exceeds_total() {
        let mut progress = BatchProgress::new(10);
        progress.record(8);
        assert_eq!(progress.record(8), 100);
        assert_eq!(progress.uploaded_bytes(), 10);
    }

    #[test]
    fn test_progress_zero_total() {
        let mut progress = BatchProgress::new(0);
        assert_eq!(progress.record(0), 0);
        assert!(progress.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_file_scenario() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::always_ok());
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let summary = batch.run(&[file("a.mzML", 5 * MB)]).await.unwrap();

        assert_eq!(transport.calls().len(), 3);
        assert_eq!(summary.uploaded_bytes, summary.total_bytes);
        assert_eq!(recorder.progress(), vec![0, 40, 80, 100, 100]);
        assert_eq!(recorder.progress().last(), Some(&100));
        assert_eq!(recorder.completions.lock().unwrap().len(), 1);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_aggregated_by_bytes_across_files() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::always_ok());
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let summary = batch
            .run(&[file("small.mzML", MB), file("large.mzML", 3 * MB)])
            .await
            .unwrap();

        // 第一个文件（1 个分片）完成后为 25%
        assert_eq!(recorder.progress(), vec![0, 25, 75, 100, 100]);
        assert_eq!(summary.total_bytes, 4 * MB);
        assert_eq!(summary.file_names(), vec!["small.mzML", "large.mzML"]);
        assert_eq!(
            transport.trace(),
            vec![
                ("small.mzML".to_string(), 0),
                ("large.mzML".to_string(), 0),
                ("large.mzML".to_string(), 1),
            ]
        );

        let completions = recorder.completions.lock().unwrap();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0], summary);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_does_not_double_count() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::new(
            vec![Reply::server_error("busy"), Reply::NetworkDown],
            Reply::empty_ok(),
        ));
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let summary = batch.run(&[file("a.mzML", MB)]).await.unwrap();

        assert_eq!(transport.calls().len(), 3);
        assert_eq!(summary.uploaded_bytes, MB);
        assert_eq!(recorder.progress(), vec![0, 100, 100]);
        assert_eq!(recorder.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_halts_batch() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::new(
            vec![
                Reply::server_error("first"),
                Reply::server_error("second"),
                Reply::server_error("quota exceeded"),
            ],
            Reply::empty_ok(),
        ));
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let failure = batch
            .run(&[file("a.mzML", MB), file("b.mzML", MB)])
            .await
            .unwrap_err();

        assert_eq!(failure.filename, "a.mzML");
        assert_eq!(failure.file_index, 0);

        // 第二个文件没有开始
        assert!(transport
            .trace()
            .iter()
            .all(|(name, index)| name == "a.mzML" && *index == 0));
        assert_eq!(transport.calls().len(), 3);

        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "a.mzML");
        assert!(errors[0].1.contains("quota exceeded"));
        assert!(recorder.completions.lock().unwrap().is_empty());
        assert_eq!(recorder.progress(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_in_second_file_keeps_first_progress() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::new(
            vec![Reply::empty_ok()],
            Reply::NetworkDown,
        ));
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let failure = batch
            .run(&[file("a.mzML", MB), file("b.mzML", MB), file("c.mzML", MB)])
            .await
            .unwrap_err();

        assert_eq!(failure.filename, "b.mzML");
        assert_eq!(failure.file_index, 1);
        assert_eq!(recorder.progress(), vec![0, 33]);
        assert!(transport.trace().iter().all(|(name, _)| name != "c.mzML"));
        assert!(recorder.completions.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_byte_file_is_sent() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::always_ok());
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let summary = batch.run(&[file("empty.mzML", 0)]).await.unwrap();

        assert_eq!(transport.calls().len(), 1);
        assert_eq!(summary.files[0].chunks_sent, 1);
        assert_eq!(recorder.progress(), vec![0, 0, 100]);
        assert_eq!(recorder.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch_completes_immediately() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::always_ok());
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let summary = batch.run(&[]).await.unwrap();

        assert!(transport.calls().is_empty());
        assert!(summary.files.is_empty());
        assert_eq!(recorder.progress(), vec![0, 100]);
        assert_eq!(recorder.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_complete_before_last_chunk_skips_forced_100() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::new(vec![Reply::complete()], Reply::empty_ok()));
        let batch = uploader(transport.clone(), 2 * MB, &recorder);

        let summary = batch.run(&[file("a.mzML", 4 * MB)]).await.unwrap();

        assert_eq!(transport.calls().len(), 1);
        assert!(summary.files[0].completed_by_server);
        assert_eq!(summary.uploaded_bytes, 2 * MB);
        assert_eq!(recorder.progress(), vec![0, 50]);
        assert_eq!(recorder.completions.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_json_shape() {
        let recorder = Arc::new(Recorder::default());
        let transport = Arc::new(ScriptedTransport::new(
            vec![Reply::Ok(r#"{"status":"complete","file_path":"mzML_samples/a.mzML"}"#.to_string())],
            Reply::empty_ok(),
        ));
        let batch = uploader(transport, 2 * MB, &recorder);

        let summary = batch
            .run(&[file("a.mzML", MB), file("b.mzML", MB)])
            .await
            .unwrap();
        let json = serde_json::to_value(&summary).unwrap();

        assert_eq!(json["total_bytes"], 2 * MB);
        assert_eq!(json["uploaded_bytes"], 2 * MB);
        assert_eq!(json["files"][0]["file_name"], "a.mzML");
        assert_eq!(json["files"][0]["stored_path"], "mzML_samples/a.mzML");
        assert_eq!(json["files"][0]["completed_by_server"], true);
        // 没有服务端路径时不输出该字段
        assert!(json["files"][1].get("stored_path").is_none());
    }
}
