use crate::core::comparator::FileComparator;
use crate::core::scanner::{FileScanner, ScanConfig};
use crate::core::transfer::TransferExecutor;
use crate::error::SyncError;
use crate::location::RemoteLocation;
use crate::storage::{FileRecord, LocalFs, ObjectStore};
use futures::TryStreamExt;
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 下载分块大小（字节）
    pub chunk_size: u64,
    /// 只报告将要执行的动作，不实际传输
    pub dry_run: bool,
    /// 扫描配置
    pub scan_config: ScanConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5 * 1024 * 1024, // 5MB
            dry_run: false,
            scan_config: ScanConfig::default(),
        }
    }
}

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// 本地是权威侧，远程是目标
    Upload,
    /// 远程是权威侧，本地是目标
    Download,
}

/// 同步状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Scanning,
    Comparing,
    Syncing,
    Completed,
    Failed,
}

/// 同步进度
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub status: SyncStatus,
    pub phase: String,
    pub current_file: String,
    pub files_scanned: u32,
    pub files_completed: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    pub bytes_transferred: u64,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub direction: SyncDirection,
    pub start_time: i64,
    pub end_time: i64,
    pub status: SyncStatus,
    pub files_scanned: u32,
    pub files_transferred: u32,
    pub files_skipped: u32,
    pub files_failed: u32,
    /// dry-run 模式下统计的待传输数量
    pub files_pending: u32,
    pub bytes_transferred: u64,
    pub duration: u64,
    pub errors: Vec<String>,
}

/// 运行期计数
#[derive(Debug, Default)]
struct RunStats {
    files_scanned: u32,
    files_transferred: u32,
    files_skipped: u32,
    files_failed: u32,
    files_pending: u32,
    bytes_transferred: u64,
    errors: Vec<String>,
}

/// 同步引擎：组合扫描、比较与传输。
/// 对象存储句柄和进度通道都由调用方显式传入。
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(store: Arc<dyn ObjectStore>, config: SyncConfig) -> Self {
        Self { store, config }
    }

    /// 上传流程：本地清单完整物化，远端流式消费。
    /// 每遇到一条已满足的远程记录就把对应 key 从本地清单中删除，
    /// 流结束后剩下的就是待上传集合。
    pub async fn upload(
        &self,
        local_root: &Path,
        location: &RemoteLocation,
        progress_tx: Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<SyncReport, SyncError> {
        let start_time = chrono::Utc::now().timestamp();
        info!("开始上传同步: {} -> {}", local_root.display(), location);

        let scanner = FileScanner::with_config(self.config.scan_config.clone());
        let mut stats = RunStats::default();

        self.send_progress(&progress_tx, &stats, SyncStatus::Scanning, "正在扫描本地文件...", "")
            .await;

        let mut local = match scanner.scan_local(local_root).await {
            Ok(tree) => tree,
            Err(e) => return Err(inventory_err(e)),
        };
        stats.files_scanned = local.len() as u32;

        self.send_progress(&progress_tx, &stats, SyncStatus::Comparing, "正在对比云端对象...", "")
            .await;

        let mut remote = match scanner.remote_records(&self.store, location).await {
            Ok(stream) => stream,
            Err(e) => return Err(inventory_err(e)),
        };

        // 一边消费远端流一边从本地清单中删除已满足的 key。
        // 单线程顺序执行下这是刻意的原地分区，不是别名问题。
        while let Some(record) = remote.try_next().await.map_err(inventory_err)? {
            stats.files_scanned += 1;

            let satisfied = local
                .get(&record.key)
                .map(|local_record| FileComparator::is_current(local_record, Some(&record)))
                .unwrap_or(false);

            if satisfied {
                debug!("已是最新，跳过: {}", record.key);
                local.remove(&record.key);
                stats.files_skipped += 1;
            }
        }

        // 剩下的就是待上传集合；按 key 排序只影响日志可读性
        let mut pending: Vec<FileRecord> = local.into_values().collect();
        pending.sort_by(|a, b| a.key.cmp(&b.key));

        info!(
            "对比完成: {} 个待上传, {} 个已满足",
            pending.len(),
            stats.files_skipped
        );

        let executor = TransferExecutor::new(self.store.clone(), self.config.chunk_size);

        for record in pending {
            if self.config.dry_run {
                info!(
                    "[dry-run] 待上传: {} ({} 字节)",
                    record.key, record.content_length
                );
                stats.files_pending += 1;
                continue;
            }

            self.send_progress(&progress_tx, &stats, SyncStatus::Syncing, "上传中", &record.key)
                .await;

            match executor.upload(&record, location).await {
                Ok(bytes) => {
                    info!(
                        "上传: {} -> s3://{}/{} ({} 字节)",
                        record.key,
                        location.bucket,
                        location.key_for(&record.key),
                        bytes
                    );
                    stats.files_transferred += 1;
                    stats.bytes_transferred += bytes;
                }
                Err(e) => {
                    // 单个文件失败不中止整个方向，记录后继续
                    error!("{}", e);
                    stats.files_failed += 1;
                    stats.errors.push(e.to_string());
                }
            }
        }

        self.finish(SyncDirection::Upload, start_time, stats, &progress_tx)
            .await
    }

    /// 下载流程：远端流式消费，每条记录独立判定并立即传输，
    /// 从不收集待下载集合。
    pub async fn download(
        &self,
        location: &RemoteLocation,
        local_root: &Path,
        progress_tx: Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<SyncReport, SyncError> {
        let start_time = chrono::Utc::now().timestamp();
        info!("开始下载同步: {} -> {}", location, local_root.display());

        let scanner = FileScanner::with_config(self.config.scan_config.clone());
        let mut stats = RunStats::default();

        self.send_progress(&progress_tx, &stats, SyncStatus::Scanning, "正在扫描本地文件...", "")
            .await;

        let local = match scanner.scan_local(local_root).await {
            Ok(tree) => tree,
            Err(e) => return Err(inventory_err(e)),
        };
        stats.files_scanned = local.len() as u32;

        let mut remote = match scanner.remote_records(&self.store, location).await {
            Ok(stream) => stream,
            Err(e) => return Err(inventory_err(e)),
        };

        let local_fs = LocalFs::new(local_root);
        let executor = TransferExecutor::new(self.store.clone(), self.config.chunk_size);

        while let Some(record) = remote.try_next().await.map_err(inventory_err)? {
            stats.files_scanned += 1;

            // 远程记录是 source，本地同 key 记录（若有）是 destination
            if FileComparator::is_current(&record, local.get(&record.key)) {
                debug!("已是最新，跳过: {}", record.key);
                stats.files_skipped += 1;
                continue;
            }

            if self.config.dry_run {
                info!(
                    "[dry-run] 待下载: {} ({} 字节)",
                    record.key, record.content_length
                );
                stats.files_pending += 1;
                continue;
            }

            self.send_progress(&progress_tx, &stats, SyncStatus::Syncing, "下载中", &record.key)
                .await;

            match executor.download(&record, &local_fs).await {
                Ok(bytes) => {
                    info!(
                        "下载: s3://{}/{} -> {} ({} 字节)",
                        location.bucket,
                        location.key_for(&record.key),
                        local_root.join(&record.key).display(),
                        bytes
                    );
                    stats.files_transferred += 1;
                    stats.bytes_transferred += bytes;
                }
                Err(e) => {
                    error!("{}", e);
                    stats.files_failed += 1;
                    stats.errors.push(e.to_string());
                }
            }
        }

        self.finish(SyncDirection::Download, start_time, stats, &progress_tx)
            .await
    }

    /// 汇总报告并发出完成进度
    async fn finish(
        &self,
        direction: SyncDirection,
        start_time: i64,
        stats: RunStats,
        progress_tx: &Option<mpsc::Sender<SyncProgress>>,
    ) -> Result<SyncReport, SyncError> {
        let end_time = chrono::Utc::now().timestamp();
        let status = if stats.files_failed > 0 {
            SyncStatus::Failed
        } else {
            SyncStatus::Completed
        };

        info!(
            "同步完成: 传输 {}, 跳过 {}, 失败 {} ({} 字节)",
            stats.files_transferred,
            stats.files_skipped,
            stats.files_failed,
            stats.bytes_transferred
        );

        self.send_progress(progress_tx, &stats, status, "同步完成", "")
            .await;

        Ok(SyncReport {
            direction,
            start_time,
            end_time,
            status,
            files_scanned: stats.files_scanned,
            files_transferred: stats.files_transferred,
            files_skipped: stats.files_skipped,
            files_failed: stats.files_failed,
            files_pending: stats.files_pending,
            bytes_transferred: stats.bytes_transferred,
            duration: (end_time - start_time) as u64,
            errors: stats.errors,
        })
    }

    /// 发送进度更新
    async fn send_progress(
        &self,
        tx: &Option<mpsc::Sender<SyncProgress>>,
        stats: &RunStats,
        status: SyncStatus,
        phase: &str,
        current_file: &str,
    ) {
        if let Some(tx) = tx {
            let _ = tx
                .send(SyncProgress {
                    status,
                    phase: phase.to_string(),
                    current_file: current_file.to_string(),
                    files_scanned: stats.files_scanned,
                    files_completed: stats.files_transferred,
                    files_skipped: stats.files_skipped,
                    files_failed: stats.files_failed,
                    bytes_transferred: stats.bytes_transferred,
                })
                .await;
        }
    }
}

/// 清单构建失败对当前方向是致命的
fn inventory_err(e: anyhow::Error) -> SyncError {
    let e = SyncError::Inventory(e);
    error!("{}", e);
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::mock::MockStore;
    use crate::storage::MTIME_META_KEY;
    use std::time::Duration;

    /// 创建文件并设置 mtime
    fn touch(root: &Path, rel: &str, contents: &[u8], mtime: i64) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::UNIX_EPOCH + Duration::from_secs(mtime as u64))
            .unwrap();
    }

    fn local_mtime(root: &Path, rel: &str) -> i64 {
        std::fs::metadata(root.join(rel))
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    fn location(s: &str) -> RemoteLocation {
        RemoteLocation::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_upload_transfers_stale_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a", &[0; 10], 100);
        touch(dir.path(), "b", &[0; 5], 50);

        let store = Arc::new(MockStore::new());
        // a 在远端存在但较旧，b 缺失
        store.insert_with_mtime("pre/a", vec![0; 10], 90);

        let engine = SyncEngine::new(store.clone());
        let report = engine
            .upload(dir.path(), &location("s3://bucket/pre"), None)
            .await
            .unwrap();

        assert_eq!(report.status, SyncStatus::Completed);
        assert_eq!(report.files_transferred, 2);
        assert_eq!(report.files_skipped, 0);

        let (_, meta_a) = store.get("pre/a").unwrap();
        assert_eq!(meta_a.get(MTIME_META_KEY).unwrap(), "100");
        let (data_b, meta_b) = store.get("pre/b").unwrap();
        assert_eq!(data_b.len(), 5);
        assert_eq!(meta_b.get(MTIME_META_KEY).unwrap(), "50");
    }

    #[tokio::test]
    async fn test_upload_skips_current_remote() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a", &[0; 10], 100);

        let store = Arc::new(MockStore::new());
        store.insert_with_mtime("a", vec![0; 10], 100);

        let engine = SyncEngine::new(store);
        let report = engine
            .upload(dir.path(), &location("s3://bucket"), None)
            .await
            .unwrap();

        assert_eq!(report.files_transferred, 0);
        assert_eq!(report.files_skipped, 1);
    }

    #[tokio::test]
    async fn test_upload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a", &[1; 10], 100);
        touch(dir.path(), "sub/b", &[2; 5], 50);

        let store = Arc::new(MockStore::new());
        let engine = SyncEngine::new(store.clone());
        let loc = location("s3://bucket/data");

        let first = engine.upload(dir.path(), &loc, None).await.unwrap();
        assert_eq!(first.files_transferred, 2);

        // 源侧无变化，第二次运行待传输集合为空
        let second = engine.upload(dir.path(), &loc, None).await.unwrap();
        assert_eq!(second.files_transferred, 0);
        assert_eq!(second.files_skipped, 2);
    }

    #[tokio::test]
    async fn test_upload_retransfers_when_remote_mtime_missing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a", &[0; 10], 100);

        let store = Arc::new(MockStore::new());
        // 大小一致但没有 mtime 元数据，必须重传
        store.insert("a", vec![0; 10], Default::default());

        let engine = SyncEngine::new(store.clone());
        let report = engine
            .upload(dir.path(), &location("s3://bucket"), None)
            .await
            .unwrap();

        assert_eq!(report.files_transferred, 1);
        let (_, metadata) = store.get("a").unwrap();
        assert_eq!(metadata.get(MTIME_META_KEY).unwrap(), "100");
    }

    #[tokio::test]
    async fn test_upload_continues_after_item_failure() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bad", &[0; 4], 10);
        touch(dir.path(), "good", &[0; 4], 10);

        let store = Arc::new(MockStore::new().with_failure("pre/bad"));
        let engine = SyncEngine::new(store.clone());
        let report = engine
            .upload(dir.path(), &location("s3://bucket/pre"), None)
            .await
            .unwrap();

        assert_eq!(report.status, SyncStatus::Failed);
        assert_eq!(report.files_transferred, 1);
        assert_eq!(report.files_failed, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("bad"));
        assert!(store.get("pre/good").is_some());
    }

    #[tokio::test]
    async fn test_upload_dry_run_transfers_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a", &[0; 3], 100);

        let store = Arc::new(MockStore::new());
        let config = SyncConfig {
            dry_run: true,
            ..Default::default()
        };
        let engine = SyncEngine::with_config(store.clone(), config);
        let report = engine
            .upload(dir.path(), &location("s3://bucket"), None)
            .await
            .unwrap();

        assert_eq!(report.files_pending, 1);
        assert_eq!(report.files_transferred, 0);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_download_updates_stale_local_and_restores_mtime() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x", &[9; 20], 150);

        let store = Arc::new(MockStore::new());
        store.insert_with_mtime("x", vec![7; 20], 200);

        let engine = SyncEngine::new(store);
        let report = engine
            .download(&location("s3://bucket"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(report.files_transferred, 1);
        let content = std::fs::read(dir.path().join("x")).unwrap();
        assert_eq!(content, vec![7; 20]);
        assert_eq!(local_mtime(dir.path(), "x"), 200);
    }

    #[tokio::test]
    async fn test_download_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::new());
        store.insert_with_mtime("deep/nested/f.bin", vec![1; 6], 1_600_000_000);

        let engine = SyncEngine::new(store);
        let loc = location("s3://bucket");

        let first = engine.download(&loc, dir.path(), None).await.unwrap();
        assert_eq!(first.files_transferred, 1);
        assert_eq!(local_mtime(dir.path(), "deep/nested/f.bin"), 1_600_000_000);

        let second = engine.download(&loc, dir.path(), None).await.unwrap();
        assert_eq!(second.files_transferred, 0);
        assert_eq!(second.files_skipped, 1);
    }

    #[tokio::test]
    async fn test_download_into_missing_root_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("fresh");

        let store = Arc::new(MockStore::new());
        store.insert_with_mtime("sub/dir/f.txt", b"abc".to_vec(), 300);

        let engine = SyncEngine::new(store);
        let report = engine
            .download(&location("s3://bucket"), &root, None)
            .await
            .unwrap();

        assert_eq!(report.files_transferred, 1);
        assert_eq!(std::fs::read(root.join("sub/dir/f.txt")).unwrap(), b"abc");
    }

    #[tokio::test]
    async fn test_download_continues_after_item_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MockStore::new().with_failure("bad"));
        store.insert_with_mtime("bad", vec![1; 4], 100);
        store.insert_with_mtime("good", vec![2; 4], 100);

        let engine = SyncEngine::new(store);
        let report = engine
            .download(&location("s3://bucket"), dir.path(), None)
            .await
            .unwrap();

        assert_eq!(report.status, SyncStatus::Failed);
        assert_eq!(report.files_transferred, 1);
        assert_eq!(report.files_failed, 1);
        assert!(dir.path().join("good").exists());
    }

    #[tokio::test]
    async fn test_progress_reported_through_channel() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a", &[0; 3], 100);

        let store = Arc::new(MockStore::new());
        let engine = SyncEngine::new(store);
        let (tx, mut rx) = mpsc::channel(64);

        engine
            .upload(dir.path(), &location("s3://bucket"), Some(tx))
            .await
            .unwrap();

        let mut updates = Vec::new();
        while let Ok(p) = rx.try_recv() {
            updates.push(p);
        }

        assert!(updates.iter().any(|p| p.status == SyncStatus::Scanning));
        assert!(updates.iter().any(|p| p.current_file == "a"));
        assert_eq!(updates.last().unwrap().status, SyncStatus::Completed);
    }

    #[tokio::test]
    async fn test_key_normalization_across_sides() {
        // 本地 root + /sub/dir/f.txt 与远程 prefix + sub/dir/f.txt 解析为同一个 key
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "sub/dir/f.txt", &[0; 4], 100);

        let store = Arc::new(MockStore::new());
        store.insert_with_mtime("pre/sub/dir/f.txt", vec![0; 4], 100);

        let engine = SyncEngine::new(store);
        let report = engine
            .upload(dir.path(), &location("s3://bucket/pre"), None)
            .await
            .unwrap();

        assert_eq!(report.files_transferred, 0);
        assert_eq!(report.files_skipped, 1);
    }
}
