use super::{FileRecord, Locator};
use anyhow::Result;
use futures::{Stream, StreamExt};
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use walkdir::WalkDir;

/// 同步根目录下的本地文件操作
pub struct LocalFs {
    root: PathBuf,
    name: String,
}

impl LocalFs {
    /// 根目录不存在时不会提前创建，写入时按需建立
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let root = path.into();
        let name = format!("local:{}", root.display());
        Self { root, name }
    }

    fn resolve(&self, key: &str) -> PathBuf {
        let key = key.trim_start_matches('/').trim_start_matches('\\');
        if key.is_empty() {
            self.root.clone()
        } else {
            self.root.join(key)
        }
    }

    /// 规范化路径分隔符（统一使用 /）
    fn normalize_key(path: &str) -> String {
        path.replace('\\', "/")
    }

    /// 递归列出根目录下的所有普通文件；目录只遍历不产出。
    /// 根目录不存在时返回空列表。
    pub async fn list_files(&self) -> Result<Vec<FileRecord>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let root = self.root.canonicalize()?;

        // 使用 spawn_blocking 避免阻塞 async runtime
        let records: Vec<FileRecord> = tokio::task::spawn_blocking(move || {
            WalkDir::new(&root)
                .follow_links(false)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter_map(|entry| {
                    let metadata = entry.metadata().ok()?;
                    if !metadata.is_file() {
                        return None;
                    }

                    let path = entry.path();
                    let relative = path.strip_prefix(&root).ok()?.to_str()?.to_string();
                    if relative.is_empty() {
                        return None;
                    }

                    let modified = metadata
                        .modified()
                        .ok()?
                        .duration_since(std::time::UNIX_EPOCH)
                        .ok()?
                        .as_secs() as i64;

                    Some(FileRecord {
                        key: Self::normalize_key(&relative),
                        last_modified: modified,
                        content_length: metadata.len(),
                        locator: Locator::Local(path.to_path_buf()),
                    })
                })
                .collect()
        })
        .await?;

        Ok(records)
    }

    /// 流式写入：先写临时文件再原子重命名，父目录按需创建。
    /// 返回写入的字节数。
    pub async fn write_stream(
        &self,
        key: &str,
        stream: Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>,
    ) -> Result<u64> {
        let full_path = self.resolve(key);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = full_path.with_extension("tmp");
        match Self::copy_into(stream, &temp_path).await {
            Ok(written) => {
                fs::rename(&temp_path, &full_path).await?;
                Ok(written)
            }
            Err(e) => {
                let _ = fs::remove_file(&temp_path).await;
                Err(e)
            }
        }
    }

    async fn copy_into(
        mut stream: Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>,
        temp_path: &std::path::Path,
    ) -> Result<u64> {
        let mut file = fs::File::create(temp_path).await?;
        let mut written = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }

        file.flush().await?;
        Ok(written)
    }

    /// 把文件的修改时间设置为给定的 Unix 秒
    pub async fn set_mtime(&self, key: &str, mtime: i64) -> Result<()> {
        let full_path = self.resolve(key);
        let time = std::time::UNIX_EPOCH + Duration::from_secs(mtime.max(0) as u64);

        tokio::task::spawn_blocking(move || -> std::io::Result<()> {
            let file = std::fs::File::options().write(true).open(&full_path)?;
            file.set_modified(time)
        })
        .await??;

        Ok(())
    }

    /// 获取存储名称（用于日志）
    pub fn name(&self) -> &str {
        &self.name
    }
}
