//! 单文件传输执行

use crate::error::SyncError;
use crate::location::RemoteLocation;
use crate::storage::{FileRecord, LocalFs, Locator, ObjectStore, MISSING_MTIME, MTIME_META_KEY};
use anyhow::{anyhow, Result};
use futures::stream::Stream;
use futures::StreamExt;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use tracing::debug;

/// 传输执行器：在本地目录与对象存储之间复制单个文件，并保留修改时间
pub struct TransferExecutor {
    store: Arc<dyn ObjectStore>,
    chunk_size: u64,
}

impl TransferExecutor {
    pub fn new(store: Arc<dyn ObjectStore>, chunk_size: u64) -> Self {
        Self { store, chunk_size }
    }

    /// 上传单个本地文件。mtime 写入自定义元数据，覆盖已存在的对象。
    /// 失败只影响这一个文件。
    pub async fn upload(
        &self,
        record: &FileRecord,
        location: &RemoteLocation,
    ) -> Result<u64, SyncError> {
        let Locator::Local(path) = &record.locator else {
            return Err(SyncError::transfer(
                &record.key,
                anyhow!("记录没有本地路径"),
            ));
        };

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| SyncError::transfer(&record.key, e.into()))?;
        let bytes = data.len() as u64;

        let mut metadata = HashMap::new();
        metadata.insert(
            MTIME_META_KEY.to_string(),
            record.last_modified.to_string(),
        );

        let object_key = location.key_for(&record.key);
        debug!("  写入对象: {} ({} 字节)", object_key, bytes);

        self.store
            .write(&object_key, data, metadata)
            .await
            .map_err(|e| SyncError::transfer(&record.key, e))?;

        Ok(bytes)
    }

    /// 下载单个远程对象：分块读取流式写入临时文件，成功后恢复 mtime。
    /// 失败只影响这一个文件。
    pub async fn download(&self, record: &FileRecord, local: &LocalFs) -> Result<u64, SyncError> {
        let Locator::Remote(object_key) = &record.locator else {
            return Err(SyncError::transfer(
                &record.key,
                anyhow!("记录没有对象 key"),
            ));
        };

        let body = Self::body_stream(
            self.store.clone(),
            object_key.clone(),
            record.content_length,
            self.chunk_size,
        );

        let bytes = local
            .write_stream(&record.key, body)
            .await
            .map_err(|e| SyncError::transfer(&record.key, e))?;

        // 哨兵值说明源侧没有真实时间戳可恢复，保留写入时间
        if record.last_modified != MISSING_MTIME {
            local
                .set_mtime(&record.key, record.last_modified)
                .await
                .map_err(|e| SyncError::transfer(&record.key, e))?;
        }

        Ok(bytes)
    }

    /// 把对象内容变成分块读取的流，单块内存不超过 chunk_size
    fn body_stream(
        store: Arc<dyn ObjectStore>,
        key: String,
        total: u64,
        chunk_size: u64,
    ) -> Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>> {
        futures::stream::unfold(0u64, move |offset| {
            let store = store.clone();
            let key = key.clone();
            async move {
                if offset >= total {
                    return None;
                }
                let length = chunk_size.min(total - offset);
                match store.read_range(&key, offset, length).await {
                    Ok(data) => Some((Ok(data), offset + length)),
                    // 产出错误后把状态推到末尾，终止流
                    Err(e) => Some((Err(e), total)),
                }
            }
        })
        .boxed()
    }
}
