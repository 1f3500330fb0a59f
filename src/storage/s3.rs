use super::{ObjectEntry, ObjectMeta, ObjectStore, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use opendal::{layers::TimeoutLayer, Operator};
use std::collections::HashMap;
use std::time::Duration;

pub struct S3Store {
    operator: Operator,
    name: String,
}

impl S3Store {
    pub fn new(
        bucket: &str,
        region: &str,
        access_key: Option<&str>,
        secret_key: Option<&str>,
        endpoint: Option<String>,
    ) -> Result<Self> {
        use opendal::services::S3;

        let mut builder = S3::default().bucket(bucket).region(region);

        // 未显式提供密钥时交给标准凭证链（环境变量 / 配置文件 / 实例角色）
        if let (Some(ak), Some(sk)) = (access_key, secret_key) {
            builder = builder.access_key_id(ak).secret_access_key(sk);
        }

        if let Some(ref ep) = endpoint {
            builder = builder.endpoint(ep);
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        let name = format!("s3://{}", bucket);

        Ok(Self { operator, name })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list(&self, prefix: &str) -> Result<BoxStream<'static, Result<ObjectEntry>>> {
        // 递归列表，逐条产生，不整体收集
        let lister = self.operator.lister_with(prefix).recursive(true).await?;

        let stream = lister
            .map_err(anyhow::Error::from)
            .try_filter_map(|entry| {
                let meta = entry.metadata().clone();
                let key = entry.path().trim_start_matches('/').to_string();
                async move {
                    // 跳过目录占位
                    if meta.is_dir() || key.is_empty() {
                        return Ok(None);
                    }
                    Ok(Some(ObjectEntry {
                        key,
                        size: meta.content_length(),
                    }))
                }
            })
            .boxed();

        Ok(stream)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>> {
        match self.operator.stat(key).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.content_length(),
                metadata: meta.user_metadata().cloned().unwrap_or_default(),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Vec<u8>> {
        let data = self
            .operator
            .read_with(key)
            .range(offset..offset + length)
            .await?;
        Ok(data.to_vec())
    }

    async fn write(
        &self,
        key: &str,
        data: Vec<u8>,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        // write 本身就是覆盖语义
        self.operator
            .write_with(key, data)
            .user_metadata(metadata)
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
