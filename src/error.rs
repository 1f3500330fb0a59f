//! 错误类型定义

use thiserror::Error;

/// 同步过程中的错误分类
#[derive(Debug, Error)]
pub enum SyncError {
    /// 存储位置字符串无法解析，整个操作在构建清单前终止
    #[error("无效的存储位置: {0}")]
    LocationParse(String),

    /// 构建本地或远程文件清单失败，当前方向的同步终止
    #[error("构建文件清单失败: {0}")]
    Inventory(#[source] anyhow::Error),

    /// 单个文件传输失败，只影响该文件
    #[error("传输失败 [{key}]: {source}")]
    Transfer {
        key: String,
        #[source]
        source: anyhow::Error,
    },
}

impl SyncError {
    /// 包装单个文件的传输错误
    pub fn transfer(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Transfer {
            key: key.into(),
            source,
        }
    }
}
