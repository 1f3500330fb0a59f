pub mod local;
pub mod s3;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::path::PathBuf;

pub use local::LocalFs;
pub use s3::S3Store;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- stat, list 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- read, write 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 自定义元数据中保存源文件 mtime 的键（S3 上表现为 x-amz-meta-mtime）
///
/// 对象存储自带的 last-modified 反映的是上传时间而不是源文件的修改时间，
/// 因此新旧判断只依赖这个自定义字段。
pub const MTIME_META_KEY: &str = "mtime";

/// 远程对象缺失或无法解析 mtime 元数据时使用的哨兵值，
/// 比任何真实时间戳都小，作为目标端时总被判定为过期
pub const MISSING_MTIME: i64 = i64::MIN;

/// 传输内容的定位方式
#[derive(Debug, Clone)]
pub enum Locator {
    /// 本地文件的绝对路径
    Local(PathBuf),
    /// 桶内的完整对象 key（含前缀）
    Remote(String),
}

/// 参与比较和传输的文件记录
#[derive(Debug, Clone)]
pub struct FileRecord {
    /// 相对路径，两侧语义一致，统一使用 `/` 分隔
    pub key: String,
    /// 修改时间（Unix 秒）
    pub last_modified: i64,
    /// 文件大小（字节）
    pub content_length: u64,
    /// 传输执行器使用的定位句柄
    pub locator: Locator,
}

/// key 到文件记录的映射，本地侧总是完整物化
pub type Inventory = HashMap<String, FileRecord>;

/// 列表产生的对象条目（逐条产生，不整体收集）
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    /// 桶内完整 key
    pub key: String,
    /// 对象大小（字节）
    pub size: u64,
}

/// 对象元数据
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    pub size: u64,
    /// 自定义元数据映射
    pub metadata: HashMap<String, String>,
}

/// 对象存储抽象接口
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// 流式列出指定前缀下的所有对象（不含目录占位）
    async fn list(&self, prefix: &str) -> Result<BoxStream<'static, Result<ObjectEntry>>>;

    /// 获取单个对象的元数据，不存在时返回 None
    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>>;

    /// 读取对象的一段内容
    async fn read_range(&self, key: &str, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// 写入整个对象（覆盖已有对象），同时写入自定义元数据
    async fn write(&self, key: &str, data: Vec<u8>, metadata: HashMap<String, String>)
        -> Result<()>;

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}
