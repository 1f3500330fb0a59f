use crate::location::RemoteLocation;
use crate::storage::{
    FileRecord, Inventory, LocalFs, Locator, ObjectStore, MISSING_MTIME, MTIME_META_KEY,
};
use anyhow::Result;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 文件扫描器配置
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// 排除规则（glob patterns），对本地和远程两侧同样生效
    pub exclude_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                // 常见的排除模式
                ".git/**".to_string(),
                ".svn/**".to_string(),
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "*.tmp".to_string(),
                "*.temp".to_string(),
                "~*".to_string(),
            ],
        }
    }
}

/// 文件扫描器：构建本地清单，流式产生远程记录
pub struct FileScanner {
    config: ScanConfig,
}

impl FileScanner {
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    /// 检查 key 是否应该被排除
    fn should_exclude(&self, key: &str) -> bool {
        self.config
            .exclude_patterns
            .iter()
            .any(|pattern| matches_pattern(key, pattern))
    }

    /// 扫描本地目录，返回完整的 key -> 记录映射。
    /// 根目录不存在时按空清单处理，首次上传/下载由此起步。
    pub async fn scan_local(&self, root: &Path) -> Result<Inventory> {
        if !root.exists() {
            info!("本地目录不存在，按空清单处理: {}", root.display());
            return Ok(Inventory::new());
        }

        let local = LocalFs::new(root);
        info!("开始扫描本地目录: {}", local.name());

        let files = local.list_files().await?;

        let mut tree = Inventory::new();
        let mut excluded_count = 0;

        for record in files {
            if self.should_exclude(&record.key) {
                debug!("排除文件: {}", record.key);
                excluded_count += 1;
                continue;
            }
            tree.insert(record.key.clone(), record);
        }

        info!(
            "本地扫描完成: {} 个文件, {} 个被排除",
            tree.len(),
            excluded_count
        );

        Ok(tree)
    }

    /// 流式产生远程记录：剥离前缀、跳过占位对象、从自定义元数据读取 mtime。
    /// 一次只产生一条记录，峰值内存只取决于本地清单的大小。
    pub async fn remote_records(
        &self,
        store: &Arc<dyn ObjectStore>,
        location: &RemoteLocation,
    ) -> Result<BoxStream<'static, Result<FileRecord>>> {
        let prefix = location.prefix();
        info!("开始枚举远程对象: {}/{}", store.name(), prefix);

        let entries = store.list(&prefix).await?;

        let store = store.clone();
        let patterns = self.config.exclude_patterns.clone();

        let stream = entries
            .try_filter_map(move |entry| {
                let store = store.clone();
                let prefix = prefix.clone();
                let patterns = patterns.clone();
                async move {
                    let relative = entry
                        .key
                        .strip_prefix(&prefix)
                        .unwrap_or(&entry.key)
                        .to_string();

                    // 前缀本身的占位对象
                    if relative.is_empty() {
                        return Ok(None);
                    }

                    // 零字节占位对象不是真实文件，不参与同步
                    if entry.size == 0 {
                        debug!("跳过零字节占位对象: {}", entry.key);
                        return Ok(None);
                    }

                    if patterns.iter().any(|p| matches_pattern(&relative, p)) {
                        debug!("排除远程对象: {}", relative);
                        return Ok(None);
                    }

                    // 自定义元数据需要逐个 stat 获取
                    let Some(meta) = store.stat(&entry.key).await? else {
                        // 列表和 stat 之间对象被删除
                        debug!("对象已消失: {}", entry.key);
                        return Ok(None);
                    };

                    // 缺失或无法解析时落到哨兵值，保证总是被重传而不是被悄悄跳过
                    let last_modified = meta
                        .metadata
                        .get(MTIME_META_KEY)
                        .and_then(|v| v.parse::<i64>().ok())
                        .unwrap_or(MISSING_MTIME);

                    Ok(Some(FileRecord {
                        key: relative,
                        last_modified,
                        content_length: meta.size,
                        locator: Locator::Remote(entry.key),
                    }))
                }
            })
            .boxed();

        Ok(stream)
    }
}

impl Default for FileScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// 简单的 glob 模式匹配
fn matches_pattern(path: &str, pattern: &str) -> bool {
    let path = path.to_lowercase();
    let pattern = pattern.to_lowercase();

    // 处理 ** 通配符
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.split("**").collect();
        if parts.len() == 2 {
            let prefix = parts[0].trim_end_matches('/');
            let suffix = parts[1].trim_start_matches('/');

            if prefix.is_empty() && suffix.is_empty() {
                return true;
            }

            if !prefix.is_empty() && !path.starts_with(prefix) {
                return false;
            }

            if !suffix.is_empty() && !path.ends_with(suffix) {
                return false;
            }

            return true;
        }
    }

    // 处理 * 通配符
    if pattern.contains('*') {
        let regex_pattern = pattern.replace('.', "\\.").replace('*', ".*");

        if let Ok(re) = regex::Regex::new(&format!("^{}$", regex_pattern)) {
            return re.is_match(&path);
        }
    }

    // 精确匹配
    path == pattern || path.ends_with(&format!("/{}", pattern))
}
