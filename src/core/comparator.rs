use crate::storage::{FileRecord, Inventory};

/// 文件新旧比较器。纯函数，与同步方向无关：
/// 上传时本地记录是 source，下载时远程记录是 source。
pub struct FileComparator;

impl FileComparator {
    /// 目标记录相对源记录是否仍然有效（无需传输）
    pub fn is_current(source: &FileRecord, destination: Option<&FileRecord>) -> bool {
        let Some(dest) = destination else {
            return false;
        };

        // 大小不同必然重传，与时间戳无关
        if dest.content_length != source.content_length {
            return false;
        }

        if dest.last_modified < source.last_modified {
            return false;
        }

        true
    }

    /// 参考定义：source 中需要传输的子集。
    /// 流式同步流程从不同时物化两侧清单，但结果必须与这个函数等价。
    pub fn diff(source: &Inventory, destination: &Inventory) -> Inventory {
        source
            .iter()
            .filter(|(key, record)| !Self::is_current(record, destination.get(*key)))
            .map(|(key, record)| (key.clone(), record.clone()))
            .collect()
    }
}
