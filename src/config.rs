//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 同步设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// 下载分块大小（MB）
    #[serde(default = "default_chunk_size_mb")]
    pub chunk_size_mb: u64,
    /// 追加到默认排除规则之后的自定义规则
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

fn default_chunk_size_mb() -> u64 {
    5 // 默认 5MB
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            chunk_size_mb: default_chunk_size_mb(),
            exclude_patterns: Vec::new(),
        }
    }
}

impl SyncSettings {
    /// 从配置文件的 sync 段加载
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        fs::read_to_string(&config_file)
            .ok()
            .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
            .and_then(|config| {
                config
                    .get("sync")
                    .and_then(|section| serde_json::from_value(section.clone()).ok())
            })
            .unwrap_or_default()
    }

    pub fn chunk_size_bytes(&self) -> u64 {
        self.chunk_size_mb.max(1) * 1024 * 1024
    }
}

/// 应用配置目录
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("objsync"))
        .unwrap_or_else(|| PathBuf::from(".objsync"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.chunk_size_bytes(), 5 * 1024 * 1024);
        assert!(settings.exclude_patterns.is_empty());
    }

    #[test]
    fn test_settings_load_section() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.json"),
            r#"{"sync": {"chunk_size_mb": 8, "exclude_patterns": ["*.bak"]}, "log": {}}"#,
        )
        .unwrap();

        let settings = SyncSettings::load(dir.path());
        assert_eq!(settings.chunk_size_mb, 8);
        assert_eq!(settings.exclude_patterns, vec!["*.bak"]);
    }

    #[test]
    fn test_settings_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::load(dir.path());
        assert_eq!(settings.chunk_size_mb, 5);
    }
}
