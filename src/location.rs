//! 远程位置解析

use crate::error::SyncError;

/// 对象存储位置，形如 `s3://bucket/prefix/...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    /// 桶名
    pub bucket: String,
    /// 前缀路径段（可为空）
    pub segments: Vec<String>,
}

const SCHEME: &str = "s3://";

impl RemoteLocation {
    /// 解析位置字符串，缺少 scheme 前缀或桶名为空时返回错误
    pub fn parse(input: &str) -> Result<Self, SyncError> {
        let rest = input
            .strip_prefix(SCHEME)
            .ok_or_else(|| SyncError::LocationParse(format!("缺少 {} 前缀: {}", SCHEME, input)))?;

        let mut parts = rest.split('/');
        let bucket = parts.next().unwrap_or_default();
        if bucket.is_empty() {
            return Err(SyncError::LocationParse(format!("缺少桶名: {}", input)));
        }

        let segments: Vec<String> = parts
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Ok(Self {
            bucket: bucket.to_string(),
            segments,
        })
    }

    /// 列表用前缀，非空时以 `/` 结尾
    pub fn prefix(&self) -> String {
        if self.segments.is_empty() {
            String::new()
        } else {
            format!("{}/", self.segments.join("/"))
        }
    }

    /// 由相对 key 拼出完整对象 key
    pub fn key_for(&self, relative_key: &str) -> String {
        format!("{}{}", self.prefix(), relative_key)
    }
}

impl std::fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}/{}", SCHEME, self.bucket, self.prefix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket_only() {
        let loc = RemoteLocation::parse("s3://my-bucket").unwrap();
        assert_eq!(loc.bucket, "my-bucket");
        assert!(loc.segments.is_empty());
        assert_eq!(loc.prefix(), "");
        assert_eq!(loc.key_for("a/b.txt"), "a/b.txt");
    }

    #[test]
    fn test_parse_with_prefix() {
        let loc = RemoteLocation::parse("s3://backup/photos/2024").unwrap();
        assert_eq!(loc.bucket, "backup");
        assert_eq!(loc.segments, vec!["photos", "2024"]);
        assert_eq!(loc.prefix(), "photos/2024/");
        assert_eq!(loc.key_for("trip/img.jpg"), "photos/2024/trip/img.jpg");
    }

    #[test]
    fn test_parse_ignores_empty_segments() {
        let loc = RemoteLocation::parse("s3://backup//photos/").unwrap();
        assert_eq!(loc.segments, vec!["photos"]);
    }

    #[test]
    fn test_parse_missing_scheme() {
        let err = RemoteLocation::parse("/tmp/data").unwrap_err();
        assert!(matches!(err, SyncError::LocationParse(_)));
    }

    #[test]
    fn test_parse_missing_bucket() {
        let err = RemoteLocation::parse("s3://").unwrap_err();
        assert!(matches!(err, SyncError::LocationParse(_)));
    }
}
