pub mod bunny;
pub mod local;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub use bunny::BunnyStorage;
pub use local::LocalStorage;

// ============ 公共常量 ============

/// 非 IO 操作超时（秒）- list, delete 等
pub const OP_TIMEOUT_SECS: u64 = 60;
/// IO 操作超时（秒）- get, upload 等
pub const IO_TIMEOUT_SECS: u64 = 300;

/// 未知扩展名使用的内容类型
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// 远端对象
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// 相对于存储区根目录的路径，使用 / 分隔
    pub relative_path: String,
    pub size_bytes: u64,
    /// 小写十六进制 SHA-256，目录为空
    pub checksum_hex: String,
    pub is_directory: bool,
}

impl RemoteObject {
    pub fn file(relative_path: impl Into<String>, size_bytes: u64, checksum: &str) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes,
            checksum_hex: checksum.to_ascii_lowercase(),
            is_directory: false,
        }
    }

    pub fn directory(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            size_bytes: 0,
            checksum_hex: String::new(),
            is_directory: true,
        }
    }

    /// 用规范化后的路径重建对象
    pub fn with_path(self, relative_path: String) -> Self {
        Self {
            relative_path,
            ..self
        }
    }
}

/// 存储抽象接口
#[async_trait]
pub trait Storage: Send + Sync {
    /// 列出前缀下的直接子项（不递归）
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>>;

    /// 下载整个对象
    async fn get(&self, path: &str) -> Result<Bytes>;

    /// 创建或覆盖对象；checksum 仅作为元数据
    async fn upload(
        &self,
        path: &str,
        content: Bytes,
        checksum: &str,
        content_type: &str,
    ) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    /// 列举结果中带有的存储区前缀（如 `/zone/`），没有则为 None
    fn zone_name(&self) -> Option<&str> {
        None
    }

    /// 获取存储名称（用于日志）
    fn name(&self) -> &str;
}

/// 根据扩展名推断上传时的 Content-Type
pub fn content_type_for(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// 同步目标
#[derive(Debug, Clone)]
pub enum StorageTarget {
    Bunny {
        zone: String,
        api_key: String,
        endpoint: String,
    },
    /// 本地目录模拟的存储区
    Local { root: PathBuf },
}

/// 根据配置创建存储实例
pub fn create_storage(target: &StorageTarget) -> Result<Arc<dyn Storage>> {
    match target {
        StorageTarget::Bunny {
            zone,
            api_key,
            endpoint,
        } => {
            if api_key.is_empty() {
                return Err(anyhow::anyhow!("Bunny storage requires an API key"));
            }
            tracing::info!("初始化 Bunny 存储: zone={}, endpoint={}", zone, endpoint);
            Ok(Arc::new(BunnyStorage::new(zone, api_key, endpoint)?) as Arc<dyn Storage>)
        }
        StorageTarget::Local { root } => {
            tracing::info!("初始化本地存储: {}", root.display());
            Ok(Arc::new(LocalStorage::new(root)?) as Arc<dyn Storage>)
        }
    }
}
