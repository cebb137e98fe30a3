use super::{RemoteObject, Storage};
use crate::core::checksum::sha256_hex;
use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 以本地目录作为存储区，结构与 Bunny 存储区一致
pub struct LocalStorage {
    base_path: PathBuf,
    name: String,
}

impl LocalStorage {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let base_path = path.as_ref().to_path_buf();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        let name = format!("local:{}", base_path.display());
        Ok(Self { base_path, name })
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// 拼接列举结果的相对路径
    fn child_path(prefix: &str, name: &str) -> String {
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", prefix, name)
        }
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let dir = self.resolve_path(prefix);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir).await?;
        let mut objects = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::warn!("跳过非 UTF-8 文件名: {:?}", entry.path());
                continue;
            };
            // 写入中的临时文件不对外可见
            if name.ends_with(".bunnysync-tmp") {
                continue;
            }

            let relative = Self::child_path(prefix, name);
            let metadata = entry.metadata().await?;

            if metadata.is_dir() {
                objects.push(RemoteObject::directory(relative));
            } else {
                let data = fs::read(entry.path()).await?;
                let checksum = tokio::task::spawn_blocking(move || sha256_hex(&data)).await?;
                objects.push(RemoteObject::file(relative, metadata.len(), &checksum));
            }
        }

        Ok(objects)
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        let data = fs::read(self.resolve_path(path)).await?;
        Ok(Bytes::from(data))
    }

    async fn upload(
        &self,
        path: &str,
        content: Bytes,
        _checksum: &str,
        _content_type: &str,
    ) -> Result<()> {
        let full_path = self.resolve_path(path);

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // 使用临时文件写入，然后原子重命名
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".bunnysync-tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &full_path).await?;

        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full_path = self.resolve_path(path);
        fs::remove_file(&full_path).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
