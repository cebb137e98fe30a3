#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bunnysync::core::sha256_hex;
use bunnysync::{RemoteObject, Storage};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

/// 内存中的存储区，记录所有修改调用，可注入失败和延迟
pub struct MemoryStorage {
    zone: String,
    files: Mutex<BTreeMap<String, Bytes>>,
    uploads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
    fail_uploads: HashSet<String>,
    fail_list: Option<String>,
    list_delay: Duration,
}

impl MemoryStorage {
    pub fn new(zone: &str) -> Self {
        Self {
            zone: zone.to_string(),
            files: Mutex::new(BTreeMap::new()),
            uploads: Mutex::new(Vec::new()),
            deletes: Mutex::new(Vec::new()),
            fail_uploads: HashSet::new(),
            fail_list: None,
            list_delay: Duration::ZERO,
        }
    }

    pub fn with_file(self, path: &str, content: &[u8]) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), Bytes::copy_from_slice(content));
        self
    }

    pub fn failing_upload(mut self, path: &str) -> Self {
        self.fail_uploads.insert(path.to_string());
        self
    }

    pub fn failing_list(mut self, prefix: &str) -> Self {
        self.fail_list = Some(prefix.to_string());
        self
    }

    pub fn with_list_delay(mut self, delay: Duration) -> Self {
        self.list_delay = delay;
        self
    }

    pub fn paths(&self) -> Vec<String> {
        self.files.lock().unwrap().keys().cloned().collect()
    }

    pub fn content(&self, path: &str) -> Option<Bytes> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn uploads(&self) -> Vec<String> {
        let mut uploads = self.uploads.lock().unwrap().clone();
        uploads.sort();
        uploads
    }

    pub fn deletes(&self) -> Vec<String> {
        let mut deletes = self.deletes.lock().unwrap().clone();
        deletes.sort();
        deletes
    }

    pub fn reset_calls(&self) {
        self.uploads.lock().unwrap().clear();
        self.deletes.lock().unwrap().clear();
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    /// 返回前缀下的直接子项，路径形如 /<zone>/<path>
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        if !self.list_delay.is_zero() {
            tokio::time::sleep(self.list_delay).await;
        }
        if self.fail_list.as_deref() == Some(prefix) {
            return Err(anyhow!("list failed with status 500: internal error"));
        }

        let base = if prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", prefix)
        };
        let files = self.files.lock().unwrap();
        let mut dirs = BTreeSet::new();
        let mut objects = Vec::new();

        for (path, content) in files.iter() {
            let Some(rest) = path.strip_prefix(&base) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    dirs.insert(dir.to_string());
                }
                None => objects.push(RemoteObject::file(
                    format!("/{}/{}", self.zone, path),
                    content.len() as u64,
                    &sha256_hex(content).to_ascii_uppercase(),
                )),
            }
        }
        for dir in dirs {
            objects.push(RemoteObject::directory(format!("/{}/{}{}", self.zone, base, dir)));
        }
        Ok(objects)
    }

    async fn get(&self, path: &str) -> Result<Bytes> {
        self.content(path).ok_or_else(|| anyhow!("get failed with status 404"))
    }

    async fn upload(&self, path: &str, content: Bytes, checksum: &str, _content_type: &str) -> Result<()> {
        if self.fail_uploads.contains(path) {
            return Err(anyhow!("upload failed with status 400: checksum mismatch"));
        }
        assert_eq!(checksum, sha256_hex(&content));
        self.uploads.lock().unwrap().push(path.to_string());
        self.files.lock().unwrap().insert(path.to_string(), content);
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        if self.files.lock().unwrap().remove(path).is_none() {
            return Err(anyhow!("delete failed with status 404"));
        }
        self.deletes.lock().unwrap().push(path.to_string());
        Ok(())
    }

    fn zone_name(&self) -> Option<&str> {
        Some(&self.zone)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// 在 root 下写入文件，自动创建父目录
pub fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
    for (rel, content) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}
