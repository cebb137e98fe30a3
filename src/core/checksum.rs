//! 内容摘要（与 Bunny 存储 API 一致，使用 SHA-256）

use crate::error::{Result, SyncError};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// 计算内容的小写十六进制 SHA-256
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// 不区分大小写比较两个十六进制摘要
pub fn checksums_match(local: &str, remote: &str) -> bool {
    !remote.is_empty() && local.eq_ignore_ascii_case(remote)
}

/// 在阻塞线程上读取文件并计算摘要，内容只读取一次
pub async fn read_and_digest(path: &Path) -> Result<(Bytes, String)> {
    let owned: PathBuf = path.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || {
        std::fs::read(&owned).map(|data| {
            let checksum = sha256_hex(&data);
            (Bytes::from(data), checksum)
        })
    })
    .await;

    match joined {
        Ok(Ok(read)) => Ok(read),
        Ok(Err(source)) => Err(SyncError::LocalRead {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) => Err(SyncError::LocalRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        }),
    }
}

/// 在阻塞线程上读取文件内容
pub async fn read_content(path: &Path) -> Result<Bytes> {
    let owned: PathBuf = path.to_path_buf();
    match tokio::task::spawn_blocking(move || std::fs::read(&owned)).await {
        Ok(Ok(data)) => Ok(Bytes::from(data)),
        Ok(Err(source)) => Err(SyncError::LocalRead {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) => Err(SyncError::LocalRead {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::Other, e),
        }),
    }
}
