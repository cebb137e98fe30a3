//! 同步统计

use crate::error::SyncError;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::warn;

/// 本地文件的分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Modified,
    Skipped,
}

/// 所有阶段共享的计数器
#[derive(Debug, Default)]
pub struct SyncMetrics {
    total_scanned: AtomicU64,
    new_files: AtomicU64,
    modified_files: AtomicU64,
    deleted_files: AtomicU64,
    skipped_files: AtomicU64,
    error_count: AtomicU64,
    uploaded_files: AtomicU64,
    bytes_uploaded: AtomicU64,
    delete_candidates: AtomicU64,
    failures: Mutex<Vec<String>>,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一个本地文件的分类，同时计入扫描总数
    pub fn record_classification(&self, class: Classification) {
        self.total_scanned.fetch_add(1, Ordering::Relaxed);
        let counter = match class {
            Classification::New => &self.new_files,
            Classification::Modified => &self.modified_files,
            Classification::Skipped => &self.skipped_files,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upload(&self, bytes: u64) {
        self.uploaded_files.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_delete(&self) {
        self.deleted_files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delete_candidate(&self) {
        self.delete_candidates.fetch_add(1, Ordering::Relaxed);
    }

    /// 记录单项失败，不影响其他操作
    pub fn record_failure(&self, item: &str, error: &SyncError) {
        warn!("{}", error);
        self.error_count.fetch_add(1, Ordering::Relaxed);
        let entry = format!("{}: {}", item, error);
        match self.failures.lock() {
            Ok(mut failures) => failures.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }

    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> Vec<String> {
        match self.failures.lock() {
            Ok(failures) => failures.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            total_scanned: self.total_scanned.load(Ordering::Relaxed),
            new_files: self.new_files.load(Ordering::Relaxed),
            modified_files: self.modified_files.load(Ordering::Relaxed),
            deleted_files: self.deleted_files.load(Ordering::Relaxed),
            skipped_files: self.skipped_files.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            uploaded_files: self.uploaded_files.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
            delete_candidates: self.delete_candidates.load(Ordering::Relaxed),
        }
    }
}

/// 同步结束后读取的一次性快照
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub total_scanned: u64,
    pub new_files: u64,
    pub modified_files: u64,
    pub deleted_files: u64,
    pub skipped_files: u64,
    pub error_count: u64,
    pub uploaded_files: u64,
    pub bytes_uploaded: u64,
    pub delete_candidates: u64,
}

impl MetricsSnapshot {
    /// 扫描总数 == 新增 + 修改 + 跳过
    pub fn is_consistent(&self) -> bool {
        self.total_scanned == self.new_files + self.modified_files + self.skipped_files
    }

    pub fn scheduled_uploads(&self) -> u64 {
        self.new_files + self.modified_files
    }
}
