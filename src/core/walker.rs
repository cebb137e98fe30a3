//! 本地目录遍历与差异分类
//!
//! 分类按遍历顺序串行进行，每匹配到一个远端条目就立即从 [`RemoteStateMap`] 中移除，
//! 遍历结束后剩余条目即为待删除集合。校验和比较放在阻塞线程上并发计算，结果仍保持遍历顺序。

use crate::core::checksum::{checksums_match, read_and_digest};
use crate::core::metrics::{Classification, SyncMetrics};
use crate::core::path::{join_remote, normalize_path};
use crate::core::state::RemoteStateMap;
use crate::error::{Result, SyncError};
use crate::storage::RemoteObject;
use bytes::Bytes;
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use walkdir::WalkDir;

/// 比较时读取的内容不超过此大小才随操作保留，更大的文件在上传前重新读取
pub const CARRY_CONTENT_LIMIT: u64 = 64 * 1024;

/// 已存在文件的比较方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CompareMode {
    /// 比较内容 SHA-256
    #[default]
    Checksum,
    /// 只比较文件大小（更快，但检测不到大小相同的修改）
    SizeOnly,
}

#[derive(Debug, Clone)]
pub struct WalkOptions {
    pub compare_mode: CompareMode,
    /// 远端已存在的文件一律跳过
    pub only_missing: bool,
    /// 加在每个本地相对路径前的远端目录
    pub sync_path: String,
    /// 同时计算校验和的文件数
    pub hash_parallelism: usize,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            compare_mode: CompareMode::Checksum,
            only_missing: false,
            sync_path: String::new(),
            hash_parallelism: 4,
        }
    }
}

/// 待上传的文件
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub local_path: PathBuf,
    pub relative_path: String,
    pub size_bytes: u64,
    /// 比较时已计算的校验和
    pub checksum: Option<String>,
    /// 比较时已读取的小文件内容，上传时复用
    pub content: Option<Bytes>,
    pub is_new_file: bool,
}

impl PendingOperation {
    fn new_file(entry: LocalEntry) -> Self {
        Self {
            local_path: entry.local_path,
            relative_path: entry.relative_path,
            size_bytes: entry.size,
            checksum: None,
            content: None,
            is_new_file: true,
        }
    }

    fn modified(entry: LocalEntry) -> Self {
        Self {
            is_new_file: false,
            ..Self::new_file(entry)
        }
    }
}

#[derive(Debug)]
struct LocalEntry {
    local_path: PathBuf,
    relative_path: String,
    size: u64,
}

/// 分类后的中间结果
enum Planned {
    Ready(PendingOperation),
    Verify(LocalEntry, RemoteObject),
}

pub struct LocalWalker {
    options: WalkOptions,
    metrics: Arc<SyncMetrics>,
}

impl LocalWalker {
    pub fn new(options: WalkOptions, metrics: Arc<SyncMetrics>) -> Self {
        Self { options, metrics }
    }

    /// 遍历本地目录，返回待上传列表；已匹配的远端条目从 `remote` 中移除
    pub async fn walk(&self, root: &Path, remote: &RemoteStateMap) -> Result<Vec<PendingOperation>> {
        validate_root(root).await?;

        let sync_path = normalize_path(&self.options.sync_path, None);
        let walk_root = root.to_path_buf();
        let (entries, errors) =
            tokio::task::spawn_blocking(move || collect_entries(&walk_root, &sync_path))
                .await
                .map_err(|e| SyncError::Path {
                    path: root.to_path_buf(),
                    reason: format!("遍历任务异常退出: {}", e),
                })??;

        for err in &errors {
            self.metrics.record_failure(&local_item(err), err);
        }
        info!("本地扫描完成: {} 个文件, {} 个错误", entries.len(), errors.len());

        let mut plan = Vec::with_capacity(entries.len());
        for entry in entries {
            if let Some(planned) = self.classify(entry, remote).await {
                plan.push(planned);
            }
        }

        let operations: Vec<PendingOperation> = futures::stream::iter(plan)
            .map(|planned| self.resolve(planned))
            .buffered(self.options.hash_parallelism.max(1))
            .filter_map(|op| async move { op })
            .collect()
            .await;

        debug!("待上传 {} 个文件", operations.len());
        Ok(operations)
    }

    async fn classify(&self, entry: LocalEntry, remote: &RemoteStateMap) -> Option<Planned> {
        let Some(object) = remote.take(&entry.relative_path).await else {
            debug!("{} 远端不存在，标记上传", entry.relative_path);
            self.metrics.record_classification(Classification::New);
            return Some(Planned::Ready(PendingOperation::new_file(entry)));
        };

        if self.options.only_missing {
            debug!("{} 远端已存在，跳过 (only-missing)", entry.relative_path);
            self.metrics.record_classification(Classification::Skipped);
            return None;
        }

        match self.options.compare_mode {
            CompareMode::SizeOnly => {
                if entry.size != object.size_bytes {
                    debug!(
                        "{} 大小不同 (本地: {}, 远端: {})，标记上传",
                        entry.relative_path, entry.size, object.size_bytes
                    );
                    self.metrics.record_classification(Classification::Modified);
                    Some(Planned::Ready(PendingOperation::modified(entry)))
                } else {
                    debug!("{} 大小相同，跳过", entry.relative_path);
                    self.metrics.record_classification(Classification::Skipped);
                    None
                }
            }
            CompareMode::Checksum => Some(Planned::Verify(entry, object)),
        }
    }

    async fn resolve(&self, planned: Planned) -> Option<PendingOperation> {
        let (entry, object) = match planned {
            Planned::Ready(op) => return Some(op),
            Planned::Verify(entry, object) => (entry, object),
        };

        match read_and_digest(&entry.local_path).await {
            Ok((content, checksum)) => {
                if checksums_match(&checksum, &object.checksum_hex) {
                    debug!("{} 校验和一致，跳过", entry.relative_path);
                    self.metrics.record_classification(Classification::Skipped);
                    None
                } else {
                    debug!("{} 校验和不同，标记上传", entry.relative_path);
                    self.metrics.record_classification(Classification::Modified);
                    let mut op = PendingOperation::modified(entry);
                    op.size_bytes = content.len() as u64;
                    op.checksum = Some(checksum);
                    if op.size_bytes <= CARRY_CONTENT_LIMIT {
                        op.content = Some(content);
                    }
                    Some(op)
                }
            }
            Err(e) => {
                // 远端条目已移除，读取失败的本地文件不会被当作待删除
                self.metrics.record_classification(Classification::Skipped);
                self.metrics.record_failure(&entry.relative_path, &e);
                None
            }
        }
    }
}

/// 源目录必须存在且是目录
pub async fn validate_root(root: &Path) -> Result<()> {
    match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(SyncError::Path {
            path: root.to_path_buf(),
            reason: "不是目录".to_string(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(SyncError::Path {
            path: root.to_path_buf(),
            reason: "路径不存在".to_string(),
        }),
        Err(e) => Err(SyncError::Path {
            path: root.to_path_buf(),
            reason: format!("无法访问: {}", e),
        }),
    }
}

fn local_item(err: &SyncError) -> String {
    match err {
        SyncError::LocalRead { path, .. } | SyncError::NonUtf8Path(path) => {
            path.display().to_string()
        }
        other => other.to_string(),
    }
}

/// 遍历本地文件（阻塞），返回文件列表和单项错误
fn collect_entries(root: &Path, sync_path: &str) -> Result<(Vec<LocalEntry>, Vec<SyncError>)> {
    let mut entries = Vec::new();
    let mut errors = Vec::new();

    for item in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                if e.depth() == 0 {
                    return Err(SyncError::Path {
                        path,
                        reason: format!("无法读取: {}", e),
                    });
                }
                errors.push(SyncError::LocalRead {
                    path,
                    source: io::Error::from(e),
                });
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        // 符号链接只跟随到普通文件
        let metadata = if file_type.is_symlink() {
            std::fs::metadata(entry.path())
        } else {
            entry.metadata().map_err(io::Error::from)
        };
        let size = match metadata {
            Ok(meta) if meta.is_dir() => {
                debug!("跳过指向目录的符号链接: {}", entry.path().display());
                continue;
            }
            Ok(meta) => meta.len(),
            Err(source) => {
                errors.push(SyncError::LocalRead {
                    path: entry.path().to_path_buf(),
                    source,
                });
                continue;
            }
        };

        let Some(relative) = relative_key(root, entry.path()) else {
            errors.push(SyncError::NonUtf8Path(entry.path().to_path_buf()));
            continue;
        };

        entries.push(LocalEntry {
            relative_path: join_remote(sync_path, &relative),
            local_path: entry.into_path(),
            size,
        });
    }

    Ok((entries, errors))
}

/// 本地路径转换为 / 分隔的相对路径
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
