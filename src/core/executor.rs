//! 并发执行上传和删除
//!
//! 每个操作在启动前获取一个信号量许可，任务结束时释放（成功、失败或 panic 都会释放），
//! 同时进行中的传输调用数不超过 `concurrency`。单项失败只计数，不中断其他操作。

use crate::core::checksum::{read_and_digest, read_content, sha256_hex};
use crate::core::metrics::SyncMetrics;
use crate::core::walker::PendingOperation;
use crate::error::SyncError;
use crate::storage::{content_type_for, RemoteObject, Storage};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info};

/// 默认最大并发传输数
pub const DEFAULT_CONCURRENCY: usize = 5;

#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub concurrency: usize,
    pub dry_run: bool,
    /// 为 false 时仅报告远端多余的文件，不删除
    pub delete_remote: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            dry_run: false,
            delete_remote: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TaskKind {
    Upload,
    Delete,
}

pub struct Executor {
    storage: Arc<dyn Storage>,
    options: ExecutorOptions,
    metrics: Arc<SyncMetrics>,
    semaphore: Arc<Semaphore>,
}

impl Executor {
    pub fn new(storage: Arc<dyn Storage>, options: ExecutorOptions, metrics: Arc<SyncMetrics>) -> Self {
        let semaphore = Arc::new(Semaphore::new(options.concurrency.max(1)));
        Self {
            storage,
            options,
            metrics,
            semaphore,
        }
    }

    /// 先执行全部上传，再执行全部删除；所有任务结束后返回
    pub async fn execute(&self, uploads: Vec<PendingOperation>, residual: Vec<RemoteObject>) {
        info!(
            "开始执行: {} 个上传, {} 个远端多余条目{}",
            uploads.len(),
            residual.len(),
            if self.options.dry_run { " (dry-run)" } else { "" }
        );

        self.run_uploads(uploads).await;
        self.run_deletes(residual).await;
    }

    async fn run_uploads(&self, uploads: Vec<PendingOperation>) {
        let mut tasks = JoinSet::new();

        for op in uploads {
            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };
            let storage = self.storage.clone();
            let metrics = self.metrics.clone();
            let dry_run = self.options.dry_run;

            tasks.spawn(async move {
                let path = op.relative_path.clone();
                match upload_one(storage.as_ref(), op, dry_run).await {
                    Ok(bytes) => metrics.record_upload(bytes),
                    Err(e) => metrics.record_failure(&path, &e),
                }
                drop(permit);
            });
        }

        self.drain(tasks, TaskKind::Upload).await;
    }

    async fn run_deletes(&self, residual: Vec<RemoteObject>) {
        let mut tasks = JoinSet::new();

        for object in residual {
            // 目录占位条目不删除
            if object.is_directory {
                debug!("跳过远端目录: {}", object.relative_path);
                continue;
            }
            self.metrics.record_delete_candidate();

            if !self.options.delete_remote {
                info!("{} 本地不存在，保留远端文件", object.relative_path);
                continue;
            }

            let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                break;
            };
            let storage = self.storage.clone();
            let metrics = self.metrics.clone();
            let dry_run = self.options.dry_run;

            tasks.spawn(async move {
                let path = object.relative_path;
                info!(
                    "{} 本地不存在，从存储删除{}",
                    path,
                    if dry_run { " [dry-run]" } else { "" }
                );
                match delete_one(storage.as_ref(), &path, dry_run).await {
                    Ok(()) => metrics.record_delete(),
                    Err(e) => metrics.record_failure(&path, &e),
                }
                drop(permit);
            });
        }

        self.drain(tasks, TaskKind::Delete).await;
    }

    /// 等待全部任务；panic 的任务按所在阶段计为失败
    async fn drain(&self, mut tasks: JoinSet<()>, kind: TaskKind) {
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!("{:?} 任务异常退出: {}", kind, e);
                let path = "<task>".to_string();
                let message = e.to_string();
                let err = match kind {
                    TaskKind::Upload => SyncError::Upload { path, message },
                    TaskKind::Delete => SyncError::Delete { path, message },
                };
                self.metrics.record_failure("<task>", &err);
            }
        }
    }
}

/// 上传单个文件，返回字节数
async fn upload_one(storage: &dyn Storage, op: PendingOperation, dry_run: bool) -> Result<u64, SyncError> {
    let (content, checksum) = match (op.content, op.checksum) {
        (Some(content), Some(checksum)) => (content, checksum),
        (Some(content), None) => {
            let checksum = sha256_hex(&content);
            (content, checksum)
        }
        // 大文件在许可内重新读取，沿用比较时的校验和
        (None, Some(checksum)) => (read_content(&op.local_path).await?, checksum),
        (None, None) => read_and_digest(&op.local_path).await?,
    };
    let content_type = content_type_for(&op.relative_path);
    let bytes = content.len() as u64;

    info!(
        "上传 {} (checksum {}, {}){}",
        op.relative_path,
        checksum,
        content_type,
        if dry_run { " [dry-run]" } else { "" }
    );
    if dry_run {
        return Ok(bytes);
    }

    storage
        .upload(&op.relative_path, content, &checksum, &content_type)
        .await
        .map_err(|e| SyncError::Upload {
            path: op.relative_path.clone(),
            message: format!("{:#}", e),
        })?;
    Ok(bytes)
}

async fn delete_one(storage: &dyn Storage, path: &str, dry_run: bool) -> Result<(), SyncError> {
    if dry_run {
        return Ok(());
    }
    storage.delete(path).await.map_err(|e| SyncError::Delete {
        path: path.to_string(),
        message: format!("{:#}", e),
    })
}
