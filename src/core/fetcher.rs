//! 远端状态获取
//!
//! 以目录前缀为单位的工作队列 + 固定数量的 worker。每个 worker 列举一个前缀，
//! 子目录重新入队，文件写入共享的 [`RemoteStateMap`]。待处理计数归零时关闭队列，
//! 任意一次列举失败或超时都会丢弃已获取的部分结果。

use crate::core::path::normalize_path;
use crate::core::state::RemoteStateMap;
use crate::error::{Result, SyncError};
use crate::storage::{RemoteObject, Storage};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// 默认并发列举数
pub const DEFAULT_FETCH_WORKERS: usize = 8;
/// 默认获取超时
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(600);

pub struct RemoteFetcher {
    storage: Arc<dyn Storage>,
    workers: usize,
    timeout: Duration,
}

/// worker 之间共享的状态
struct FetchContext {
    storage: Arc<dyn Storage>,
    zone: Option<String>,
    state: RemoteStateMap,
    queue: mpsc::UnboundedSender<String>,
    receiver: Mutex<mpsc::UnboundedReceiver<String>>,
    /// 已入队但尚未处理完的前缀数
    pending: AtomicUsize,
    visited: std::sync::Mutex<HashSet<String>>,
    first_error: std::sync::Mutex<Option<SyncError>>,
    done: CancellationToken,
}

impl RemoteFetcher {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            workers: DEFAULT_FETCH_WORKERS,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 获取前缀下的全部远端文件，空前缀表示存储区根目录
    pub async fn fetch(&self, root_prefix: &str) -> Result<RemoteStateMap> {
        let started = Instant::now();
        let zone = self.storage.zone_name().map(str::to_string);
        let root = normalize_path(root_prefix, None);
        info!(
            "开始获取远端文件列表: {}, prefix: '{}', workers: {}",
            self.storage.name(),
            root,
            self.workers
        );

        let (queue, receiver) = mpsc::unbounded_channel();
        let state = RemoteStateMap::new();
        let ctx = Arc::new(FetchContext {
            storage: self.storage.clone(),
            zone,
            state: state.clone(),
            queue,
            receiver: Mutex::new(receiver),
            pending: AtomicUsize::new(0),
            visited: std::sync::Mutex::new(HashSet::new()),
            first_error: std::sync::Mutex::new(None),
            done: CancellationToken::new(),
        });

        ctx.enqueue(root);

        let mut workers = JoinSet::new();
        for id in 0..self.workers {
            let ctx = ctx.clone();
            workers.spawn(async move { ctx.run_worker(id).await });
        }

        let joined = tokio::time::timeout(self.timeout, join_all(&mut workers, &ctx)).await;
        if joined.is_err() {
            ctx.done.cancel();
            workers.abort_all();
            state.clear().await;
            warn!("获取远端文件列表超时 ({:?})", self.timeout);
            return Err(SyncError::FetchTimeout(self.timeout));
        }

        if let Some(err) = ctx.take_error() {
            state.clear().await;
            return Err(err);
        }

        info!(
            "远端文件列表获取完成: {} 个文件, 耗时 {:?}",
            state.len().await,
            started.elapsed()
        );
        Ok(state)
    }
}

async fn join_all(workers: &mut JoinSet<()>, ctx: &FetchContext) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            ctx.fail(SyncError::Fetch {
                prefix: String::new(),
                message: format!("列举任务异常退出: {}", e),
            });
        }
    }
}

impl FetchContext {
    async fn run_worker(&self, id: usize) {
        loop {
            let next = tokio::select! {
                _ = self.done.cancelled() => None,
                prefix = async { self.receiver.lock().await.recv().await } => prefix,
            };
            let Some(prefix) = next else {
                break;
            };
            if self.done.is_cancelled() {
                break;
            }

            debug!("worker {} 列举目录: '{}'", id, prefix);
            match self.storage.list(&prefix).await {
                Ok(entries) => {
                    for entry in entries {
                        self.accept(entry).await;
                    }
                }
                Err(e) => {
                    self.fail(SyncError::Fetch {
                        prefix,
                        message: format!("{:#}", e),
                    });
                    break;
                }
            }

            // 子项全部入队或写入后才算处理完
            if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                debug!("远端目录队列已清空");
                self.done.cancel();
            }
        }
    }

    async fn accept(&self, entry: RemoteObject) {
        let path = normalize_path(&entry.relative_path, self.zone.as_deref());
        if path.is_empty() {
            return;
        }

        if entry.is_directory {
            self.enqueue(path);
        } else if let Some(previous) = self.state.insert(entry.with_path(path)).await {
            debug!("远端路径重复出现: {}", previous.relative_path);
        }
    }

    fn enqueue(&self, prefix: String) {
        let fresh = match self.visited.lock() {
            Ok(mut visited) => visited.insert(prefix.clone()),
            Err(poisoned) => poisoned.into_inner().insert(prefix.clone()),
        };
        if !fresh {
            debug!("目录已处理过，跳过: '{}'", prefix);
            return;
        }

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.queue.send(prefix).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// 记录第一个错误并通知所有 worker 停止
    fn fail(&self, err: SyncError) {
        warn!("{}", err);
        let mut slot = match self.first_error.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.is_none() {
            *slot = Some(err);
        }
        drop(slot);
        self.done.cancel();
    }

    fn take_error(&self) -> Option<SyncError> {
        match self.first_error.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}
