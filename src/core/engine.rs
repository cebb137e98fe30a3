use crate::core::executor::{Executor, ExecutorOptions, DEFAULT_CONCURRENCY};
use crate::core::fetcher::{RemoteFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_FETCH_WORKERS};
use crate::core::metrics::{MetricsSnapshot, SyncMetrics};
use crate::core::path::normalize_path;
use crate::core::walker::{validate_root, CompareMode, LocalWalker, WalkOptions};
use crate::error::{SyncAbort, SyncError, SyncPhase};
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub dry_run: bool,
    pub compare_mode: CompareMode,
    pub only_missing: bool,
    /// 删除本地不存在的远端文件
    pub delete_remote: bool,
    /// 最大并发传输数
    pub concurrency: usize,
    pub fetch_workers: usize,
    pub fetch_timeout: Duration,
    /// 远端目标子目录，空表示存储区根目录
    pub sync_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            compare_mode: CompareMode::Checksum,
            only_missing: false,
            delete_remote: true,
            concurrency: DEFAULT_CONCURRENCY,
            fetch_workers: DEFAULT_FETCH_WORKERS,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            sync_path: String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncStatus {
    Completed,
    CompletedWithErrors,
    Aborted,
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub zone: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_ms: u64,
    pub status: SyncStatus,
    pub dry_run: bool,
    pub metrics: MetricsSnapshot,
    pub errors: Vec<String>,
}

impl SyncReport {
    /// 未进入同步阶段就终止时的空报告
    pub fn aborted(zone: impl Into<String>, dry_run: bool, error: String) -> Self {
        let now = Utc::now();
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            zone: zone.into(),
            start_time: now,
            end_time: now,
            duration_ms: 0,
            status: SyncStatus::Aborted,
            dry_run,
            metrics: MetricsSnapshot::default(),
            errors: vec![error],
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Completed
    }

    /// 有任何单项失败即视为同步失败
    pub fn into_result(self) -> Result<SyncReport, SyncError> {
        match self.status {
            SyncStatus::Completed => Ok(self),
            _ => Err(SyncError::ItemFailures(self.metrics.error_count.max(1))),
        }
    }
}

/// 根据最终统计判定结果
pub fn evaluate(metrics: &MetricsSnapshot) -> SyncStatus {
    if metrics.error_count > 0 {
        SyncStatus::CompletedWithErrors
    } else {
        SyncStatus::Completed
    }
}

/// 单次运行的上下文
struct RunContext {
    run_id: String,
    zone: String,
    start_time: DateTime<Utc>,
    started: Instant,
    metrics: Arc<SyncMetrics>,
}

impl RunContext {
    fn report(&self, status: SyncStatus, dry_run: bool) -> SyncReport {
        SyncReport {
            run_id: self.run_id.clone(),
            zone: self.zone.clone(),
            start_time: self.start_time,
            end_time: Utc::now(),
            duration_ms: self.started.elapsed().as_millis() as u64,
            status,
            dry_run,
            metrics: self.metrics.snapshot(),
            errors: self.metrics.failures(),
        }
    }
}

/// 同步引擎：获取远端状态、遍历本地目录、执行上传和删除
pub struct SyncEngine {
    storage: Arc<dyn Storage>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(storage: Arc<dyn Storage>, config: SyncConfig) -> Self {
        Self { storage, config }
    }

    /// 执行一次完整同步
    ///
    /// 源目录无效、远端列举失败或超时时返回 [`SyncAbort`]，此时不会发出任何上传或删除。
    /// 单项失败不会中断同步，只体现在报告的 `errorCount` 中。
    pub async fn run(&self, source: &Path) -> Result<SyncReport, SyncAbort> {
        let ctx = RunContext {
            run_id: uuid::Uuid::new_v4().to_string(),
            zone: self
                .storage
                .zone_name()
                .unwrap_or_else(|| self.storage.name())
                .to_string(),
            start_time: Utc::now(),
            started: Instant::now(),
            metrics: Arc::new(SyncMetrics::new()),
        };
        let span = info_span!("sync", run_id = %ctx.run_id, zone = %ctx.zone);
        self.run_phases(&ctx, source).instrument(span).await
    }

    async fn run_phases(&self, ctx: &RunContext, source: &Path) -> Result<SyncReport, SyncAbort> {
        info!(
            "开始同步: {} -> {}{}",
            source.display(),
            ctx.zone,
            if self.config.dry_run { " (dry-run)" } else { "" }
        );

        validate_root(source)
            .await
            .map_err(|e| self.abort(ctx, SyncPhase::Prepare, e))?;

        let sync_path = normalize_path(&self.config.sync_path, None);
        let remote = RemoteFetcher::new(self.storage.clone())
            .with_workers(self.config.fetch_workers)
            .with_timeout(self.config.fetch_timeout)
            .fetch(&sync_path)
            .await
            .map_err(|e| self.abort(ctx, SyncPhase::Fetch, e))?;
        info!("远端共 {} 个文件", remote.len().await);

        let walker = LocalWalker::new(
            WalkOptions {
                compare_mode: self.config.compare_mode,
                only_missing: self.config.only_missing,
                sync_path,
                ..Default::default()
            },
            ctx.metrics.clone(),
        );
        let uploads = walker
            .walk(source, &remote)
            .await
            .map_err(|e| self.abort(ctx, SyncPhase::Walk, e))?;

        // 遍历结束后剩余的条目在本地不存在
        let residual = remote.drain_sorted().await;

        let executor = Executor::new(
            self.storage.clone(),
            ExecutorOptions {
                concurrency: self.config.concurrency,
                dry_run: self.config.dry_run,
                delete_remote: self.config.delete_remote,
            },
            ctx.metrics.clone(),
        );
        executor.execute(uploads, residual).await;

        let snapshot = ctx.metrics.snapshot();
        let status = evaluate(&snapshot);
        let report = ctx.report(status, self.config.dry_run);

        info!(
            "同步完成: 扫描 {}, 新增 {}, 修改 {}, 删除 {}, 跳过 {}, 错误 {}, 耗时 {}ms",
            snapshot.total_scanned,
            snapshot.new_files,
            snapshot.modified_files,
            snapshot.deleted_files,
            snapshot.skipped_files,
            snapshot.error_count,
            report.duration_ms
        );
        if status == SyncStatus::CompletedWithErrors {
            warn!("{} 个操作失败", snapshot.error_count);
        }

        Ok(report)
    }

    fn abort(&self, ctx: &RunContext, phase: SyncPhase, source: SyncError) -> SyncAbort {
        error!("同步终止 ({}): {}", phase, source);
        let mut report = ctx.report(SyncStatus::Aborted, self.config.dry_run);
        report.errors.push(source.to_string());
        SyncAbort {
            phase,
            source,
            report: Box::new(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evaluate() {
        let mut snap = MetricsSnapshot::default();
        assert_eq!(evaluate(&snap), SyncStatus::Completed);

        snap.error_count = 1;
        assert_eq!(evaluate(&snap), SyncStatus::CompletedWithErrors);
    }

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.concurrency, 5);
        assert!(config.delete_remote);
        assert!(!config.dry_run);
        assert_eq!(config.fetch_timeout, Duration::from_secs(600));
    }

    fn report(status: SyncStatus, errors: u64) -> SyncReport {
        SyncReport {
            run_id: "run".into(),
            zone: "zone".into(),
            start_time: Utc::now(),
            end_time: Utc::now(),
            duration_ms: 0,
            status,
            dry_run: false,
            metrics: MetricsSnapshot {
                error_count: errors,
                ..Default::default()
            },
            errors: Vec::new(),
        }
    }

    #[test]
    fn test_into_result() {
        assert!(report(SyncStatus::Completed, 0).into_result().is_ok());
        let err = report(SyncStatus::CompletedWithErrors, 3)
            .into_result()
            .unwrap_err();
        assert!(matches!(err, SyncError::ItemFailures(3)));
    }

    #[test]
    fn test_aborted_report_is_empty() {
        let report = SyncReport::aborted("zone", true, "no key".into());
        assert_eq!(report.status, SyncStatus::Aborted);
        assert_eq!(report.metrics, MetricsSnapshot::default());
        assert_eq!(report.errors, ["no key"]);
        assert!(report.dry_run);
        assert!(!report.is_success());
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let json = serde_json::to_value(report(SyncStatus::CompletedWithErrors, 2)).unwrap();
        assert_eq!(json["status"], "completedWithErrors");
        assert_eq!(json["metrics"]["errorCount"], 2);
        assert!(json.get("durationMs").is_some());
        assert!(json.get("runId").is_some());
    }
}
