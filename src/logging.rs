//! 日志模块 - 控制台日志和可选的文件日志

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// 日志文件名
pub const LOG_FILE_NAME: &str = "bunnysync.log";

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogConfig {
    /// 日志级别: "error", "warn", "info", "debug", "trace"
    #[serde(default = "default_level")]
    pub level: String,
    /// 设置后同时写入该目录下的日志文件
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
        }
    }
}

impl LogConfig {
    /// 将配置的日志级别转换为 tracing Level
    pub fn tracing_level(&self) -> tracing::Level {
        match self.level.to_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    /// -v 提升到 debug，-vv 及以上提升到 trace
    pub fn effective_level(&self, verbose: u8) -> tracing::Level {
        match verbose {
            0 => self.tracing_level(),
            1 => tracing::Level::DEBUG.max(self.tracing_level()),
            _ => tracing::Level::TRACE,
        }
    }
}

fn build_filter(level: tracing::Level) -> EnvFilter {
    // RUST_LOG 优先于配置
    let base = std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| level.as_str().to_lowercase());

    EnvFilter::try_new(format!("{},hyper=warn,reqwest=warn", base))
        .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"))
}

/// 初始化日志系统
///
/// 控制台日志写到 stderr，stdout 留给报告输出。返回的 guard 需要持有到进程结束，
/// 否则文件日志可能丢失尾部内容。
pub fn init_logging(config: &LogConfig, verbose: u8) -> Option<WorkerGuard> {
    let env_filter = build_filter(config.effective_level(verbose));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    let mut guard = None;
    let file_layer = config.directory.as_ref().and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("无法创建日志目录 {}: {}", dir.display(), e);
            return None;
        }
        let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        guard = Some(worker);
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(false),
        )
    });

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("日志系统初始化失败: {}", e);
    }

    guard
}
