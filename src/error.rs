//! 同步错误类型

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::core::SyncReport;

#[derive(Error, Debug)]
pub enum SyncError {
    /// 源目录无效，在任何工作开始前终止
    #[error("源路径无效 {}: {reason}", .path.display())]
    Path { path: PathBuf, reason: String },

    /// 列举远端目录失败，远端视图不完整，无法安全比较
    #[error("列举远端目录 '{prefix}' 失败: {message}")]
    Fetch { prefix: String, message: String },

    #[error("获取远端文件列表超时 ({}s)", .0.as_secs())]
    FetchTimeout(Duration),

    #[error("读取本地文件 {} 失败: {source}", .path.display())]
    LocalRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("文件名不是有效的 UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("上传 {path} 失败: {message}")]
    Upload { path: String, message: String },

    #[error("删除 {path} 失败: {message}")]
    Delete { path: String, message: String },

    /// 单项失败汇总，由最终判定函数产生
    #[error("同步完成，但有 {0} 个操作失败")]
    ItemFailures(u64),
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// 同步阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Prepare,
    Fetch,
    Walk,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Prepare => write!(f, "prepare"),
            SyncPhase::Fetch => write!(f, "fetch"),
            SyncPhase::Walk => write!(f, "walk"),
        }
    }
}

/// 致命错误，附带失败阶段和终止前的统计
#[derive(Error, Debug)]
#[error("同步在 {phase} 阶段终止: {source}")]
pub struct SyncAbort {
    pub phase: SyncPhase,
    pub source: SyncError,
    pub report: Box<SyncReport>,
}
