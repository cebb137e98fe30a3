//! 应用配置模块

use crate::logging::LogConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// API 密钥环境变量
pub const API_KEY_ENV: &str = "BCDN_APIKEY";
/// 存储 API 地址环境变量
pub const ENDPOINT_ENV: &str = "BCDN_ENDPOINT";

/// 配置文件 config.json
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    /// 存储 API 地址，未设置时使用默认地址
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default)]
    pub log: LogConfig,
}

fn default_concurrency() -> usize {
    crate::core::executor::DEFAULT_CONCURRENCY
}

fn default_fetch_workers() -> usize {
    crate::core::fetcher::DEFAULT_FETCH_WORKERS
}

fn default_fetch_timeout_secs() -> u64 {
    crate::core::fetcher::DEFAULT_FETCH_TIMEOUT.as_secs()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            concurrency: default_concurrency(),
            fetch_workers: default_fetch_workers(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            log: LogConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// 显式指定的文件必须存在且格式正确；默认位置的文件不存在时使用默认值。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式错误 {}", path.display()))
    }
}

/// 默认配置文件位置: <配置目录>/bunnysync/config.json
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bunnysync").join("config.json"))
}

/// 从环境变量读取 API 密钥，空值视为未设置
pub fn api_key_from_env() -> Option<String> {
    non_empty(std::env::var(API_KEY_ENV).ok())
}

pub fn endpoint_from_env() -> Option<String> {
    non_empty(std::env::var(ENDPOINT_ENV).ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
