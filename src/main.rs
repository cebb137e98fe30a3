//! bunnysync: 将本地目录单向同步到 BunnyCDN 存储区

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use clap::Parser;
use tracing::{error, info};

use bunnysync::config::{api_key_from_env, endpoint_from_env, AppConfig, API_KEY_ENV};
use bunnysync::logging::init_logging;
use bunnysync::storage::bunny::DEFAULT_ENDPOINT;
use bunnysync::{create_storage, CompareMode, StorageTarget, SyncConfig, SyncEngine, SyncReport};

#[derive(Parser, Debug)]
#[command(name = "bunnysync")]
#[command(version)]
#[command(about = "One-way sync of a local directory into a BunnyCDN storage zone")]
#[command(long_about = r#"
Mirrors SOURCE into the storage zone ZONE: uploads new and changed files
and deletes remote files that no longer exist locally.

The API key is read from the BCDN_APIKEY environment variable.

Examples:
  bunnysync ./dist my-zone                      Sync ./dist to zone root
  bunnysync ./dist my-zone --sync-path /www     Sync under /www
  bunnysync ./dist my-zone --dry-run            Show what would change
"#)]
struct Cli {
    /// Local directory to upload
    source: PathBuf,

    /// Storage zone name
    zone: String,

    /// Report what would change without uploading or deleting
    #[arg(long)]
    dry_run: bool,

    /// Compare existing files by size only (skips checksums)
    #[arg(long)]
    size_only: bool,

    /// Only upload files missing from the zone
    #[arg(long)]
    only_missing: bool,

    /// Keep remote files that no longer exist locally
    #[arg(long)]
    no_delete: bool,

    /// Maximum concurrent uploads/deletes
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    concurrency: Option<u64>,

    /// Remote directory inside the zone
    #[arg(long, default_value = "")]
    sync_path: String,

    /// Storage API endpoint (overrides BCDN_ENDPOINT and config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Use a local directory as the zone instead of BunnyCDN
    #[arg(long, value_name = "DIR")]
    local_target: Option<PathBuf>,

    /// Config file (default: <config dir>/bunnysync/config.json)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the final report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let app_config = match AppConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("错误: {:#}", e);
            return ExitCode::FAILURE;
        }
    };
    let _guard = init_logging(&app_config.log, cli.verbose);

    let outcome = run(&cli, &app_config, api_key_from_env()).await;
    let report = match &outcome {
        Ok(report) => report,
        Err(failure) => &failure.report,
    };
    if let Err(e) = print_report(report, cli.json) {
        error!("无法输出报告: {:#}", e);
    }

    match outcome {
        Ok(report) if report.is_success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(failure) => {
            error!("{:#}", failure.error);
            ExitCode::FAILURE
        }
    }
}

/// 同步未完成，附带终止时的报告
struct RunFailure {
    report: SyncReport,
    error: anyhow::Error,
}

async fn run(cli: &Cli, app_config: &AppConfig, api_key: Option<String>) -> Result<SyncReport, RunFailure> {
    let prepare_failed = |error: anyhow::Error| RunFailure {
        report: SyncReport::aborted(cli.zone.clone(), cli.dry_run, format!("{:#}", error)),
        error,
    };

    if cli.zone.trim().is_empty() {
        return Err(prepare_failed(anyhow!("存储区名称不能为空")));
    }
    let storage = resolve_target(cli, app_config, api_key)
        .and_then(|target| create_storage(&target))
        .map_err(prepare_failed)?;

    let config = SyncConfig {
        dry_run: cli.dry_run,
        compare_mode: if cli.size_only {
            CompareMode::SizeOnly
        } else {
            CompareMode::Checksum
        },
        only_missing: cli.only_missing,
        delete_remote: !cli.no_delete,
        concurrency: cli
            .concurrency
            .map_or(app_config.concurrency, |n| n as usize)
            .max(1),
        fetch_workers: app_config.fetch_workers.max(1),
        fetch_timeout: Duration::from_secs(app_config.fetch_timeout_secs),
        sync_path: cli.sync_path.clone(),
    };
    print_banner(cli, &config);

    // 源目录无效时由引擎在 prepare 阶段终止
    let engine = SyncEngine::new(storage, config);
    engine.run(&cli.source).await.map_err(|abort| RunFailure {
        report: (*abort.report).clone(),
        error: anyhow::Error::new(abort).context("同步失败"),
    })
}

fn resolve_target(cli: &Cli, app_config: &AppConfig, api_key: Option<String>) -> Result<StorageTarget> {
    if let Some(root) = &cli.local_target {
        return Ok(StorageTarget::Local { root: root.clone() });
    }

    let Some(api_key) = api_key else {
        bail!("未设置 API 密钥，请设置环境变量 {}", API_KEY_ENV);
    };
    let endpoint = cli
        .endpoint
        .clone()
        .or_else(endpoint_from_env)
        .or_else(|| app_config.endpoint.clone())
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

    Ok(StorageTarget::Bunny {
        zone: cli.zone.clone(),
        api_key,
        endpoint,
    })
}

fn print_banner(cli: &Cli, config: &SyncConfig) {
    info!("源目录: {}", cli.source.display());
    info!("存储区: {}", cli.zone);
    if !config.sync_path.is_empty() {
        info!("同步路径: {}", config.sync_path);
    }
    info!(
        "比较方式: {}, 仅上传缺失: {}, 删除远端多余文件: {}, 并发: {}{}",
        match config.compare_mode {
            CompareMode::Checksum => "checksum",
            CompareMode::SizeOnly => "size",
        },
        config.only_missing,
        config.delete_remote,
        config.concurrency,
        if config.dry_run { ", dry-run" } else { "" }
    );
}

fn print_report(report: &SyncReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    let m = &report.metrics;
    println!("Summary{}:", if report.dry_run { " (dry-run)" } else { "" });
    println!("  Scanned:   {}", m.total_scanned);
    println!("  New:       {}", m.new_files);
    println!("  Modified:  {}", m.modified_files);
    println!("  Deleted:   {}", m.deleted_files);
    println!("  Skipped:   {}", m.skipped_files);
    println!("  Errors:    {}", m.error_count);
    println!("  Uploaded:  {} files, {} bytes", m.uploaded_files, m.bytes_uploaded);
    println!("  Duration:  {}ms", report.duration_ms);
    for failure in &report.errors {
        println!("  ! {}", failure);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bunnysync::SyncStatus;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::parse_from([
            "bunnysync",
            "./dist",
            "my-zone",
            "--dry-run",
            "--size-only",
            "--no-delete",
            "-c",
            "3",
            "--sync-path",
            "/www/",
            "-vv",
        ]);
        assert_eq!(cli.zone, "my-zone");
        assert!(cli.dry_run && cli.size_only && cli.no_delete);
        assert!(!cli.only_missing);
        assert_eq!(cli.concurrency, Some(3));
        assert_eq!(cli.sync_path, "/www/");
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_rejects_zero_concurrency() {
        assert!(Cli::try_parse_from(["bunnysync", "./dist", "zone", "--concurrency", "0"]).is_err());
    }

    #[test]
    fn test_local_target_needs_no_api_key() {
        let cli = Cli::parse_from(["bunnysync", "./dist", "zone", "--local-target", "/tmp/zone"]);
        let target = resolve_target(&cli, &AppConfig::default(), None).unwrap();
        assert!(matches!(target, StorageTarget::Local { .. }));
    }

    fn cli_for(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("bunnysync").chain(args.iter().copied()))
    }

    #[tokio::test]
    async fn test_missing_api_key_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().to_str().unwrap();
        let cli = cli_for(&[source, "zone"]);

        let failure = run(&cli, &AppConfig::default(), None).await.err().unwrap();
        assert_eq!(failure.report.status, SyncStatus::Aborted);
        assert_eq!(failure.report.metrics, Default::default());
        assert!(failure.report.errors[0].contains(API_KEY_ENV));
    }

    #[tokio::test]
    async fn test_empty_zone_still_reports() {
        let dir = tempfile::tempdir().unwrap();
        let cli = cli_for(&[dir.path().to_str().unwrap(), " "]);

        let failure = run(&cli, &AppConfig::default(), Some("key".into()))
            .await
            .err()
            .unwrap();
        assert_eq!(failure.report.status, SyncStatus::Aborted);
        assert_eq!(failure.report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_source_aborts_in_prepare_with_report() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let target = dir.path().join("zone");
        let cli = cli_for(&[
            missing.to_str().unwrap(),
            "zone",
            "--local-target",
            target.to_str().unwrap(),
        ]);

        let failure = run(&cli, &AppConfig::default(), None).await.err().unwrap();
        assert_eq!(failure.report.status, SyncStatus::Aborted);
        assert_eq!(failure.report.metrics.total_scanned, 0);
        assert!(format!("{:#}", failure.error).contains("prepare"));
    }

    #[tokio::test]
    async fn test_local_target_run_succeeds() {
        let source = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        std::fs::write(source.path().join("a.txt"), b"hi").unwrap();
        let cli = cli_for(&[
            source.path().to_str().unwrap(),
            "zone",
            "--local-target",
            target.path().to_str().unwrap(),
        ]);

        let report = run(&cli, &AppConfig::default(), None).await.ok().unwrap();
        assert!(report.is_success());
        assert_eq!(report.metrics.new_files, 1);
        assert!(target.path().join("a.txt").exists());
    }
}
