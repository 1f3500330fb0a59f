use clap::{Parser, Subcommand};
use objsync_lib::config::{self, SyncSettings};
use objsync_lib::core::{SyncConfig, SyncEngine, SyncReport};
use objsync_lib::logging::{self, LogConfig};
use objsync_lib::storage::S3Store;
use objsync_lib::RemoteLocation;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;

/// 本地目录与 S3 兼容对象存储之间的单向同步工具
#[derive(Parser, Debug)]
#[command(name = "objsync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// S3 区域
    #[arg(long, global = true, env = "AWS_REGION", default_value = "us-east-1")]
    region: String,

    /// 访问密钥；不提供时使用标准凭证链
    #[arg(long, global = true, env = "AWS_ACCESS_KEY_ID")]
    access_key: Option<String>,

    /// 私有密钥；不提供时使用标准凭证链
    #[arg(long, global = true, env = "AWS_SECRET_ACCESS_KEY")]
    secret_key: Option<String>,

    /// 自定义服务端点（MinIO 等 S3 兼容服务）
    #[arg(long, global = true, env = "AWS_ENDPOINT_URL")]
    endpoint: Option<String>,

    /// 追加排除规则（可多次指定）
    #[arg(long, global = true)]
    exclude: Vec<String>,

    /// 只报告将要执行的动作，不实际传输
    #[arg(long, global = true)]
    dry_run: bool,

    /// 以 JSON 输出同步报告
    #[arg(long, global = true)]
    json: bool,

    /// 日志级别（error/warn/info/debug/trace）
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 上传本地目录到对象存储
    Upload {
        /// 本地目录
        local_path: PathBuf,
        /// 目标位置，形如 s3://bucket/prefix
        location: String,
    },

    /// 从对象存储下载到本地目录
    Download {
        /// 源位置，形如 s3://bucket/prefix
        location: String,
        /// 本地目录
        local_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = config::config_dir();
    let mut log_config = LogConfig::load(&config_dir);
    if let Some(ref level) = cli.log_level {
        log_config.level = level.clone();
    }
    logging::init_logging(&log_config, &config_dir);

    match run(cli).await {
        Ok(report) if report.files_failed > 0 => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<SyncReport> {
    let settings = SyncSettings::load(&config::config_dir());

    let mut sync_config = SyncConfig {
        chunk_size: settings.chunk_size_bytes(),
        dry_run: cli.dry_run,
        ..Default::default()
    };
    sync_config
        .scan_config
        .exclude_patterns
        .extend(settings.exclude_patterns.iter().cloned());
    sync_config
        .scan_config
        .exclude_patterns
        .extend(cli.exclude.iter().cloned());

    let build_engine = |bucket: &str| -> anyhow::Result<SyncEngine> {
        let store = S3Store::new(
            bucket,
            &cli.region,
            cli.access_key.as_deref(),
            cli.secret_key.as_deref(),
            cli.endpoint.clone(),
        )?;
        Ok(SyncEngine::with_config(Arc::new(store), sync_config.clone()))
    };

    let report = match &cli.command {
        Commands::Upload {
            local_path,
            location,
        } => {
            let location = RemoteLocation::parse(location)?;
            let engine = build_engine(&location.bucket)?;
            engine.upload(local_path, &location, None).await?
        }
        Commands::Download {
            location,
            local_path,
        } => {
            let location = RemoteLocation::parse(location)?;
            let engine = build_engine(&location.bucket)?;
            engine.download(&location, local_path, None).await?
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "传输 {} 个文件，跳过 {}，失败 {}（{} 字节）",
            report.files_transferred,
            report.files_skipped,
            report.files_failed,
            report.bytes_transferred
        );
        if report.files_pending > 0 {
            println!("dry-run: {} 个文件待传输", report.files_pending);
        }
    }

    Ok(report)
}
