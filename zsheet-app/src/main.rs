use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use zsheet_config::{AppConfig, ConfigError};
use zsheet_engine::extract::SelectionMode;
use zsheet_frontend::CliOptions;

/// 按图框批量生成打印布局
#[derive(Parser, Debug)]
#[command(name = "zsheet")]
#[command(version, about, long_about = None)]
struct Args {
    /// 配置文件路径，缺省时读取 `ZSHEET_CONFIG` 或 `./config/default.toml`
    #[arg(long)]
    config: Option<PathBuf>,

    /// JSON 场景文件，缺省时读取 `ZSHEET_DOCUMENT` 或使用内置示例
    #[arg(long)]
    document: Option<PathBuf>,

    /// 区域来源
    #[arg(long, value_enum, default_value_t = ModeArg::Array)]
    mode: ModeArg,

    /// 按网格顺序重新编号（仅阵列模式）
    #[arg(long)]
    renumber: bool,

    /// 把生成布局后的文档写入 JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Array,
    Polylines,
}

impl From<ModeArg> for SelectionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Array => SelectionMode::Array,
            ModeArg::Polylines => SelectionMode::Polyline,
        }
    }
}

fn main() {
    let args = Args::parse();

    let config = load_configuration(args.config);
    init_logging(&config);
    info!("启动 ZSheet 分页出图");

    let options = CliOptions {
        document: args.document,
        mode: args.mode.into(),
        renumber: args.renumber,
        output: args.output,
    };
    if let Err(err) = zsheet_frontend::run_cli(&options, &config.sheets) {
        error!(error = %err, "分页出图失败");
        eprintln!("{err}");
        std::process::exit(1);
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
