// apps/mm_cli/src/main.rs

//! MultiMat Flow 命令行界面
//!
//! 多介质可压缩/不可压缩流动求解器的命令行工具。
//!
//! 退出码约定：正常退出 0；任何致命错误（配置、拓扑、IO）退出 -1；
//! 告警打印到日志但不改变退出码。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MultiMat Flow 求解器命令行工具
#[derive(Parser)]
#[command(name = "mm_cli")]
#[command(author = "MultiMat Flow Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MultiMat multi-material flow solver", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 运行模拟
    Run(commands::run::RunArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
    /// 显示配置信息
    Info(commands::info::InfoArgs),
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        eprintln!("Warning: 日志初始化失败");
    }

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
        Commands::Info(args) => commands::info::execute(args),
    };

    if let Err(err) = result {
        eprintln!("错误: {:#}", err);
        std::process::exit(-1);
    }
}
