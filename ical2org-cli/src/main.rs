mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use ical2org_core::timezone::LocalZone;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ical2org")]
#[command(about = "Converts icalendar .ics files to org-agenda format")]
#[command(version)]
struct Cli {
    /// 输入的ICS文件，缺省读取标准输入
    #[arg(long)]
    input: Option<PathBuf>,

    /// 输出的org文件，缺省写到标准输出
    #[arg(long)]
    output: Option<PathBuf>,

    /// 查看者时区 (IANA 名称或 local)
    #[arg(long, default_value = "local")]
    timezone: LocalZone,

    /// 启用详细日志
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志级别
    let log_level = if cli.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("ical2org_cli={log_level},ical2org_core={log_level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    commands::convert_command(commands::ConvertParams {
        input: cli.input,
        output: cli.output,
        zone: cli.timezone,
    })
}
