use std::{
    fs,
    io::{self, Read},
    path::PathBuf,
};

use anyhow::{Context, Result};
use chrono::Utc;
use ical2org_core::{Error, OrgOptions, org::convert, timezone::LocalZone};

/// 转换命令参数
pub struct ConvertParams {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub zone: LocalZone,
}

/// 转换命令
///
/// 整个文档在内存中生成完毕后才打开输出，失败时不会创建输出文件。
pub fn convert_command(params: ConvertParams) -> Result<()> {
    tracing::info!(
        "开始转换: 输入={}, 输出={}, 时区={}",
        display_path(params.input.as_ref(), "<stdin>"),
        display_path(params.output.as_ref(), "<stdout>"),
        params.zone
    );

    let input: Box<dyn Read> = match params.input {
        Some(ref path) => Box::new(
            fs::File::open(path)
                .map_err(Error::UnreadableInput)
                .with_context(|| format!("无法打开输入文件 {}", path.display()))?,
        ),
        None => Box::new(io::stdin().lock()),
    };

    let mut org_content = Vec::new();
    convert(
        input,
        &mut org_content,
        OrgOptions { zone: params.zone },
        Utc::now(),
    )?;

    match params.output {
        Some(ref path) => {
            fs::write(path, &org_content)
                .map_err(Error::UnwritableOutput)
                .with_context(|| format!("无法写入输出文件 {}", path.display()))?;
            tracing::info!("✓ org文件已保存到: {}", path.display());
        }
        None => {
            use std::io::Write;

            let mut stdout = io::stdout().lock();
            stdout
                .write_all(&org_content)
                .and_then(|()| stdout.flush())
                .map_err(Error::UnwritableOutput)?;
        }
    }

    Ok(())
}

fn display_path(path: Option<&PathBuf>, fallback: &str) -> String {
    path.map_or_else(|| fallback.to_string(), |path| path.display().to_string())
}
