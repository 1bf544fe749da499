/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// 初始化日志
///
/// 同时输出到终端和日志文件，`RUST_LOG` 优先于默认级别。
///
/// # 参数
/// - `log_file_path`: 日志文件路径
/// - `verbose`: 是否输出 debug 日志
pub fn init(log_file_path: &Path, verbose: bool) -> Result<()> {
    init_log_file(log_file_path)?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("skeo_extractor={0},skeo={0},warn", default_level))
    });

    let log_file = OpenOptions::new().append(true).open(log_file_path)?;

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .try_init()?;
    Ok(())
}

/// 初始化日志文件（写入带时间戳的文件头）
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &Path) -> Result<()> {
    if let Some(parent) = log_file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let log_header = format!(
        "{}\n论文知识抽取日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_workers`: 最大并发数
/// - `components`: 启用的组件数量
pub fn log_startup(max_workers: usize, components: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 论文知识组件抽取");
    info!("📊 最大并发数: {}", max_workers);
    info!("🧩 启用组件: {} 种", components);
    info!("{}", "=".repeat(60));
}

/// 记录待处理论文的发现结果
///
/// # 参数
/// - `found`: 找到的 PDF 数量
/// - `skipped`: 因已有结果而跳过的数量
pub fn log_papers_found(found: usize, skipped: usize) {
    info!("✓ 找到 {} 个 PDF 文件", found);
    if skipped > 0 {
        info!("⏭️ 已有结果，跳过 {} 个", skipped);
    }
    info!("📋 待处理: {} 个\n", found.saturating_sub(skipped));
}

/// 打印最终统计信息
///
/// # 参数
/// - `found`: 找到的数量
/// - `skipped`: 跳过的数量
/// - `succeeded`: 成功数量
/// - `failed`: 失败数量
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(
    found: usize,
    skipped: usize,
    succeeded: usize,
    failed: usize,
    log_file_path: &Path,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("📄 找到: {}", found);
    info!("⏭️ 跳过: {}", skipped);
    info!("✅ 成功: {}/{}", succeeded, succeeded + failed);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path.display());
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("论文标题很长", 2), "论文...");
        assert_eq!(truncate_text("short", 10), "short");
    }

    #[test]
    fn test_init_log_file_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("run.log");
        init_log_file(&path).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("论文知识抽取日志"));
    }
}
