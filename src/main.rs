use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use skeo_extractor::cli::Cli;
use skeo_extractor::config::Config;
use skeo_extractor::orchestrator::App;
use skeo_extractor::utils::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // .env 只在启动时读取一次
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("❌ 运行失败: {:#}", e);
            eprintln!("运行失败: {:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<bool> {
    // 加载配置
    let mut config = Config::load(cli.params_file.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    // 初始化日志
    logging::init(&config.log_file, config.verbose_logging)?;

    // 初始化并运行应用
    let summary = App::initialize(config).await?.run().await?;
    Ok(summary.is_success())
}
