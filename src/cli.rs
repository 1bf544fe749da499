//! 命令行参数
//!
//! 优先级：命令行 > 环境变量 > 参数文件 > 默认值

use std::path::PathBuf;

use clap::Parser;

use crate::config::Config;

#[derive(Debug, Parser)]
#[command(name = "skeo")]
#[command(about = "从科研论文 PDF 中抽取知识组件并发布到 CMS")]
#[command(version)]
pub struct Cli {
    /// PDF 所在目录（递归扫描）
    #[arg(long, env = "PDF_DIR")]
    pub pdf_dir: PathBuf,

    /// 提示词文件
    #[arg(long, default_value = "prompts/skeo_prompts.toml")]
    pub prompt_file: PathBuf,

    /// 结果输出目录
    #[arg(long, default_value = "skeo_output")]
    pub output_dir: PathBuf,

    /// TOML 参数文件
    #[arg(long)]
    pub params_file: Option<PathBuf>,

    /// CMS 地址
    #[arg(long)]
    pub cms_url: Option<String>,

    /// CMS 令牌
    #[arg(long)]
    pub cms_token: Option<String>,

    /// 抽取后直接上传
    #[arg(long, overrides_with = "no_direct_upload")]
    pub direct_upload: bool,

    #[arg(long, overrides_with = "direct_upload")]
    pub no_direct_upload: bool,

    /// 跳过已有结果文件的 PDF
    #[arg(long, overrides_with = "no_skip_existing")]
    pub skip_existing: bool,

    #[arg(long, overrides_with = "skip_existing")]
    pub no_skip_existing: bool,

    /// 任一论文失败即中止
    #[arg(long)]
    pub fail_fast: bool,

    /// 同时处理的论文数
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 把命令行参数写入配置
    pub fn apply(&self, config: &mut Config) {
        config.pdf_dir = self.pdf_dir.clone();
        config.prompt_file = self.prompt_file.clone();
        config.output_dir = self.output_dir.clone();

        if let Some(url) = &self.cms_url {
            config.cms.url = url.clone();
        }
        if let Some(token) = &self.cms_token {
            config.cms.token = token.clone();
        }
        if self.direct_upload {
            config.cms.direct_upload = true;
        }
        if self.no_direct_upload {
            config.cms.direct_upload = false;
        }
        if self.skip_existing {
            config.processing.skip_existing = true;
        }
        if self.no_skip_existing {
            config.processing.skip_existing = false;
        }
        if self.fail_fast {
            config.processing.fail_fast = true;
        }
        if let Some(workers) = self.max_workers {
            config.processing.max_workers = workers;
        }
        if self.verbose {
            config.verbose_logging = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "skeo_extractor",
            "--pdf-dir",
            "papers",
            "--direct-upload",
            "--no-skip-existing",
            "--max-workers",
            "2",
            "--cms-token",
            "secret",
        ]);
        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.pdf_dir, PathBuf::from("papers"));
        assert_eq!(config.output_dir, PathBuf::from("skeo_output"));
        assert!(config.cms.direct_upload);
        assert!(!config.processing.skip_existing);
        assert_eq!(config.processing.max_workers, 2);
        assert_eq!(config.cms.token, "secret");
        assert!(!config.processing.fail_fast);
    }

    #[test]
    fn test_negated_flag_wins_when_last() {
        let cli = Cli::parse_from([
            "skeo_extractor",
            "--pdf-dir",
            "papers",
            "--direct-upload",
            "--no-direct-upload",
        ]);
        let mut config = Config::default();
        config.cms.direct_upload = true;
        cli.apply(&mut config);
        assert!(!config.cms.direct_upload);
    }
}
