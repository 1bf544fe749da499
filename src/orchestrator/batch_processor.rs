//! 批量论文处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量 PDF 的处理和资源管理。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：创建各客户端与服务，执行 CMS 预检
//! 2. **批量发现**：递归扫描 PDF（扩展名不区分大小写，按路径排序）
//! 3. **跳过已处理**：结果文件已存在时跳过
//! 4. **并发控制**：使用 Semaphore 限制同时处理的论文数
//! 5. **快速失败**：开启后任一论文失败即中止其余任务
//! 6. **全局统计**：汇总所有论文的处理结果

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use walkdir::WalkDir;

use crate::clients::{CmsClient, LlmClient, ScholarClient};
use crate::config::{Config, PAPER_KEY};
use crate::error::{AppResult, FileError};
use crate::orchestrator::paper_processor::{PaperPipeline, PaperReport};
use crate::services::{
    converter_for, ArtifactWriter, DocumentService, LlmService, MetadataService, PromptBook,
    PromptComposer, Publisher,
};
use crate::utils::logging::{log_papers_found, log_startup, print_final_stats};
use crate::workflow::{ComponentFlow, PaperCtx};

const PRECHECK_ATTEMPTS: u32 = 3;
const PRECHECK_DELAY: Duration = Duration::from_secs(1);

/// 运行统计
#[derive(Debug, Default)]
pub struct RunSummary {
    pub found: usize,
    pub skipped: usize,
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 快速失败模式下是否中止了运行
    pub aborted: bool,
    pub reports: Vec<PaperReport>,
}

impl RunSummary {
    /// 所有计划处理的论文均成功
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.aborted
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: Arc<PaperPipeline>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        let components = config.enabled_components();
        log_startup(config.processing.max_workers, components.len());

        // LLM
        let backend = Arc::new(LlmClient::new(&config));
        info!("🤖 LLM 模型: {}", backend.model_name());
        let llm = Arc::new(LlmService::new(backend, &config.llm));

        // 提示词
        let book = PromptBook::load(&config.prompt_file)?;
        for kind in book.missing(&components) {
            warn!("⚠️ 组件 {} 没有提示词模板，将使用通用模板", kind.key());
        }
        let composer = Arc::new(PromptComposer::new(book, &config.extraction));

        // 文档与元数据
        let converter = converter_for(&config.document)?;
        let search = ScholarClient::new(&config.metadata)?
            .map(|client| Arc::new(client) as Arc<dyn crate::clients::MetadataSearch>);
        let metadata = MetadataService::new(search, config.document.abstract_prefill_limit);
        let documents =
            DocumentService::new(converter, llm.clone(), metadata, config.document.clone());

        // 上传
        let publisher = prepare_publisher(&config).await?;

        let pipeline = PaperPipeline::new(
            documents,
            ComponentFlow::new(llm, composer, config.extraction.confidence_default),
            components,
            ArtifactWriter::new(&config.output_dir, &config.pdf_dir),
            publisher,
            config.cms.api_slugs.clone(),
            config.extraction.confidence_default,
        );

        Ok(Self::with_pipeline(config, Arc::new(pipeline)))
    }

    /// 使用已组装好的流水线创建应用
    pub fn with_pipeline(config: Config, pipeline: Arc<PaperPipeline>) -> Self {
        Self { config, pipeline }
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<RunSummary> {
        info!("\n📁 正在扫描 PDF: {}", self.config.pdf_dir.display());
        let all_pdfs = discover_pdfs(&self.config.pdf_dir)?;

        let (pending, skipped): (Vec<PathBuf>, Vec<PathBuf>) =
            if self.config.processing.skip_existing {
                all_pdfs
                    .iter()
                    .cloned()
                    .partition(|path| !self.pipeline.writer().exists(path))
            } else {
                (all_pdfs.clone(), Vec::new())
            };

        let mut summary = RunSummary {
            found: all_pdfs.len(),
            skipped: skipped.len(),
            ..Default::default()
        };
        log_papers_found(summary.found, summary.skipped);
        if !self.pipeline.uploads_enabled() {
            info!("📤 本次运行只写本地结果文件");
        }

        if pending.is_empty() {
            warn!("⚠️ 没有待处理的 PDF，程序结束");
            return Ok(summary);
        }

        self.process_all_papers(pending, &mut summary).await?;

        print_final_stats(
            summary.found,
            summary.skipped,
            summary.succeeded,
            summary.failed,
            &self.config.log_file,
        );
        Ok(summary)
    }

    /// 并发处理所有论文
    async fn process_all_papers(&self, pending: Vec<PathBuf>, summary: &mut RunSummary) -> Result<()> {
        let fail_fast = self.config.processing.fail_fast;
        let semaphore = Arc::new(Semaphore::new(self.config.processing.max_workers));
        let failure_seen = Arc::new(AtomicBool::new(false));
        let total = pending.len();
        let mut tasks = JoinSet::new();

        for (idx, pdf_path) in pending.into_iter().enumerate() {
            let permit = semaphore.clone().acquire_owned().await?;
            if fail_fast && failure_seen.load(Ordering::SeqCst) {
                warn!("⛔ 快速失败：已有论文失败，停止派发新任务");
                break;
            }

            let ctx = PaperCtx::new(idx + 1, total, &pdf_path);
            let pipeline = self.pipeline.clone();
            let failure_seen = failure_seen.clone();
            summary.attempted += 1;

            tasks.spawn(async move {
                let _permit = permit;
                match pipeline.process_paper(&pdf_path, &ctx).await {
                    Ok(report) => Some(report),
                    Err(e) => {
                        error!("{} ❌ 处理失败: {}", ctx, e);
                        failure_seen.store(true, Ordering::SeqCst);
                        None
                    }
                }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(report)) => {
                    summary.succeeded += 1;
                    summary.reports.push(report);
                }
                Ok(None) => {
                    summary.failed += 1;
                    if fail_fast && !summary.aborted {
                        warn!("⛔ 快速失败：中止其余任务");
                        summary.aborted = true;
                        tasks.abort_all();
                    }
                }
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    error!("任务执行失败: {}", e);
                    summary.failed += 1;
                }
            }
        }

        if fail_fast && failure_seen.load(Ordering::SeqCst) {
            summary.aborted = true;
        }
        Ok(())
    }
}

/// 创建上传服务并执行预检
///
/// 未启用上传或缺少令牌时返回 None；预检失败时在快速失败模式下返回错误。
async fn prepare_publisher(config: &Config) -> Result<Option<Publisher>> {
    if !config.cms.direct_upload {
        info!("📤 未启用直接上传，仅保存本地结果");
        return Ok(None);
    }

    let client = match CmsClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("❌ 上传已禁用: {}", e);
            return Ok(None);
        }
    };

    if config.cms.test_endpoints {
        info!("🔌 检查 CMS 连接: {}", config.cms_api_base());
        let mut healthy = client
            .test_connection(PRECHECK_ATTEMPTS, PRECHECK_DELAY)
            .await;
        if healthy {
            let mut keys = vec![PAPER_KEY];
            keys.extend(config.enabled_components().iter().map(|k| k.key()));
            for key in keys {
                let slug = config.slug_for(key).unwrap_or(key);
                if !client.test_endpoint(slug).await {
                    healthy = false;
                }
            }
        }

        if !healthy {
            if config.processing.fail_fast {
                bail!("CMS 预检失败");
            }
            error!("❌ CMS 预检失败，上传已禁用");
            return Ok(None);
        }
        info!("✓ CMS 预检通过");
    }

    Ok(Some(Publisher::new(Arc::new(client), &config.cms)))
}

/// 递归查找目录下的 PDF 文件，按路径排序
///
/// 不跟随符号链接；无法读取的条目记录警告后跳过。
pub fn discover_pdfs(dir: &Path) -> AppResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(FileError::DirectoryNotFound {
            path: dir.to_path_buf(),
        }
        .into());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("⚠️ 跳过无法读取的路径: {}", e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_pdf(entry.path()) {
            found.push(entry.into_path());
        }
    }

    found.sort();
    Ok(found)
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_discover_pdfs_recursive_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("b").join("c");
        fs::create_dir_all(&nested).unwrap();
        fs::write(dir.path().join("z.pdf"), b"").unwrap();
        fs::write(dir.path().join("a.PDF"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::write(nested.join("m.pdf"), b"").unwrap();

        let found = discover_pdfs(dir.path()).unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join("a.PDF"),
                nested.join("m.pdf"),
                dir.path().join("z.pdf"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_discover_does_not_follow_symlink_cycles() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.pdf"), b"").unwrap();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("loop")).unwrap();

        let found = discover_pdfs(dir.path()).unwrap();
        assert_eq!(found, vec![dir.path().join("a.pdf")]);
    }

    #[test]
    fn test_discover_missing_dir() {
        let err = discover_pdfs(Path::new("/nonexistent/pdfs")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/pdfs"));
    }

    fn unreachable_cms_config(fail_fast: bool) -> Config {
        let mut config = Config::default();
        config.cms.url = "http://127.0.0.1:9".to_string();
        config.cms.token = "token".to_string();
        config.cms.direct_upload = true;
        config.cms.test_endpoints = true;
        config.cms.timeout_seconds = 2;
        config.processing.fail_fast = fail_fast;
        config
    }

    #[tokio::test]
    async fn test_failed_precheck_aborts_under_fail_fast() {
        let err = prepare_publisher(&unreachable_cms_config(true))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("预检失败"));
    }

    #[tokio::test]
    async fn test_failed_precheck_disables_upload_by_default() {
        let publisher = prepare_publisher(&unreachable_cms_config(false))
            .await
            .unwrap();
        assert!(publisher.is_none());
    }

    #[tokio::test]
    async fn test_upload_disabled_without_token() {
        let mut config = unreachable_cms_config(true);
        config.cms.token.clear();
        assert!(prepare_publisher(&config).await.unwrap().is_none());
    }

    #[test]
    fn test_run_summary_success() {
        let mut summary = RunSummary::default();
        assert!(summary.is_success());
        summary.failed = 1;
        assert!(!summary.is_success());
    }
}
