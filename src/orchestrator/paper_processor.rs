//! 单篇论文处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块负责处理单篇 PDF 的完整流程，是论文级别的编排器。
//!
//! ## 核心功能
//!
//! 1. **文档抽取**：PDF → 标题、元数据、章节
//! 2. **并发抽取**：每种启用的组件一个任务，全部完成后汇合
//! 3. **置信度汇总**：组件置信度均值写入论文
//! 4. **关系链接**：首实例启发式
//! 5. **结果落盘**：按 slug 组织的 JSON 文件
//! 6. **上传**：可选，按依赖顺序发布到 CMS

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use futures::future::join_all;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::models::{ComponentKind, EntityGraph};
use crate::services::{link_relationships, ArtifactWriter, DocumentService, PublishSummary, Publisher};
use crate::workflow::{new_internal_id, ComponentFlow, PaperCtx};

/// 单篇论文的处理报告
#[derive(Debug, Clone)]
pub struct PaperReport {
    pub paper_id: String,
    pub title: String,
    /// 每种组件抽取到的数量
    pub counts: BTreeMap<ComponentKind, usize>,
    /// 抽取失败的组件
    pub failed_components: Vec<ComponentKind>,
    pub confidence: Option<f64>,
    pub artifact_path: PathBuf,
    pub publish: Option<PublishSummary>,
}

impl PaperReport {
    pub fn total_components(&self) -> usize {
        self.counts.values().sum()
    }
}

/// 单篇论文处理流水线
///
/// 在运行开始时创建一次，所有论文共享（通过 `Arc`）。
pub struct PaperPipeline {
    documents: DocumentService,
    flow: ComponentFlow,
    components: Vec<ComponentKind>,
    writer: ArtifactWriter,
    publisher: Option<Publisher>,
    slugs: BTreeMap<String, String>,
    confidence_default: f64,
}

impl PaperPipeline {
    /// 创建流水线
    ///
    /// # 参数
    /// - `documents`: 文档服务
    /// - `flow`: 组件抽取流程
    /// - `components`: 启用的组件类型
    /// - `writer`: 结果文件写入器
    /// - `publisher`: 上传服务，None 表示不上传
    /// - `slugs`: key → CMS slug（结果文件使用）
    /// - `confidence_default`: 组件缺少置信度时的默认值
    pub fn new(
        documents: DocumentService,
        flow: ComponentFlow,
        components: Vec<ComponentKind>,
        writer: ArtifactWriter,
        publisher: Option<Publisher>,
        slugs: BTreeMap<String, String>,
        confidence_default: f64,
    ) -> Self {
        Self {
            documents,
            flow,
            components,
            writer,
            publisher,
            slugs,
            confidence_default,
        }
    }

    pub fn writer(&self) -> &ArtifactWriter {
        &self.writer
    }

    pub fn uploads_enabled(&self) -> bool {
        self.publisher.is_some()
    }

    fn slug_for(&self, key: &str) -> String {
        self.slugs
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// 处理一篇论文
    ///
    /// # 返回
    /// PDF 无法读取或标题无法确定时返回错误；组件与上传失败只记入报告
    pub async fn process_paper(&self, pdf_path: &Path, ctx: &PaperCtx) -> AppResult<PaperReport> {
        log_paper_start(ctx, pdf_path);

        // ========== 文档抽取 ==========
        let document = self.documents.extract(pdf_path).await?;
        let mut paper = document.paper;
        paper.id = new_internal_id();
        paper.extraction_date = chrono::Local::now().to_rfc3339();
        info!(
            "{} 📖 标题（来源: {}）: {}",
            ctx, document.title_source, paper.title
        );

        // ========== 并发抽取所有组件 ==========
        info!("{} 🔍 开始抽取 {} 种组件", ctx, self.components.len());
        let paper_id = paper.id.clone();
        let title = paper.title.clone();
        let sections = &document.sections;
        let tasks = self.components.iter().map(|&kind| {
            let paper_id = paper_id.as_str();
            let title = title.as_str();
            async move { (kind, self.flow.run(kind, paper_id, title, sections, ctx).await) }
        });
        let outcomes = join_all(tasks).await;

        let mut graph = EntityGraph::new(paper);
        for (kind, outcome) in outcomes {
            graph.record(kind, outcome);
        }

        // ========== 汇总与链接 ==========
        let confidence = graph.apply_confidence(self.confidence_default);
        let linked = link_relationships(&mut graph);
        info!(
            "{} 🔗 共 {} 个组件，建立 {} 条关系，置信度 {}",
            ctx,
            graph.total_components(),
            linked,
            confidence.map_or_else(|| "未设置".to_string(), |c| format!("{:.4}", c))
        );

        // ========== 落盘 ==========
        let artifact_path = self
            .writer
            .write(pdf_path, &graph, |key| self.slug_for(key))
            .await?;

        // ========== 上传 ==========
        let publish = match &self.publisher {
            Some(publisher) => {
                let summary = publisher.publish(&graph).await;
                if !summary.is_complete() {
                    warn!(
                        "{} ⚠️ 上传不完整: 失败 {}/{}",
                        ctx, summary.failed, summary.total
                    );
                }
                Some(summary)
            }
            None => None,
        };

        let report = PaperReport {
            paper_id: graph.paper.id.clone(),
            title: graph.paper.title.clone(),
            counts: graph.counts(),
            failed_components: graph.failed_kinds().to_vec(),
            confidence,
            artifact_path,
            publish,
        };
        log_paper_complete(ctx, &report);
        Ok(report)
    }
}

// ========== 日志辅助函数 ==========

fn log_paper_start(ctx: &PaperCtx, pdf_path: &Path) {
    info!("\n{}", "─".repeat(60));
    info!("{} 🚀 开始处理: {}", ctx, pdf_path.display());
}

fn log_paper_complete(ctx: &PaperCtx, report: &PaperReport) {
    info!(
        "{} ✅ 处理完成: {} 个组件，失败组件 {}",
        ctx,
        report.total_components(),
        report.failed_components.len()
    );
    if !report.failed_components.is_empty() {
        let failed: Vec<&str> = report.failed_components.iter().map(|k| k.key()).collect();
        warn!("{} 抽取失败的组件: {}", ctx, failed.join(", "));
    }
    info!("{}", "─".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DocumentConfig, ExtractionConfig, LlmConfig};
    use crate::services::document_service::{ConvertedDocument, DocumentConverter, EmbeddedInfo};
    use crate::services::{LlmService, MetadataService, PromptBook, PromptComposer};
    use crate::test_support::ScriptedBackend;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct MarkdownConverter;

    #[async_trait]
    impl DocumentConverter for MarkdownConverter {
        fn name(&self) -> &'static str {
            "markdown"
        }

        async fn convert(&self, _path: &Path) -> AppResult<ConvertedDocument> {
            let markdown = "# Deep Soil Moisture\n\n## Abstract\nWe study soil moisture sensing with low cost probes across many farms in the region.\n\n## Methods\nWe used capacitive probes and a field survey design.\n";
            Ok(ConvertedDocument {
                page_one_structured: Some("# Deep Soil Moisture".to_string()),
                structured: Some(markdown.to_string()),
                plain_text: markdown.to_string(),
                info: EmbeddedInfo::default(),
            })
        }
    }

    #[tokio::test]
    async fn test_process_paper_without_upload() {
        let out = tempfile::tempdir().unwrap();
        // join_all 按顺序轮询，脚本响应依次对应各组件
        let backend = ScriptedBackend::new(vec![
            Ok("[{\"problemStatement\": \"dry soil\", \"extractionConfidence\": 0.6}]".to_string()),
            Ok("[{\"limitationDescription\": \"one region\", \"extractionConfidence\": 1.0}]".to_string()),
        ]);
        let llm = Arc::new(LlmService::new(
            backend,
            &LlmConfig {
                retry_attempts: 1,
                backoff_base_ms: 0,
                ..LlmConfig::default()
            },
        ));
        let documents = DocumentService::new(
            Arc::new(MarkdownConverter),
            llm.clone(),
            MetadataService::new(None, 1000),
            DocumentConfig {
                infer_sections: false,
                ..DocumentConfig::default()
            },
        );
        let composer = PromptComposer::new(PromptBook::default(), &ExtractionConfig::default());
        let pipeline = PaperPipeline::new(
            documents,
            ComponentFlow::new(llm, Arc::new(composer), 0.7),
            vec![ComponentKind::ResearchProblem, ComponentKind::Limitation],
            ArtifactWriter::new(out.path(), "/pdfs"),
            None,
            crate::config::default_api_slugs(),
            0.7,
        );

        let pdf = Path::new("/pdfs/deep.pdf");
        let report = pipeline
            .process_paper(pdf, &PaperCtx::new(1, 1, pdf))
            .await
            .unwrap();

        assert_eq!(report.title, "Deep Soil Moisture");
        assert_eq!(report.paper_id.len(), 32);
        assert_eq!(report.total_components(), 2);
        assert!(report.failed_components.is_empty());
        assert_eq!(report.confidence, Some(0.8));
        assert!(report.publish.is_none());
        assert!(report.artifact_path.is_file());
        assert!(!pipeline.uploads_enabled());
    }
}
