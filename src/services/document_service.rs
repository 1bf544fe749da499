//! 文档服务 - 业务能力层
//!
//! 职责：
//! - PDF 转换（本地 lopdf 或远程文档转换服务）
//! - 标题解析（见 [`title_resolver`](crate::services::title_resolver)）
//! - 章节切分与 LLM 补全
//! - 元数据检索与正文修补
//!
//! 转换是 CPU 密集操作，本地后端在 `spawn_blocking` 中执行。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lopdf::{Dictionary, Document, Object};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::clients::DoclingClient;
use crate::config::{DocumentConfig, ValidationMode};
use crate::error::{AppError, AppResult, DocumentError};
use crate::models::{Paper, RecordSchema, SectionInference, SectionMap, SectionName};
use crate::services::llm_service::LlmService;
use crate::services::metadata_service::MetadataService;
use crate::services::title_resolver::{self, TitleSource};
use crate::utils::text::{find_doi, find_year, head_and_tail, take_chars};

/// 需要 LLM 补全的章节长度阈值
const THIN_SECTION_CHARS: usize = 100;
/// 补全时发送给 LLM 的最大字符数
const INFERENCE_TEXT_LIMIT: usize = 25_000;
/// 补全内容至少要比原内容长这么多才替换
const INFERENCE_MIN_GAIN: usize = 50;
/// 元数据修补只看开头这么多字符
const REFINE_WINDOW: usize = 5_000;
/// 首页结构化文本的最大长度
const PAGE_ONE_LIMIT: usize = 4_000;

/// PDF 内嵌的 Info 字典
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedInfo {
    pub title: Option<String>,
    pub author: Option<String>,
    pub keywords: Option<String>,
}

/// 转换后的文档
#[derive(Debug, Clone, Default)]
pub struct ConvertedDocument {
    /// 首页的结构化文本（Markdown）
    pub page_one_structured: Option<String>,
    /// 全文的结构化文本（Markdown）
    pub structured: Option<String>,
    /// 纯文本
    pub plain_text: String,
    pub info: EmbeddedInfo,
}

/// PDF 转换能力
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &'static str;

    async fn convert(&self, pdf_path: &Path) -> AppResult<ConvertedDocument>;
}

// ========== lopdf 后端 ==========

/// 本地 lopdf 转换：只有纯文本，没有结构化文本
pub struct LopdfConverter;

#[async_trait]
impl DocumentConverter for LopdfConverter {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    async fn convert(&self, pdf_path: &Path) -> AppResult<ConvertedDocument> {
        let path = pdf_path.to_path_buf();
        tokio::task::spawn_blocking(move || load_with_lopdf(&path))
            .await
            .map_err(|e| AppError::unreadable_pdf(pdf_path, e))?
    }
}

fn load_with_lopdf(path: &Path) -> AppResult<ConvertedDocument> {
    let doc = Document::load(path).map_err(|e| AppError::unreadable_pdf(path, e))?;

    let mut plain_text = String::new();
    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(text) => {
                plain_text.push_str(&text);
                plain_text.push('\n');
            }
            Err(e) => {
                warn!("第 {} 页文本提取失败: {}", page_number, e);
            }
        }
    }

    Ok(ConvertedDocument {
        page_one_structured: None,
        structured: None,
        plain_text,
        info: embedded_info(&doc),
    })
}

/// 读取 trailer 中的 Info 字典
fn embedded_info(doc: &Document) -> EmbeddedInfo {
    let dict = match doc.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => doc.get_dictionary(*id).ok(),
        Ok(Object::Dictionary(dict)) => Some(dict),
        _ => None,
    };
    let Some(dict) = dict else {
        return EmbeddedInfo::default();
    };
    EmbeddedInfo {
        title: info_string(dict, b"Title"),
        author: info_string(dict, b"Author"),
        keywords: info_string(dict, b"Keywords"),
    }
}

fn info_string(dict: &Dictionary, key: &[u8]) -> Option<String> {
    let bytes = dict.get(key).ok()?.as_str().ok()?;
    let text = decode_pdf_string(bytes);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// 解码 PDF 字符串：带 BOM 的 UTF-16BE，否则按单字节编码
pub fn decode_pdf_string(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

// ========== 文档转换服务后端 ==========

/// 远程文档转换服务
pub struct DoclingConverter {
    client: DoclingClient,
}

impl DoclingConverter {
    pub fn new(config: &DocumentConfig) -> AppResult<Self> {
        Ok(Self {
            client: DoclingClient::new(&config.docling_url, config.docling_timeout_seconds)?,
        })
    }
}

#[async_trait]
impl DocumentConverter for DoclingConverter {
    fn name(&self) -> &'static str {
        "docling"
    }

    async fn convert(&self, pdf_path: &Path) -> AppResult<ConvertedDocument> {
        let parsed = self
            .client
            .parse_pdf(pdf_path)
            .await
            .map_err(|e| DocumentError::ConversionFailed {
                backend: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let markdown = parsed.to_markdown();
        let page_one = page_one_prefix(&markdown);

        // 内嵌信息仍从本地文件读取，读不到时退回服务返回的标题
        let path = pdf_path.to_path_buf();
        let mut info = match tokio::task::spawn_blocking(move || local_embedded_info(&path)).await
        {
            Ok(info) => info,
            Err(e) => {
                warn!("读取内嵌信息的任务失败 {}: {}", pdf_path.display(), e);
                EmbeddedInfo::default()
            }
        };
        if info.title.is_none() {
            info.title = parsed.title.clone().filter(|t| !t.trim().is_empty());
        }

        let plain_text = if parsed.full_text.trim().is_empty() {
            markdown.clone()
        } else {
            parsed.full_text
        };

        Ok(ConvertedDocument {
            page_one_structured: page_one,
            structured: Some(markdown),
            plain_text,
            info,
        })
    }
}

fn local_embedded_info(path: &Path) -> EmbeddedInfo {
    match Document::load(path) {
        Ok(doc) => embedded_info(&doc),
        Err(e) => {
            warn!("无法读取内嵌信息 {}: {}", path.display(), e);
            EmbeddedInfo::default()
        }
    }
}

/// 第一个标准章节标题之前的部分（视为首页）
pub fn page_one_prefix(markdown: &str) -> Option<String> {
    let patterns = section_patterns();
    let mut prefix = String::new();
    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with('#') && patterns.iter().any(|(re, _)| re.is_match(trimmed)) {
            break;
        }
        prefix.push_str(line);
        prefix.push('\n');
    }
    let prefix = take_chars(prefix.trim(), PAGE_ONE_LIMIT);
    if prefix.is_empty() {
        None
    } else {
        Some(prefix.to_string())
    }
}

// ========== 章节切分 ==========

/// 章节标题正则及其对应的标准章节
fn section_patterns() -> Vec<(Regex, SectionName)> {
    const NUM: &str = r"(?:\d{1,2}(?:\.\d{1,2})*\.?\s*)?";
    let raw = [
        (r"^#+\s*(?:abstract|summary)\s*$".to_string(), SectionName::Abstract),
        (
            format!(r"^#+\s*{}(?:introduction|background)\s*$", NUM),
            SectionName::Introduction,
        ),
        // 相关工作归入方法部分
        (
            format!(r"^#+\s*{}(?:related\s+work|literature\s+review)\s*$", NUM),
            SectionName::Methodology,
        ),
        (
            format!(
                r"^#+\s*{}(?:method(?:s|ology)?|materials\s+(?:and\s+)?methods|experimental(?:\s+design|\s+setup)?|proposed\s+method|approach|study\s+design)\s*$",
                NUM
            ),
            SectionName::Methodology,
        ),
        (
            format!(
                r"^#+\s*{}(?:results|findings|evaluation|experiments(?:\s+and\s+results)?)\s*$",
                NUM
            ),
            SectionName::Results,
        ),
        (
            format!(r"^#+\s*{}(?:discussion)\s*$", NUM),
            SectionName::Discussion,
        ),
        (
            format!(
                r"^#+\s*{}(?:conclusions?|summary(?:\s+and\s+future\s+work)?)\s*$",
                NUM
            ),
            SectionName::Conclusion,
        ),
        (
            r"^#+\s*(?:references|bibliography|literature\s+cited)\s*$".to_string(),
            SectionName::References,
        ),
        // 致谢归入结论，附录归入参考文献
        (
            r"^#+\s*(?:acknowledge?ments?)\s*$".to_string(),
            SectionName::Conclusion,
        ),
        (
            r"^#+\s*(?:appendix|appendices|supplementary\s+(?:material|information))\s*$"
                .to_string(),
            SectionName::References,
        ),
    ];

    raw.into_iter()
        .filter_map(|(pattern, name)| {
            RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .build()
                .ok()
                .map(|re| (re, name))
        })
        .collect()
}

/// 按 Markdown 标题切分章节
///
/// 同一标准章节多次出现时内容追加；第一个标准标题之前的内容丢弃。
pub fn parse_sections_from_markdown(markdown: &str) -> SectionMap {
    let patterns = section_patterns();
    let mut sections = SectionMap::new();
    let mut current: Option<SectionName> = None;
    let mut buffer: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();
        let matched = if trimmed.starts_with('#') {
            patterns
                .iter()
                .find(|(re, _)| re.is_match(trimmed))
                .map(|(_, name)| *name)
        } else {
            None
        };

        match matched {
            Some(name) => {
                if let Some(previous) = current {
                    sections.append(previous, &buffer.join("\n"));
                }
                current = Some(name);
                buffer.clear();
            }
            None if current.is_some() => buffer.push(line),
            None => {}
        }
    }
    if let Some(previous) = current {
        sections.append(previous, &buffer.join("\n"));
    }

    debug!(
        "从标题识别的章节: {:?}",
        sections.names().iter().map(|s| s.key()).collect::<Vec<_>>()
    );
    sections
}

/// 章节补全的提示词
fn inference_prompt(targets: &[SectionName], text: &str) -> String {
    let names = targets
        .iter()
        .map(|s| s.key())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Analyze the following scientific paper text and extract the content for ONLY the following sections: {names}.\n\
         If a section listed above is clearly not present in the text, provide an empty string \"\" for its value.\n\
         Focus on capturing the core content for each requested section accurately and completely.\n\n\
         Paper Text (potentially truncated):\n{text}\n\n\
         Respond ONLY with a valid JSON object where the keys are the section names ({names}) and the values are the extracted text strings for each section.\n\
         Example for missing 'results': {{\"introduction\": \"...\", \"results\": \"\"}}"
    )
}

/// 把 LLM 补全的结果合并进章节表
///
/// 只接受目标章节，且新内容要比原内容长 [`INFERENCE_MIN_GAIN`] 以上。
///
/// # 返回
/// 被更新的章节
pub fn merge_inferred_sections(
    sections: &mut SectionMap,
    targets: &[SectionName],
    inferred: &Value,
) -> Vec<SectionName> {
    let Some(map) = inferred.as_object() else {
        return Vec::new();
    };
    let mut updated = Vec::new();
    for (key, content) in map {
        let Some(name) = SectionName::from_key(key) else {
            continue;
        };
        let Some(content) = content.as_str() else {
            continue;
        };
        if !targets.contains(&name) {
            continue;
        }
        let existing = sections.get(name).chars().count();
        if content.chars().count() > existing + INFERENCE_MIN_GAIN {
            sections.set(name, content.trim());
            updated.push(name);
        }
    }
    updated
}

// ========== 元数据修补 ==========

/// 从正文开头修补缺失的 DOI、年份和出版信息
pub fn refine_metadata(paper: &mut Paper, text: &str) {
    if text.is_empty() {
        return;
    }
    let snippet = take_chars(text, REFINE_WINDOW);

    if paper.doi.is_none() {
        if let Some(doi) = find_doi(snippet) {
            debug!("从正文修补 DOI: {}", doi);
            paper.doi = Some(doi);
        }
    }

    if paper.year.is_none() {
        let context_year = RegexBuilder::new(
            r"(?:published|received|accepted|©|\(c\)|\()\s*((?:19|20)\d{2})\b",
        )
        .case_insensitive(true)
        .build()
        .ok()
        .and_then(|re| re.captures(snippet))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
        paper.year = context_year.or_else(|| find_year(take_chars(snippet, 1000)));
        if let Some(year) = &paper.year {
            debug!("从正文修补年份: {}", year);
        }
    }

    if paper.journal.is_none() || paper.volume.is_none() {
        let publication = RegexBuilder::new(
            r"^\s*([A-Z][A-Za-z&\s]{4,}?)[,\.]?\s+(?:Vol\.?|Volume)\s*(\d+)(?:\s*[,\(]?\s*(?:No\.?|Issue)\s*(\w+)\)?)?(?:\s*,?\s*(?:pp\.?|pages)\s*([\d\-–]+))?(?:\s*,?\s*\(?((?:19|20)\d{2})\)?)?",
        )
        .case_insensitive(true)
        .multi_line(true)
        .build()
        .ok();
        if let Some(caps) = publication.as_ref().and_then(|re| re.captures(snippet)) {
            let group = |i: usize| caps.get(i).map(|m| m.as_str().trim().to_string());
            if paper.journal.is_none() {
                paper.journal = group(1);
            }
            if paper.volume.is_none() {
                paper.volume = group(2);
            }
            if paper.issue.is_none() {
                paper.issue = group(3);
            }
            if paper.pages.is_none() {
                paper.pages = group(4);
            }
            if paper.year.is_none() {
                paper.year = group(5);
            }
        }
    }

    if paper.publication_date.is_none() {
        paper.publication_date = paper.year.clone();
    }
}

// ========== 文档服务 ==========

/// 文档抽取结果
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub paper: Paper,
    pub sections: SectionMap,
    pub full_text: String,
    pub title_source: TitleSource,
}

/// 文档服务
pub struct DocumentService {
    converter: Arc<dyn DocumentConverter>,
    llm: Arc<LlmService>,
    metadata: MetadataService,
    config: DocumentConfig,
}

impl DocumentService {
    pub fn new(
        converter: Arc<dyn DocumentConverter>,
        llm: Arc<LlmService>,
        metadata: MetadataService,
        config: DocumentConfig,
    ) -> Self {
        Self {
            converter,
            llm,
            metadata,
            config,
        }
    }

    /// 抽取一篇 PDF
    ///
    /// # 返回
    /// PDF 无法读取、没有文本或标题无法确定时返回错误（整篇论文被拒绝）
    pub async fn extract(&self, pdf_path: &Path) -> AppResult<ExtractedDocument> {
        info!(
            "📄 转换 PDF ({}): {}",
            self.converter.name(),
            pdf_path.display()
        );
        let doc = self.converter.convert(pdf_path).await?;
        let body = doc.structured.as_deref().unwrap_or(&doc.plain_text);
        if body.trim().is_empty() {
            return Err(DocumentError::EmptyText {
                path: pdf_path.to_path_buf(),
            }
            .into());
        }

        let resolved = title_resolver::resolve(&doc, pdf_path)?;
        let mut paper = self.metadata.build_paper(&resolved.title, &doc.info).await;

        let mut sections = match doc.structured.as_deref() {
            Some(markdown) => parse_sections_from_markdown(markdown),
            None => SectionMap::new(),
        };
        if self.config.infer_sections {
            self.infer_sections(body, &mut sections).await;
        }
        sections.ensure_all();

        if sections.get(SectionName::Abstract).is_empty() && !paper.abstract_text.is_empty() {
            sections.set(SectionName::Abstract, paper.abstract_text.clone());
        }
        if paper.abstract_text.is_empty() {
            paper.abstract_text =
                take_chars(sections.get(SectionName::Abstract), self.config.abstract_prefill_limit)
                    .to_string();
        }

        let full_text = take_chars(body, self.config.max_text_length).to_string();
        refine_metadata(&mut paper, &full_text);
        paper.source_path = pdf_path.display().to_string();

        if paper.doi.is_none() {
            info!("未能确定 DOI: {}", pdf_path.display());
        }
        if paper.year.is_none() {
            info!("未能确定年份: {}", pdf_path.display());
        }

        Ok(ExtractedDocument {
            paper,
            sections,
            full_text,
            title_source: resolved.source,
        })
    }

    /// 让 LLM 补全过短的章节，失败时保持原样
    async fn infer_sections(&self, text: &str, sections: &mut SectionMap) {
        let targets = sections.thin_sections(THIN_SECTION_CHARS);
        if targets.is_empty() || text.trim().is_empty() {
            debug!("无需补全章节");
            return;
        }

        info!(
            "🧠 LLM 补全章节: {:?}",
            targets.iter().map(|s| s.key()).collect::<Vec<_>>()
        );
        let snippet = head_and_tail(text, INFERENCE_TEXT_LIMIT);
        let prompt = inference_prompt(&targets, &snippet);
        let outcome = self
            .llm
            .extract_with_mode(
                &prompt,
                &RecordSchema::<SectionInference>::new(),
                self.llm.retry_attempts(),
                ValidationMode::Lenient,
            )
            .await;

        match outcome.value() {
            Some(value) => {
                let updated = merge_inferred_sections(sections, &targets, value);
                for name in updated {
                    info!("✓ 章节 {} 已由 LLM 补全", name.key());
                }
            }
            None => warn!("章节补全失败，保留原有章节"),
        }
    }
}

/// 按配置创建转换后端
pub fn converter_for(config: &DocumentConfig) -> AppResult<Arc<dyn DocumentConverter>> {
    Ok(match config.backend {
        crate::config::DocumentBackend::Lopdf => Arc::new(LopdfConverter),
        crate::config::DocumentBackend::Docling => Arc::new(DoclingConverter::new(config)?),
    })
}

/// 相对 `root` 的路径，不在其下时返回文件名
pub fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.file_name().map(PathBuf::from).unwrap_or_default())
}
