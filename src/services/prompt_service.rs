//! 提示词服务 - 业务能力层
//!
//! - [`PromptBook`]：从 TOML 文件加载每种组件的提示词模板
//! - [`PromptComposer`]：按组件类型挑选章节，拼出带长度上限的上下文

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::ExtractionConfig;
use crate::error::{AppResult, ConfigError, FileError};
use crate::models::{ComponentKind, SectionMap, SectionName};
use crate::utils::text::take_chars;

const TEXT_PLACEHOLDER: &str = "{text}";
const TRUNCATION_MARKER: &str = "\n... [Context Truncated]";

#[derive(Debug, Default, Deserialize)]
struct PromptFile {
    #[serde(default)]
    prompts: BTreeMap<String, String>,
}

/// 组件 key → 提示词模板
#[derive(Debug, Clone, Default)]
pub struct PromptBook {
    templates: BTreeMap<String, String>,
}

impl PromptBook {
    /// 从 TOML 文件加载
    ///
    /// 文件不存在时返回空提示词表（全部使用通用模板）
    pub fn load(path: &Path) -> AppResult<Self> {
        if !path.exists() {
            warn!("提示词文件不存在，使用通用模板: {}", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| FileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let book = Self::from_toml_str(&content, path)?;
        info!(
            "✓ 已加载 {} 个提示词模板: {}",
            book.templates.len(),
            path.display()
        );
        Ok(book)
    }

    pub fn from_toml_str(content: &str, origin: &Path) -> AppResult<Self> {
        let file: PromptFile =
            toml::from_str(content).map_err(|source| ConfigError::ParamsParseFailed {
                path: origin.to_path_buf(),
                source,
            })?;
        Ok(Self {
            templates: file.prompts,
        })
    }

    pub fn template(&self, kind: ComponentKind) -> Option<&str> {
        self.templates.get(kind.key()).map(String::as_str)
    }

    /// 配置中启用但没有模板的组件
    pub fn missing(&self, kinds: &[ComponentKind]) -> Vec<ComponentKind> {
        kinds
            .iter()
            .copied()
            .filter(|k| self.template(*k).is_none())
            .collect()
    }
}

/// 组件类型对应的上下文章节
pub fn sections_for(kind: ComponentKind) -> &'static [SectionName] {
    use SectionName::*;
    match kind {
        ComponentKind::ResearchContext
        | ComponentKind::TheoreticalBasis
        | ComponentKind::ResearchProblem
        | ComponentKind::ScientificChallenge => &[Abstract, Introduction, Conclusion],
        ComponentKind::KnowledgeGap | ComponentKind::ResearchQuestion => {
            &[Abstract, Introduction, Discussion, Conclusion]
        }
        ComponentKind::FutureDirection | ComponentKind::PotentialApplication => {
            &[Abstract, Results, Discussion, Conclusion]
        }
        ComponentKind::MethodologicalChallenge
        | ComponentKind::ImplementationChallenge
        | ComponentKind::Limitation => &[Abstract, Methodology, Results, Discussion],
        ComponentKind::MethodologicalFramework => &[Abstract, Introduction, Methodology, Results],
        ComponentKind::MaterialTool => &[Methodology, Results],
    }
}

/// 提示词拼装器
#[derive(Debug, Clone)]
pub struct PromptComposer {
    book: PromptBook,
    section_max_chars: usize,
    total_max_chars: usize,
}

impl PromptComposer {
    pub fn new(book: PromptBook, config: &ExtractionConfig) -> Self {
        Self {
            book,
            section_max_chars: config.section_max_chars,
            total_max_chars: config.total_max_chars,
        }
    }

    /// 拼装上下文：标题加上该组件关心的章节
    pub fn context(&self, kind: ComponentKind, title: &str, sections: &SectionMap) -> String {
        let mut context = format!("Title: {}", title);
        for name in sections_for(kind) {
            context.push_str(&format!(
                "\n\n{}:\n{}",
                name.heading(),
                take_chars(sections.get(*name), self.section_max_chars)
            ));
        }

        if context.chars().count() > self.total_max_chars {
            warn!("{} 的上下文过长，已截断", kind.label());
            let mut truncated = take_chars(&context, self.total_max_chars).to_string();
            truncated.push_str(TRUNCATION_MARKER);
            return truncated;
        }
        context
    }

    /// 生成完整提示词
    ///
    /// # 参数
    /// - `kind`: 组件类型
    /// - `title`: 论文标题
    /// - `sections`: 章节表
    pub fn compose(&self, kind: ComponentKind, title: &str, sections: &SectionMap) -> String {
        let context = self.context(kind, title, sections);
        match self.book.template(kind) {
            Some(template) if template.contains(TEXT_PLACEHOLDER) => {
                template.replace(TEXT_PLACEHOLDER, &context)
            }
            Some(template) => {
                warn!("{} 的模板缺少 {{text}} 占位符，上下文追加在末尾", kind.key());
                format!("{}\n\nPaper Context:\n{}", template, context)
            }
            None => {
                warn!("{} 没有提示词模板，使用通用模板", kind.key());
                format!(
                    "Extract information relevant to {} from the provided text. Respond in JSON format.\n\nPaper Context:\n{}",
                    kind.key(),
                    context
                )
            }
        }
    }
}
