//! 元数据服务 - 业务能力层
//!
//! 用解析出的标题检索学术元数据，并与 PDF 内嵌信息合并成 [`Paper`]。
//! 检索结果优先，内嵌信息兜底。

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use crate::clients::{MetadataSearch, ScholarMetadata};
use crate::models::{Author, Paper};
use crate::services::document_service::EmbeddedInfo;
use crate::utils::text::{find_year, take_chars};

/// 元数据服务
pub struct MetadataService {
    search: Option<Arc<dyn MetadataSearch>>,
    abstract_prefill_limit: usize,
}

impl MetadataService {
    /// 创建服务
    ///
    /// # 参数
    /// - `search`: 检索能力，None 表示不检索
    /// - `abstract_prefill_limit`: 摘要预填充的最大字符数
    pub fn new(search: Option<Arc<dyn MetadataSearch>>, abstract_prefill_limit: usize) -> Self {
        Self {
            search,
            abstract_prefill_limit,
        }
    }

    /// 检索并合并元数据
    ///
    /// # 参数
    /// - `title`: 已通过校验的标题
    /// - `info`: PDF 内嵌信息
    pub async fn build_paper(&self, title: &str, info: &EmbeddedInfo) -> Paper {
        let embedded_authors = split_authors(info.author.as_deref().unwrap_or(""));
        let online = match &self.search {
            Some(search) => {
                search
                    .search(title, embedded_authors.first().map(String::as_str))
                    .await
            }
            None => {
                debug!("未启用学术检索");
                None
            }
        };
        if online.is_some() {
            info!("✓ 已获取在线元数据: {}", title);
        }
        merge_metadata(title, info, online, self.abstract_prefill_limit)
    }
}

/// 合并在线元数据与内嵌信息
///
/// 标题始终使用通过校验的标题。
pub fn merge_metadata(
    title: &str,
    info: &EmbeddedInfo,
    online: Option<ScholarMetadata>,
    abstract_prefill_limit: usize,
) -> Paper {
    let online = online.unwrap_or_default();

    let mut paper = Paper {
        title: title.to_string(),
        authors: online.authors,
        doi: online.doi,
        journal: online.journal,
        year: online.year.clone(),
        publication_date: online.year,
        file_url: online.file_url,
        pdf_path: online.pdf_path,
        abstract_text: online
            .abstract_text
            .map(|a| take_chars(a.trim(), abstract_prefill_limit).to_string())
            .unwrap_or_default(),
        ..Default::default()
    };

    if paper.authors.is_empty() {
        paper.authors = split_authors(info.author.as_deref().unwrap_or(""))
            .into_iter()
            .map(Author::named)
            .collect();
    }

    if paper.keywords.is_empty() {
        paper.keywords = split_keywords(info.keywords.as_deref().unwrap_or(""));
    }

    if paper.year.is_none() {
        paper.year = paper.publication_date.as_deref().and_then(find_year);
    }

    paper
}

/// 内嵌作者串按 `,` 拆分
pub fn split_authors(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect()
}

/// 内嵌关键词按 `;` 或 `,` 拆分
pub fn split_keywords(raw: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"[;,]") else {
        return Vec::new();
    };
    re.split(raw)
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}
