//! 标题解析
//!
//! 按顺序尝试三个候选，第一个通过校验的胜出：
//! 1. 首页结构化文本中层级最高的第一个标题
//! 2. PDF 内嵌的 Title 元数据
//! 3. 文件名
//!
//! 校验：小写后的候选必须是小写证据文本的子串。
//! 有结构化文本时只用它做证据，没有时才用纯文本。

use std::path::Path;

use regex::Regex;
use tracing::{debug, info, warn};

use crate::error::DocumentError;
use crate::services::document_service::ConvertedDocument;

/// 标题来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleSource {
    Heading,
    Embedded,
    Filename,
}

impl std::fmt::Display for TitleSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TitleSource::Heading => "首页标题",
            TitleSource::Embedded => "内嵌元数据",
            TitleSource::Filename => "文件名",
        };
        f.write_str(name)
    }
}

/// 通过校验的标题
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTitle {
    pub title: String,
    pub source: TitleSource,
}

/// 候选标题是否出现在证据文本中（忽略大小写）
pub fn validate(title: &str, evidence: &str) -> bool {
    let title = title.trim();
    !title.is_empty() && evidence.to_lowercase().contains(&title.to_lowercase())
}

/// 结构化文本中层级最高（`#` 最少）的第一个标题
pub fn header_candidate(structured: &str) -> Option<String> {
    let headings: Vec<(usize, &str)> = structured
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('#'))
        .map(|line| {
            let level = line.chars().take_while(|c| *c == '#').count();
            (level, line[level..].trim().trim_matches('*').trim())
        })
        .filter(|(_, text)| !text.is_empty())
        .collect();

    let min_level = headings.iter().map(|(level, _)| *level).min()?;
    headings
        .into_iter()
        .find(|(level, _)| *level == min_level)
        .map(|(_, text)| text.to_string())
}

/// 由文件名得到的候选：分隔符换成空格，去掉开头的编号和标点
pub fn filename_candidate(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let spaced: String = stem
        .chars()
        .map(|c| if c == '_' || c == '-' { ' ' } else { c })
        .collect();
    let collapsed = spaced.split_whitespace().collect::<Vec<_>>().join(" ");

    let stripped = match Regex::new(r"^[\d\p{P}\s]+") {
        Ok(re) => re.replace(&collapsed, "").into_owned(),
        Err(_) => collapsed,
    };
    let stripped = stripped.trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// 按顺序解析标题
///
/// # 返回
/// 没有候选通过校验时返回 `DocumentError::TitleUnresolved`
pub fn resolve(doc: &ConvertedDocument, path: &Path) -> Result<ResolvedTitle, DocumentError> {
    let evidence = match doc.page_one_structured.as_deref() {
        Some(structured) if !structured.trim().is_empty() => structured,
        _ => doc.plain_text.as_str(),
    };

    let candidates = [
        (
            TitleSource::Heading,
            doc.page_one_structured.as_deref().and_then(header_candidate),
        ),
        (
            TitleSource::Embedded,
            doc.info
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string),
        ),
        (TitleSource::Filename, filename_candidate(path)),
    ];

    let mut tried = 0;
    for (source, candidate) in candidates {
        let Some(title) = candidate else {
            continue;
        };
        tried += 1;
        if validate(&title, evidence) {
            info!("✓ 标题来自{}: {}", source, title);
            return Ok(ResolvedTitle { title, source });
        }
        debug!("候选标题未出现在正文中 ({}): {}", source, title);
    }

    warn!("❌ 无法确定标题: {}", path.display());
    Err(DocumentError::TitleUnresolved {
        path: path.to_path_buf(),
        candidates: tried,
    })
}
