//! 论文模型

use serde::{Deserialize, Serialize};

/// 作者
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    pub affiliation: Option<String>,
    pub email: Option<String>,
    pub orcid: Option<String>,
    pub is_corresponding: Option<bool>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// 一篇科学论文
///
/// 每个 PDF 处理时创建一次；全部组件抽取完成后写入置信度，之后不再修改。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paper {
    /// 运行内 ID
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub doi: Option<String>,
    pub publication_date: Option<String>,
    pub year: Option<String>,
    pub journal: Option<String>,
    pub volume: Option<String>,
    pub issue: Option<String>,
    pub pages: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// 远程 PDF 链接（来自学术检索）
    pub pdf_path: Option<String>,
    /// 论文页面链接（来自学术检索）
    pub file_url: Option<String>,
    /// 本地源文件路径，只写入结果文件，不上传
    pub source_path: String,
    /// 抽取日期（YYYY-MM-DD）
    pub extraction_date: String,
    /// 全部组件置信度的平均值
    pub extraction_confidence_score: Option<f64>,
}
