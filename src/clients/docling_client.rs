//! 文档转换服务客户端
//!
//! 上传 PDF，取回带层级的章节列表和全文。

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ApiError, AppError, AppResult, FileError};

/// 转换服务返回的文档
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParsedDocument {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub sections: Vec<ParsedSection>,
    #[serde(default)]
    pub full_text: String,
}

/// 一个带标题层级的章节
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ParsedSection {
    pub title: String,
    pub level: i32,
    #[serde(default)]
    pub text: String,
}

/// 文档转换服务客户端
pub struct DoclingClient {
    base_url: String,
    client: Client,
}

impl DoclingClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::api_request_failed(base_url, e))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// 上传并解析 PDF
    pub async fn parse_pdf(&self, pdf_path: &Path) -> AppResult<ParsedDocument> {
        let endpoint = format!("{}/parse", self.base_url);
        let file_bytes = tokio::fs::read(pdf_path)
            .await
            .map_err(|source| FileError::ReadFailed {
                path: pdf_path.to_path_buf(),
                source,
            })?;
        let filename = pdf_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document.pdf")
            .to_string();

        let part = reqwest::multipart::Part::bytes(file_bytes)
            .file_name(filename)
            .mime_str("application/pdf")
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        debug!("上传 PDF 至文档转换服务: {}", pdf_path.display());
        let resp = self
            .client
            .post(&endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body,
            }
            .into());
        }

        resp.json::<ParsedDocument>()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))
    }
}

impl ParsedDocument {
    /// 渲染为 Markdown（章节层级对应 `#` 数量）
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        for section in &self.sections {
            let level = section.level.clamp(1, 6) as usize;
            out.push_str(&"#".repeat(level));
            out.push(' ');
            out.push_str(section.title.trim());
            out.push_str("\n\n");
            if !section.text.trim().is_empty() {
                out.push_str(section.text.trim());
                out.push_str("\n\n");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_markdown_levels() {
        let doc = ParsedDocument {
            title: Some("Foo".to_string()),
            sections: vec![
                ParsedSection {
                    title: "Foo: Bar Study".to_string(),
                    level: 1,
                    text: String::new(),
                },
                ParsedSection {
                    title: "Abstract".to_string(),
                    level: 2,
                    text: "We study bars.".to_string(),
                },
                ParsedSection {
                    title: "Deep".to_string(),
                    level: 9,
                    text: "x".to_string(),
                },
            ],
            full_text: String::new(),
        };
        assert_eq!(
            doc.to_markdown(),
            "# Foo: Bar Study\n\n## Abstract\n\nWe study bars.\n\n###### Deep\n\nx\n\n"
        );
    }

    #[test]
    fn test_parsed_document_tolerates_missing_fields() {
        let doc: ParsedDocument = serde_json::from_str(r#"{"sections": []}"#).unwrap();
        assert!(doc.title.is_none());
        assert!(doc.full_text.is_empty());
    }
}
