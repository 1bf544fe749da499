//! 学术元数据检索客户端（SerpApi Google Scholar）
//!
//! 只取第一条结果，按启发式规则解析作者、年份、期刊、PDF 链接和 DOI。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::MetadataConfig;
use crate::error::{ApiError, AppError, AppResult};
use crate::models::Author;
use crate::utils::text::{find_doi, find_year, is_bare_year};

/// 检索得到的元数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScholarMetadata {
    pub title: String,
    pub authors: Vec<Author>,
    pub abstract_text: Option<String>,
    pub year: Option<String>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    pub file_url: Option<String>,
    pub pdf_path: Option<String>,
    pub cited_by: Option<u64>,
    pub result_id: Option<String>,
}

/// 按标题检索论文元数据的能力
#[async_trait]
pub trait MetadataSearch: Send + Sync {
    /// 没有结果或检索失败时返回 None
    async fn search(&self, title: &str, author: Option<&str>) -> Option<ScholarMetadata>;
}

/// SerpApi 客户端
pub struct ScholarClient {
    client: Client,
    endpoint: String,
    api_key: String,
    hl: String,
    num: u32,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl ScholarClient {
    /// 创建客户端，未配置 API key 时返回 None
    pub fn new(config: &MetadataConfig) -> AppResult<Option<Self>> {
        if !config.enabled || config.serpapi_key.is_empty() {
            return Ok(None);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::api_request_failed(&config.endpoint, e))?;
        Ok(Some(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.serpapi_key.clone(),
            hl: config.hl.clone(),
            num: config.num,
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }))
    }

    async fn request(&self, query: &str) -> AppResult<Value> {
        let num = self.num.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("engine", "google_scholar"),
                ("q", query),
                ("hl", self.hl.as_str()),
                ("num", num.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&self.endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::BadStatus {
                endpoint: self.endpoint.clone(),
                status: status.as_u16(),
                body,
            }
            .into());
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| AppError::api_request_failed(&self.endpoint, e))
    }
}

#[async_trait]
impl MetadataSearch for ScholarClient {
    async fn search(&self, title: &str, author: Option<&str>) -> Option<ScholarMetadata> {
        let query = build_query(title, author);
        info!("🔎 学术检索: {}", query);

        for attempt in 1..=self.retry_attempts {
            match self.request(&query).await {
                Ok(body) => {
                    if let Some(error) = body.get("error") {
                        warn!("学术检索返回错误: {}", error);
                        return None;
                    }
                    let first = body
                        .get("organic_results")
                        .and_then(Value::as_array)
                        .and_then(|results| results.first());
                    return match first {
                        Some(result) => {
                            let metadata = parse_organic_result(result);
                            debug!("学术检索命中: {}", metadata.title);
                            Some(metadata)
                        }
                        None => {
                            info!("学术检索无结果: {}", title);
                            None
                        }
                    };
                }
                Err(e) => {
                    warn!(
                        "学术检索失败 (尝试 {}/{}): {}",
                        attempt, self.retry_attempts, e
                    );
                    if attempt < self.retry_attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }
        None
    }
}

/// 构造精确标题查询，可附带第一作者
pub fn build_query(title: &str, author: Option<&str>) -> String {
    let mut query = format!("\"{}\"", title.trim());
    if let Some(author) = author.map(str::trim).filter(|a| !a.is_empty()) {
        query.push_str(&format!(" author:\"{}\"", author));
    }
    query
}

/// 解析一条 `organic_results` 记录
pub fn parse_organic_result(result: &Value) -> ScholarMetadata {
    let text = |key: &str| {
        result
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let mut metadata = ScholarMetadata {
        title: text("title").unwrap_or_default(),
        abstract_text: text("snippet"),
        file_url: text("link"),
        result_id: text("result_id"),
        cited_by: result
            .pointer("/inline_links/cited_by/total")
            .or_else(|| result.pointer("/cited_by/total"))
            .and_then(Value::as_u64),
        ..Default::default()
    };

    let summary = result
        .pointer("/publication_info/summary")
        .and_then(Value::as_str)
        .unwrap_or("");
    if !summary.is_empty() {
        let parts: Vec<&str> = summary.split(" - ").collect();
        let head = parts[0];
        let head_lower = head.to_lowercase();
        let looks_like_venue = ["journal", "conf", "proc"]
            .iter()
            .any(|kw| head_lower.contains(kw));
        if head.contains(',') && !looks_like_venue {
            metadata.authors = head
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(Author::named)
                .collect();
        }

        metadata.year = find_year(summary);

        let journal = if parts.len() > 1 {
            Some(parts[1])
        } else if metadata.authors.is_empty() {
            Some(head)
        } else {
            None
        };
        metadata.journal = journal
            .map(str::trim)
            .filter(|j| !j.is_empty() && !is_bare_year(j))
            .map(str::to_string);
    }

    if let Some(resources) = result.get("resources").and_then(Value::as_array) {
        metadata.pdf_path = resources
            .iter()
            .find(|r| {
                r.get("file_format")
                    .and_then(Value::as_str)
                    .map(|f| f.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
            })
            .and_then(|r| r.get("link").and_then(Value::as_str))
            .map(str::to_string);
    }

    metadata.doi = metadata.file_url.as_deref().and_then(find_doi);
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_query() {
        assert_eq!(build_query(" Deep Nets ", None), "\"Deep Nets\"");
        assert_eq!(
            build_query("Deep Nets", Some("A Smith")),
            "\"Deep Nets\" author:\"A Smith\""
        );
        assert_eq!(build_query("Deep Nets", Some("  ")), "\"Deep Nets\"");
    }

    #[test]
    fn test_parse_organic_result() {
        let result = json!({
            "title": "Deep Nets for Soil",
            "snippet": "We study soil.",
            "link": "https://doi.org/10.1000/xyz123",
            "result_id": "abc",
            "publication_info": {"summary": "A Smith, B Jones - Soil Science, 2021 - Elsevier"},
            "resources": [
                {"file_format": "HTML", "link": "https://x/html"},
                {"file_format": "PDF", "link": "https://x/paper.pdf"}
            ],
            "inline_links": {"cited_by": {"total": 12}}
        });
        let metadata = parse_organic_result(&result);
        assert_eq!(metadata.title, "Deep Nets for Soil");
        assert_eq!(
            metadata.authors,
            vec![Author::named("A Smith"), Author::named("B Jones")]
        );
        assert_eq!(metadata.year.as_deref(), Some("2021"));
        assert_eq!(metadata.journal.as_deref(), Some("Soil Science, 2021"));
        assert_eq!(metadata.pdf_path.as_deref(), Some("https://x/paper.pdf"));
        assert_eq!(metadata.doi.as_deref(), Some("10.1000/xyz123"));
        assert_eq!(metadata.cited_by, Some(12));
        assert_eq!(metadata.abstract_text.as_deref(), Some("We study soil."));
    }

    #[test]
    fn test_parse_venue_head_is_not_authors() {
        let result = json!({
            "title": "T",
            "publication_info": {"summary": "Journal of Things, 2020"}
        });
        let metadata = parse_organic_result(&result);
        assert!(metadata.authors.is_empty());
        assert_eq!(metadata.journal.as_deref(), Some("Journal of Things, 2020"));
        assert_eq!(metadata.year.as_deref(), Some("2020"));
    }

    #[test]
    fn test_client_disabled_without_key() {
        let config = MetadataConfig::default();
        assert!(ScholarClient::new(&config).unwrap().is_none());
    }
}
