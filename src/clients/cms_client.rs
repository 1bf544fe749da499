//! CMS 上传客户端（Strapi 风格 REST 接口）
//!
//! 每个实体一次 `POST {base}/{slug}`，请求体为 `{"data": {...}}`，
//! 200/201 且响应含 `data.id` 视为成功。重试由发布服务负责。

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ApiError, AppError, AppResult};

/// 创建远端实体的能力
#[async_trait]
pub trait CmsTransport: Send + Sync {
    /// 创建一个实体，返回远端 ID
    async fn create(&self, slug: &str, payload: &Value) -> Result<Value>;
}

/// CMS 客户端
pub struct CmsClient {
    client: Client,
    api_base: String,
    token: String,
}

impl CmsClient {
    /// 创建客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        if config.cms.token.is_empty() {
            return Err(ApiError::MissingToken {
                service: "CMS".to_string(),
            }
            .into());
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.cms.timeout_seconds))
            .build()
            .map_err(|e| AppError::api_request_failed(config.cms_api_base(), e))?;
        Ok(Self {
            client,
            api_base: config.cms_api_base(),
            token: config.cms.token.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        crate::config::join_url(&self.api_base, path)
    }

    /// 探测连接与认证（`GET /users/me`），固定间隔重试
    pub async fn test_connection(&self, attempts: u32, delay: Duration) -> bool {
        let endpoint = self.endpoint("users/me");
        for attempt in 1..=attempts.max(1) {
            match self
                .client
                .get(&endpoint)
                .bearer_auth(&self.token)
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    info!("✓ CMS 连接正常: {}", self.api_base);
                    return true;
                }
                Ok(resp) => {
                    warn!(
                        "CMS 连接检测返回 {} (尝试 {}/{})",
                        resp.status(),
                        attempt,
                        attempts
                    );
                    if resp.status() == StatusCode::UNAUTHORIZED
                        || resp.status() == StatusCode::FORBIDDEN
                    {
                        return false;
                    }
                }
                Err(e) => {
                    warn!("CMS 连接检测失败 (尝试 {}/{}): {}", attempt, attempts, e);
                }
            }
            if attempt < attempts {
                sleep(delay).await;
            }
        }
        false
    }

    /// 探测单个集合端点是否可读
    pub async fn test_endpoint(&self, slug: &str) -> bool {
        let endpoint = self.endpoint(slug);
        match self
            .client
            .get(&endpoint)
            .query(&[("pagination[pageSize]", "1")])
            .bearer_auth(&self.token)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => {
                debug!("端点可用: {}", slug);
                true
            }
            Ok(resp) => {
                warn!("端点 {} 返回 {}", slug, resp.status());
                false
            }
            Err(e) => {
                warn!("端点 {} 请求失败: {}", slug, e);
                false
            }
        }
    }
}

#[async_trait]
impl CmsTransport for CmsClient {
    async fn create(&self, slug: &str, payload: &Value) -> Result<Value> {
        let endpoint = self.endpoint(slug);
        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.token)
            .json(&json!({ "data": payload }))
            .send()
            .await
            .map_err(|e| AppError::api_request_failed(&endpoint, e))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if status != StatusCode::OK && status != StatusCode::CREATED {
            return Err(ApiError::BadStatus {
                endpoint,
                status: status.as_u16(),
                body: body.to_string(),
            }
            .into());
        }

        extract_remote_id(&body).ok_or_else(|| {
            AppError::malformed_response(&endpoint, "响应缺少 data.id").into()
        })
    }
}

/// 取出响应中的 `data.id`
pub fn extract_remote_id(body: &Value) -> Option<Value> {
    body.pointer("/data/id")
        .filter(|id| id.is_number() || id.is_string())
        .cloned()
}
