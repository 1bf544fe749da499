//! LLM API 客户端
//!
//! 封装与 OpenAI 兼容接口的单次对话请求，不做重试。
//! 重试、退避和 JSON 校验由 `services::llm_service` 负责。

use std::time::Duration;

use anyhow::Result;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::LlmError;

/// 一次文本补全请求的能力
///
/// 返回 `Err` 表示传输层失败（网络、超时、非 2xx、响应结构异常）。
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String>;
}

/// LLM 客户端
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    max_tokens: u32,
    timeout: Duration,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm.api_key)
            .with_api_base(config.llm_api_base());

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm.model.clone(),
            max_tokens: config.llm.max_tokens,
            timeout: Duration::from_secs(config.llm.timeout_seconds),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn complete(&self, prompt: &str, temperature: f32) -> Result<String> {
        debug!(
            "调用 LLM API，模型: {}，提示词长度: {} 字符",
            self.model_name,
            prompt.len()
        );

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;
        let messages = vec![ChatCompletionRequestMessage::User(user_msg)];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(temperature)
            .max_tokens(self.max_tokens)
            .build()?;

        let response = tokio::time::timeout(self.timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|e| {
                warn!("LLM API 调用失败: {}", e);
                LlmError::ApiCallFailed {
                    model: self.model_name.clone(),
                    reason: e.to_string(),
                }
            })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| LlmError::EmptyResponse {
                model: self.model_name.clone(),
            })?;

        debug!("LLM API 调用成功，响应长度: {} 字符", content.len());
        Ok(content)
    }
}
