//! LLM 服务 - 业务能力层
//!
//! 在单次补全（`CompletionBackend`）之上提供：
//! - `generate`：传输失败时指数退避重试
//! - `extract_structured`：提示 → 去除代码围栏 → 解析 JSON → schema 校验 的有界循环
//!
//! 传输失败与校验失败共用同一个尝试次数预算。
//! 结构化抽取从不返回错误，用尽次数后返回 [`ExtractOutcome::Failed`]。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clients::CompletionBackend;
use crate::config::{LlmConfig, ValidationMode};
use crate::models::ResponseSchema;
use crate::utils::logging::truncate_text;

const JSON_ONLY_INSTRUCTION: &str = "Important: Respond ONLY with valid, parseable JSON. Do not include any introductory text, explanations, apologies, or markdown formatting like ```json ... ``` around the JSON object/array.";

/// 结构化抽取的结果
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractOutcome {
    /// 通过校验
    Accepted { value: Value, attempts: u32 },
    /// 宽松模式下未通过校验，原样返回
    Unvalidated { value: Value, error: String },
    /// 用尽尝试次数
    Failed { attempts: u32, last_error: String },
}

impl ExtractOutcome {
    /// 可用的 JSON（通过校验或宽松模式返回的）
    pub fn value(&self) -> Option<&Value> {
        match self {
            ExtractOutcome::Accepted { value, .. } | ExtractOutcome::Unvalidated { value, .. } => {
                Some(value)
            }
            ExtractOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ExtractOutcome::Failed { .. })
    }
}

/// LLM 服务
///
/// 职责：
/// - 重试与退避
/// - JSON 抽取与校验
/// - 不关心论文、组件或流程
pub struct LlmService {
    backend: Arc<dyn CompletionBackend>,
    temperature: f32,
    json_temperature: f32,
    retry_attempts: u32,
    backoff_base: Duration,
    mode: ValidationMode,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &LlmConfig) -> Self {
        Self {
            backend,
            temperature: config.temperature,
            json_temperature: config.json_temperature,
            retry_attempts: config.retry_attempts.max(1),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            mode: config.validation_mode,
        }
    }

    /// 配置的尝试次数
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// 第 `attempt` 次（从 0 开始）失败后的等待时间
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(1u32 << attempt.min(16))
    }

    /// 普通文本补全
    ///
    /// # 返回
    /// 用尽尝试次数后返回 None
    pub async fn generate(&self, prompt: &str) -> Option<String> {
        for attempt in 0..self.retry_attempts {
            match self.backend.complete(prompt, self.temperature).await {
                Ok(text) => return Some(text),
                Err(e) => {
                    warn!(
                        "LLM 请求失败 (尝试 {}/{}): {}",
                        attempt + 1,
                        self.retry_attempts,
                        e
                    );
                    if attempt + 1 < self.retry_attempts {
                        sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }
        None
    }

    /// 使用配置的尝试次数做结构化抽取
    pub async fn extract_json(&self, prompt: &str, schema: &dyn ResponseSchema) -> ExtractOutcome {
        self.extract_structured(prompt, schema, self.retry_attempts)
            .await
    }

    /// 结构化抽取
    ///
    /// # 参数
    /// - `prompt`: 原始提示词
    /// - `schema`: 校验用的 schema
    /// - `max_attempts`: 最大尝试次数（0 视为 1）
    pub async fn extract_structured(
        &self,
        prompt: &str,
        schema: &dyn ResponseSchema,
        max_attempts: u32,
    ) -> ExtractOutcome {
        self.extract_with_mode(prompt, schema, max_attempts, self.mode)
            .await
    }

    /// 指定校验模式的结构化抽取
    pub async fn extract_with_mode(
        &self,
        prompt: &str,
        schema: &dyn ResponseSchema,
        max_attempts: u32,
        mode: ValidationMode,
    ) -> ExtractOutcome {
        let max_attempts = max_attempts.max(1);
        let mut current_prompt = build_json_prompt(prompt, schema, mode);
        let mut last_error = String::new();

        for attempt in 0..max_attempts {
            debug!(
                "结构化抽取 {} (尝试 {}/{})",
                schema.name(),
                attempt + 1,
                max_attempts
            );

            let raw = match self
                .backend
                .complete(&current_prompt, self.json_temperature)
                .await
            {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        "LLM 请求失败 (尝试 {}/{}): {}",
                        attempt + 1,
                        max_attempts,
                        e
                    );
                    last_error = format!("请求失败: {}", e);
                    if attempt + 1 < max_attempts {
                        sleep(self.backoff(attempt)).await;
                    }
                    continue;
                }
            };

            let cleaned = strip_code_fences(&raw);
            let value: Value = match serde_json::from_str(cleaned) {
                Ok(value) => value,
                Err(e) => {
                    warn!(
                        "LLM 返回的不是合法 JSON (尝试 {}/{}): {} | 内容: {}",
                        attempt + 1,
                        max_attempts,
                        e,
                        truncate_text(cleaned, 200)
                    );
                    last_error = format!("JSON 解析失败: {}", e);
                    current_prompt.push_str(&parse_correction(&e.to_string()));
                    continue;
                }
            };

            match schema.validate(&value) {
                Ok(()) => {
                    info!(
                        "✓ {} 抽取成功 (第 {} 次尝试)",
                        schema.name(),
                        attempt + 1
                    );
                    return ExtractOutcome::Accepted {
                        value,
                        attempts: attempt + 1,
                    };
                }
                Err(error) => match mode {
                    ValidationMode::Lenient => {
                        warn!("{} 未通过校验，宽松模式下直接返回: {}", schema.name(), error);
                        return ExtractOutcome::Unvalidated { value, error };
                    }
                    ValidationMode::Strict => {
                        warn!(
                            "{} 未通过校验 (尝试 {}/{}): {}",
                            schema.name(),
                            attempt + 1,
                            max_attempts,
                            error
                        );
                        current_prompt.push_str(&validation_correction(&error));
                        last_error = format!("校验失败: {}", error);
                    }
                },
            }
        }

        warn!(
            "❌ {} 抽取失败，已尝试 {} 次: {}",
            schema.name(),
            max_attempts,
            last_error
        );
        ExtractOutcome::Failed {
            attempts: max_attempts,
            last_error,
        }
    }
}

/// 在提示词后追加仅 JSON 的要求，严格模式下附带 schema
pub fn build_json_prompt(prompt: &str, schema: &dyn ResponseSchema, mode: ValidationMode) -> String {
    let mut full = format!("{}\n\n{}", prompt, JSON_ONLY_INSTRUCTION);
    if mode == ValidationMode::Strict {
        let schema_text =
            serde_json::to_string_pretty(&schema.schema_json()).unwrap_or_default();
        full.push_str(&format!(
            "\n\nThe JSON response MUST conform strictly to this JSON schema (a single object or an array of such objects):\n{}",
            schema_text
        ));
    }
    full
}

/// 去掉 Markdown 代码围栏
pub fn strip_code_fences(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```JSON")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn parse_correction(error: &str) -> String {
    format!(
        "\n\nYour previous response was not valid JSON. Please provide only the raw JSON object/array. Error: {}",
        error
    )
}

fn validation_correction(error: &str) -> String {
    format!(
        "\n\nYour previous response had validation errors against the schema: {}\nPlease fix them and ensure conformance to the required schema.",
        error
    )
}
