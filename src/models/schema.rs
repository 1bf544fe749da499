//! LLM 响应的校验 schema
//!
//! schema 文本由 `schemars` 从 Rust 类型生成，校验即反序列化加取值检查。
//! 数组按条目逐个校验，对象作为单条记录校验。

use std::collections::BTreeMap;
use std::marker::PhantomData;

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 反序列化之后的额外检查
pub trait ValidateRecord {
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// 结构化抽取使用的 schema
pub trait ResponseSchema: Send + Sync {
    /// schema 名称（用于日志）
    fn name(&self) -> String;

    /// 追加到提示词中的 JSON schema
    fn schema_json(&self) -> Value;

    /// 校验 LLM 返回的 JSON，错误信息用于纠正提示
    fn validate(&self, value: &Value) -> Result<(), String>;
}

/// 由 Rust 类型生成的 schema
pub struct RecordSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> RecordSchema<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for RecordSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResponseSchema for RecordSchema<T>
where
    T: JsonSchema + DeserializeOwned + ValidateRecord,
{
    fn name(&self) -> String {
        T::schema_name()
    }

    fn schema_json(&self) -> Value {
        serde_json::to_value(schema_for!(T)).unwrap_or(Value::Null)
    }

    fn validate(&self, value: &Value) -> Result<(), String> {
        match value {
            Value::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    validate_one::<T>(item).map_err(|e| format!("第 {} 项: {}", index, e))?;
                }
                Ok(())
            }
            Value::Object(_) => validate_one::<T>(value),
            other => Err(format!(
                "期望 JSON 对象或数组，实际为 {}",
                json_type_name(other)
            )),
        }
    }
}

fn validate_one<T: DeserializeOwned + ValidateRecord>(value: &Value) -> Result<(), String> {
    let record: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
    record.check()
}

/// JSON 值的类型名
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// LLM 补全章节时的响应：章节名 → 文本
pub type SectionInference = BTreeMap<String, String>;

impl ValidateRecord for SectionInference {}
