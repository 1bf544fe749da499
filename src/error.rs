//! 错误类型定义
//!
//! 按类别划分：配置、文档、API、文件、LLM。
//! 编排层使用 `anyhow`，能力层与客户端返回 `AppResult<T>`。

use std::path::PathBuf;
use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文档处理错误（PDF 读取、标题解析）
    #[error("文档错误: {0}")]
    Document(#[from] DocumentError),
    /// 远程 API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Llm(#[from] LlmError),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 参数文件解析失败
    #[error("参数文件 {path} 解析失败: {source}")]
    ParamsParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    /// 配置值非法
    #[error("配置项 {key} 非法: {reason}")]
    InvalidValue { key: String, reason: String },
}

/// 文档处理错误
#[derive(Debug, Error)]
pub enum DocumentError {
    /// PDF 无法打开或解析
    #[error("无法读取 PDF {path}: {reason}")]
    Unreadable { path: PathBuf, reason: String },
    /// 没有提取到任何文本
    #[error("PDF {path} 未提取到文本")]
    EmptyText { path: PathBuf },
    /// 所有候选标题均未通过校验
    #[error("PDF {path} 无法确定有效标题（已尝试 {candidates} 个候选）")]
    TitleUnresolved { path: PathBuf, candidates: usize },
    /// 文档转换服务失败
    #[error("文档转换失败 ({backend}): {reason}")]
    ConversionFailed { backend: String, reason: String },
}

/// 远程 API 调用错误
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 返回非成功状态码
    #[error("API返回错误响应 ({endpoint}): status={status}, body={body}")]
    BadStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 响应结构不符合预期
    #[error("API响应格式错误 ({endpoint}): {reason}")]
    MalformedResponse { endpoint: String, reason: String },
    /// 缺少认证信息
    #[error("缺少 API 令牌: {service}")]
    MissingToken { service: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// 目录不存在
    #[error("目录不存在: {path}")]
    DirectoryNotFound { path: PathBuf },
}

/// LLM 服务错误
#[derive(Debug, Error)]
pub enum LlmError {
    /// API 调用失败
    #[error("LLM API 调用失败 (模型: {model}): {reason}")]
    ApiCallFailed { model: String, reason: String },
    /// 返回内容为空
    #[error("LLM 返回内容为空 (模型: {model})")]
    EmptyResponse { model: String },
    /// 请求超时
    #[error("LLM 请求超时 ({seconds} 秒)")]
    Timeout { seconds: u64 },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置值非法错误
    pub fn invalid_config(key: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Config(ConfigError::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        })
    }

    /// 创建 PDF 无法读取错误
    pub fn unreadable_pdf(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        AppError::Document(DocumentError::Unreadable {
            path: path.into(),
            reason: reason.to_string(),
        })
    }

    /// 创建API请求失败错误
    pub fn api_request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Api(ApiError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建API响应格式错误
    pub fn malformed_response(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Api(ApiError::MalformedResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 是否为标题无法确定（整篇论文被拒绝）
    pub fn is_title_unresolved(&self) -> bool {
        matches!(self, AppError::Document(DocumentError::TitleUnresolved { .. }))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_unresolved_display() {
        let err = AppError::Document(DocumentError::TitleUnresolved {
            path: PathBuf::from("papers/a.pdf"),
            candidates: 2,
        });
        assert!(err.is_title_unresolved());
        let msg = err.to_string();
        assert!(msg.contains("papers/a.pdf"));
        assert!(msg.contains("2"));
    }

    #[test]
    fn test_invalid_config_constructor() {
        let err = AppError::invalid_config("processing.max_workers", "必须大于 0");
        assert!(matches!(err, AppError::Config(ConfigError::InvalidValue { .. })));
        assert!(!err.is_title_unresolved());
    }
}
