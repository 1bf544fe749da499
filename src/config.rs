//! 程序配置
//!
//! 配置对象在启动时构建一次，之后以引用或 `Arc` 的方式传入各组件，
//! 运行过程中不再读取环境变量。
//!
//! 加载顺序：`Default` → 参数文件（TOML，可只写部分字段）→ 环境变量 → 命令行参数

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{AppError, AppResult, ConfigError, FileError};
use crate::models::ComponentKind;

/// 论文本身在 CMS 中的 key
pub const PAPER_KEY: &str = "scientific_paper";

/// 程序配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 待处理 PDF 的根目录
    pub pdf_dir: PathBuf,
    /// 结果 JSON 输出目录
    pub output_dir: PathBuf,
    /// 提示词文件
    pub prompt_file: PathBuf,
    /// 运行日志文件
    pub log_file: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    pub llm: LlmConfig,
    pub document: DocumentConfig,
    pub metadata: MetadataConfig,
    pub extraction: ExtractionConfig,
    pub processing: ProcessingConfig,
    pub cms: CmsConfig,
}

/// 校验模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// 校验失败时附带错误信息重试
    Strict,
    /// 校验失败时直接返回未校验的结构
    Lenient,
}

/// LLM 配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_endpoint: String,
    pub api_base_path: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// JSON 抽取时使用的温度
    pub json_temperature: f32,
    /// 传输失败与校验失败共用的尝试次数
    pub retry_attempts: u32,
    pub timeout_seconds: u64,
    /// 指数退避的基础间隔（毫秒），第 n 次重试等待 base * 2^n
    pub backoff_base_ms: u64,
    pub validation_mode: ValidationMode,
}

/// 文档转换后端
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentBackend {
    /// 本地 lopdf 纯文本抽取
    Lopdf,
    /// 远程文档转换服务（返回带层级的章节）
    Docling,
}

/// 文档处理配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    pub backend: DocumentBackend,
    pub docling_url: String,
    pub docling_timeout_seconds: u64,
    /// 全文保留的最大字符数
    pub max_text_length: usize,
    /// 是否让 LLM 补全缺失章节
    pub infer_sections: bool,
    /// 摘要预填充的最大字符数
    pub abstract_prefill_limit: usize,
}

/// 学术元数据检索配置（SerpApi Google Scholar）
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub serpapi_key: String,
    pub endpoint: String,
    pub hl: String,
    pub num: u32,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

/// 知识组件抽取配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// 需要抽取的组件 key 列表
    pub components: Vec<String>,
    /// 组件未给出置信度时使用的默认值
    pub confidence_default: f64,
    /// 单个章节进入提示词的最大字符数
    pub section_max_chars: usize,
    /// 提示词上下文的最大字符数
    pub total_max_chars: usize,
}

/// 批处理配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// 同时处理的论文数量
    pub max_workers: usize,
    /// 任一论文失败即终止整个运行
    pub fail_fast: bool,
    /// 输出文件已存在时跳过
    pub skip_existing: bool,
}

/// CMS 上传配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CmsConfig {
    pub url: String,
    pub token: String,
    pub api_base_path: String,
    /// 抽取完成后是否直接上传
    pub direct_upload: bool,
    /// 启动前是否探测连接与各端点
    pub test_endpoints: bool,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
    /// 组件 key → 复数形式的 API slug
    pub api_slugs: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pdf_dir: PathBuf::from("papers"),
            output_dir: PathBuf::from("skeo_output"),
            prompt_file: PathBuf::from("prompts/skeo_prompts.toml"),
            log_file: PathBuf::from("skeo_extraction.log"),
            verbose_logging: false,
            llm: LlmConfig::default(),
            document: DocumentConfig::default(),
            metadata: MetadataConfig::default(),
            extraction: ExtractionConfig::default(),
            processing: ProcessingConfig::default(),
            cms: CmsConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_endpoint: "http://localhost:8000".to_string(),
            api_base_path: "/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: 4096,
            temperature: 0.2,
            json_temperature: 0.1,
            retry_attempts: 3,
            timeout_seconds: 120,
            backoff_base_ms: 1000,
            validation_mode: ValidationMode::Strict,
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            backend: DocumentBackend::Lopdf,
            docling_url: "http://localhost:8003".to_string(),
            docling_timeout_seconds: 120,
            max_text_length: 150_000,
            infer_sections: true,
            abstract_prefill_limit: 1000,
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            serpapi_key: String::new(),
            endpoint: "https://serpapi.com/search".to_string(),
            hl: "en".to_string(),
            num: 10,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 30,
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            components: ComponentKind::ALL.iter().map(|k| k.key().to_string()).collect(),
            confidence_default: 0.7,
            section_max_chars: 10_000,
            total_max_chars: 30_000,
        }
    }
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            fail_fast: false,
            skip_existing: true,
        }
    }
}

impl Default for CmsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:1337".to_string(),
            token: String::new(),
            api_base_path: "/api".to_string(),
            direct_upload: false,
            test_endpoints: true,
            retry_attempts: 3,
            retry_delay_ms: 2000,
            timeout_seconds: 60,
            api_slugs: default_api_slugs(),
        }
    }
}

/// 默认的 CMS slug 表
pub fn default_api_slugs() -> BTreeMap<String, String> {
    let mut slugs = BTreeMap::new();
    slugs.insert(
        PAPER_KEY.to_string(),
        "sciknow-25x1-scientific-papers".to_string(),
    );
    for kind in ComponentKind::ALL {
        slugs.insert(kind.key().to_string(), kind.default_slug().to_string());
    }
    slugs
}

impl Config {
    /// 加载配置：默认值 → 参数文件 → 环境变量
    ///
    /// # 参数
    /// - `params_file`: 可选的 TOML 参数文件
    pub fn load(params_file: Option<&Path>) -> AppResult<Self> {
        let mut config = match params_file {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    /// 从 TOML 参数文件加载，缺失的字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| FileError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content, path)
    }

    /// 解析 TOML 文本
    pub fn from_toml_str(content: &str, origin: &Path) -> AppResult<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|source| ConfigError::ParamsParseFailed {
                path: origin.to_path_buf(),
                source,
            })?;

        // 部分 slug 表不应覆盖其余默认 slug
        for (key, slug) in default_api_slugs() {
            config.cms.api_slugs.entry(key).or_insert(slug);
        }

        debug!("已加载参数文件: {}", origin.display());
        Ok(config)
    }

    /// 用环境变量覆盖配置
    pub fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(v) = std::env::var("LLM_API_KEY") {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_API_ENDPOINT") {
            self.llm.api_endpoint = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("SERPAPI_KEY") {
            self.metadata.serpapi_key = v;
        }
        if let Ok(v) = std::env::var("STRAPI_URL") {
            self.cms.url = v;
        }
        if let Ok(v) = std::env::var("STRAPI_TOKEN") {
            self.cms.token = v;
        }
        self.processing.max_workers = env_or("MAX_WORKERS", self.processing.max_workers)?;
        self.llm.timeout_seconds = env_or("LLM_TIMEOUT_SECONDS", self.llm.timeout_seconds)?;
        self.verbose_logging = env_or("VERBOSE_LOGGING", self.verbose_logging)?;
        Ok(())
    }

    /// 校验配置的一致性
    pub fn validate(&self) -> AppResult<()> {
        if self.processing.max_workers == 0 {
            return Err(AppError::invalid_config(
                "processing.max_workers",
                "必须大于 0",
            ));
        }
        if self.llm.retry_attempts == 0 {
            return Err(AppError::invalid_config("llm.retry_attempts", "必须大于 0"));
        }
        if !(0.0..=1.0).contains(&self.extraction.confidence_default) {
            return Err(AppError::invalid_config(
                "extraction.confidence_default",
                "必须位于 [0, 1] 区间",
            ));
        }
        for key in &self.extraction.components {
            if ComponentKind::from_key(key).is_none() {
                return Err(AppError::invalid_config(
                    "extraction.components",
                    format!("未知组件: {}", key),
                ));
            }
        }
        if self.cms.direct_upload && self.cms.token.is_empty() {
            return Err(AppError::invalid_config(
                "cms.token",
                "启用直接上传时必须提供令牌",
            ));
        }
        Ok(())
    }

    /// 配置中启用的组件（保持配置顺序，去重）
    pub fn enabled_components(&self) -> Vec<ComponentKind> {
        let mut kinds = Vec::new();
        for key in &self.extraction.components {
            if let Some(kind) = ComponentKind::from_key(key) {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }
        kinds
    }

    /// 查询某个 key 对应的 slug
    pub fn slug_for(&self, key: &str) -> Option<&str> {
        self.cms.api_slugs.get(key).map(String::as_str)
    }

    /// 完整的 LLM API 基础地址
    pub fn llm_api_base(&self) -> String {
        join_url(&self.llm.api_endpoint, &self.llm.api_base_path)
    }

    /// 完整的 CMS API 基础地址
    pub fn cms_api_base(&self) -> String {
        join_url(&self.cms.url, &self.cms.api_base_path)
    }
}

/// 拼接地址，避免出现重复或缺失的 `/`
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

fn env_or<T: FromStr>(var_name: &str, current: T) -> AppResult<T> {
    match std::env::var(var_name) {
        Ok(value) => value.parse().map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }
            .into()
        }),
        Err(_) => Ok(current),
    }
}
