//! # SKEO Extractor
//!
//! 从科研论文 PDF 中抽取结构化知识组件，并按依赖顺序发布到 CMS
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 远程接口层（Clients）
//! - `clients/` - 只负责一次请求与响应解析，不做重试
//! - `LlmClient` - OpenAI 兼容的对话补全
//! - `ScholarClient` - 学术元数据检索
//! - `CmsClient` - CMS 实体创建与预检
//! - `DoclingClient` - 文档转换服务
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理一篇论文
//! - `LlmService` - 带 schema 校验的重试抽取
//! - `DocumentService` - PDF 转换、标题校验、章节切分与补全
//! - `PromptComposer` - 按组件拼装提示词
//! - `link_relationships` - 首实例关系链接
//! - `Publisher` - 按依赖顺序上传
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一种组件"的完整抽取流程
//! - `PaperCtx` - 上下文封装（论文序号 + 文件名）
//! - `ComponentFlow` - 提示词 → 抽取 → 补全与校验
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理器，管理并发与统计
//! - `orchestrator/paper_processor` - 单篇论文处理器，并发抽取全部组件

pub mod cli;
pub mod clients;
pub mod config;
pub mod error;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

#[cfg(test)]
pub(crate) mod test_support;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{ComponentKind, EntityGraph, KnowledgeComponent, Paper};
pub use orchestrator::{App, PaperPipeline, PaperReport, RunSummary};
