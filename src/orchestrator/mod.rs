//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量论文处理器
//! - 管理应用生命周期（初始化、预检、运行）
//! - 递归发现 PDF，跳过已有结果
//! - 控制并发数量（Semaphore）
//! - 快速失败与全局统计
//!
//! ### `paper_processor` - 单篇论文处理器
//! - 文档抽取、组件并发抽取、置信度、关系链接
//! - 写结果文件，按需上传
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PDF>)
//!     ↓
//! paper_processor (处理一篇论文的全部组件)
//!     ↓
//! workflow::ComponentFlow (处理单种组件)
//!     ↓
//! services (能力层：document / llm / prompt / linker / publisher)
//!     ↓
//! clients (远程接口：LLM / Scholar / CMS / Docling)
//! ```

pub mod batch_processor;
pub mod paper_processor;

// 重新导出主要类型
pub use batch_processor::{discover_pdfs, App, RunSummary};
pub use paper_processor::{PaperPipeline, PaperReport};
