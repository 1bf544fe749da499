//! 流程层（Workflow Layer）
//!
//! ## 模块划分
//!
//! ### `paper_ctx` - 论文处理上下文
//! - 论文序号、总数、文件名，用于日志前缀
//!
//! ### `component_flow` - 单个组件的抽取流程
//! - 提示词拼装 → 结构化抽取 → 逐条补全与校验
//! - 失败只影响当前组件

pub mod component_flow;
pub mod paper_ctx;

pub use component_flow::{materialize, new_internal_id, ComponentFlow};
pub use paper_ctx::PaperCtx;
