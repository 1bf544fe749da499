//! 论文处理上下文
//!
//! 封装"我正在处理第几篇论文、哪个文件"这一信息

use std::fmt::Display;
use std::path::Path;

/// 论文处理上下文
#[derive(Debug, Clone)]
pub struct PaperCtx {
    /// 论文序号（从 1 开始，仅用于日志显示）
    pub paper_index: usize,

    /// 本次运行的论文总数
    pub total_papers: usize,

    /// PDF 文件名
    pub file_name: String,
}

impl PaperCtx {
    /// 创建新的论文上下文
    pub fn new(paper_index: usize, total_papers: usize, pdf_path: &Path) -> Self {
        let file_name = pdf_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| pdf_path.display().to_string());
        Self {
            paper_index,
            total_papers,
            file_name,
        }
    }
}

impl Display for PaperCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[论文 {}/{} {}]",
            self.paper_index, self.total_papers, self.file_name
        )
    }
}
