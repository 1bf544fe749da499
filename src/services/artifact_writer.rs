//! 结果文件写入
//!
//! 每篇论文一个 JSON 文件，目录结构与输入目录一致：
//! `{output_dir}/{相对目录}/{清洗后的文件名}_extraction.json`

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{AppError, AppResult, FileError};
use crate::models::EntityGraph;
use crate::services::document_service::relative_to;
use crate::utils::text::sanitize_file_stem;

const ARTIFACT_SUFFIX: &str = "_extraction.json";

/// 结果文件写入器
#[derive(Debug, Clone)]
pub struct ArtifactWriter {
    output_dir: PathBuf,
    pdf_root: PathBuf,
}

impl ArtifactWriter {
    /// # 参数
    /// - `output_dir`: 输出根目录
    /// - `pdf_root`: 输入 PDF 根目录，用于计算相对路径
    pub fn new(output_dir: impl Into<PathBuf>, pdf_root: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            pdf_root: pdf_root.into(),
        }
    }

    /// 由输入路径确定结果文件路径
    pub fn artifact_path(&self, pdf_path: &Path) -> PathBuf {
        let relative = relative_to(pdf_path, &self.pdf_root);
        let stem = relative
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = format!("{}{}", sanitize_file_stem(&stem), ARTIFACT_SUFFIX);

        match relative.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => self.output_dir.join(dir).join(file_name),
            _ => self.output_dir.join(file_name),
        }
    }

    /// 结果文件是否已存在
    pub fn exists(&self, pdf_path: &Path) -> bool {
        self.artifact_path(pdf_path).is_file()
    }

    /// 写入实体图
    ///
    /// # 参数
    /// - `pdf_path`: 输入 PDF 路径
    /// - `graph`: 已链接的实体图
    /// - `slug_for`: key → CMS slug
    ///
    /// # 返回
    /// 写入的文件路径
    pub async fn write<F>(&self, pdf_path: &Path, graph: &EntityGraph, slug_for: F) -> AppResult<PathBuf>
    where
        F: Fn(&str) -> String,
    {
        let path = self.artifact_path(pdf_path);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| FileError::WriteFailed {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let content = serde_json::to_string_pretty(&graph.to_slug_json(slug_for))
            .map_err(|e| AppError::file_write_failed(&path, std::io::Error::other(e)))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| FileError::WriteFailed {
                path: path.clone(),
                source,
            })?;

        info!("💾 结果已保存: {}", path.display());
        Ok(path)
    }
}
