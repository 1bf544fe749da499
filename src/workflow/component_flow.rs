//! 组件抽取流程 - 流程层
//!
//! 核心职责：定义"一种知识组件"的完整抽取流程
//!
//! 流程顺序：
//! 1. 拼装提示词（模板 + 章节上下文）
//! 2. 结构化抽取（带 schema 校验的重试）
//! 3. 逐条补全内部字段（id / paper / 置信度）并再次校验
//!
//! 抽取失败返回 [`ComponentOutcome::Failed`]，不影响同一论文的其他组件。

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{ComponentKind, ComponentOutcome, KnowledgeComponent, SectionMap};
use crate::services::{ExtractOutcome, LlmService, PromptComposer};
use crate::workflow::paper_ctx::PaperCtx;

/// 运行内 ID（32 位十六进制）
pub fn new_internal_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// 组件抽取流程
///
/// - 不持有论文数据，每次调用传入
/// - 只依赖业务能力（services）
#[derive(Clone)]
pub struct ComponentFlow {
    llm: Arc<LlmService>,
    composer: Arc<PromptComposer>,
    confidence_default: f64,
}

impl ComponentFlow {
    pub fn new(llm: Arc<LlmService>, composer: Arc<PromptComposer>, confidence_default: f64) -> Self {
        Self {
            llm,
            composer,
            confidence_default,
        }
    }

    /// 抽取一种组件
    ///
    /// # 参数
    /// - `kind`: 组件类型
    /// - `paper_id`: 论文的运行内 ID
    /// - `title`: 论文标题
    /// - `sections`: 章节表
    /// - `ctx`: 论文上下文（日志用）
    pub async fn run(
        &self,
        kind: ComponentKind,
        paper_id: &str,
        title: &str,
        sections: &SectionMap,
        ctx: &PaperCtx,
    ) -> ComponentOutcome {
        let prompt = self.composer.compose(kind, title, sections);
        let schema = kind.response_schema();

        let value = match self.llm.extract_json(&prompt, schema.as_ref()).await {
            ExtractOutcome::Accepted { value, attempts } => {
                if attempts > 1 {
                    info!("{} {} 第 {} 次尝试通过校验", ctx, kind.label(), attempts);
                }
                value
            }
            ExtractOutcome::Unvalidated { value, error } => {
                warn!("{} {} 未通过校验，逐条过滤: {}", ctx, kind.label(), error);
                value
            }
            ExtractOutcome::Failed {
                attempts,
                last_error,
            } => {
                warn!(
                    "{} ❌ {} 抽取失败（{} 次尝试）: {}",
                    ctx,
                    kind.label(),
                    attempts,
                    last_error
                );
                return ComponentOutcome::Failed { reason: last_error };
            }
        };

        let items = materialize(kind, value, paper_id, self.confidence_default);
        info!("{} ✓ {}: {} 条", ctx, kind.label(), items.len());
        ComponentOutcome::Extracted(items)
    }
}

/// 把 LLM 返回的 JSON 转换为组件列表
///
/// 接受数组或单个对象。每条记录分配新 ID、写入论文 ID 和默认置信度，
/// 清空 LLM 给出的关系字段，再次校验，不合格的记录丢弃。
pub fn materialize(
    kind: ComponentKind,
    value: Value,
    paper_id: &str,
    confidence_default: f64,
) -> Vec<KnowledgeComponent> {
    let records = match value {
        Value::Array(items) => items,
        Value::Object(_) => vec![value],
        Value::Null => Vec::new(),
        other => {
            warn!("{} 的响应既不是对象也不是数组: {}", kind.key(), other);
            Vec::new()
        }
    };

    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let Value::Object(mut fields) = record else {
                warn!("{} 第 {} 条不是 JSON 对象，已丢弃", kind.key(), index);
                return None;
            };
            prepare_fields(kind, &mut fields, paper_id, confidence_default);

            match KnowledgeComponent::from_value(kind, Value::Object(fields)) {
                Ok(component) => Some(component),
                Err(e) => {
                    warn!("{} 第 {} 条校验失败，已丢弃: {}", kind.key(), index, e);
                    None
                }
            }
        })
        .collect()
}

fn prepare_fields(
    kind: ComponentKind,
    fields: &mut Map<String, Value>,
    paper_id: &str,
    confidence_default: f64,
) {
    fields.insert("id".to_string(), Value::String(new_internal_id()));
    fields.insert("paper".to_string(), Value::String(paper_id.to_string()));
    for relation in kind.relations() {
        fields.remove(relation.field);
    }
    let missing_confidence = fields
        .get("extractionConfidence")
        .map_or(true, Value::is_null);
    if missing_confidence {
        fields.insert(
            "extractionConfidence".to_string(),
            Value::from(confidence_default),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExtractionConfig, LlmConfig};
    use crate::models::SectionName;
    use crate::services::PromptBook;
    use crate::test_support::ScriptedBackend;
    use serde_json::json;
    use std::path::Path;

    #[test]
    fn test_materialize_assigns_internal_fields() {
        let items = materialize(
            ComponentKind::Limitation,
            json!([
                {"limitationDescription": "small sample", "extractionConfidence": 0.9},
                {"limitationDescription": "one site", "limitedFramework": "bogus"}
            ]),
            "paper-1",
            0.7,
        );
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].confidence(), Some(0.9));
        assert_eq!(items[1].confidence(), Some(0.7));
        for item in &items {
            assert_eq!(item.id().len(), 32);
            assert_eq!(item.base().paper, "paper-1");
        }
        assert_ne!(items[0].id(), items[1].id());
        assert_eq!(items[1].to_value()["limitedFramework"], Value::Null);
    }

    #[test]
    fn test_materialize_single_object_and_invalid_items() {
        let items = materialize(
            ComponentKind::ResearchProblem,
            json!({"problemStatement": "dry soil"}),
            "p",
            0.7,
        );
        assert_eq!(items.len(), 1);

        let items = materialize(
            ComponentKind::ResearchProblem,
            json!([
                {"problemStatement": "kept"},
                {"noStatement": true},
                "text",
                {"problemStatement": "bad confidence", "extractionConfidence": 1.5}
            ]),
            "p",
            0.7,
        );
        assert_eq!(items.len(), 1);
        assert!(materialize(ComponentKind::ResearchProblem, json!("x"), "p", 0.7).is_empty());
    }

    #[test]
    fn test_materialize_keeps_items_with_null_lists() {
        let contexts = materialize(
            ComponentKind::ResearchContext,
            json!([{"discipline": "Agronomy", "fundingSources": null}]),
            "p",
            0.7,
        );
        assert_eq!(contexts.len(), 1);

        let frameworks = materialize(
            ComponentKind::MethodologicalFramework,
            json!([{"name": "Field trial", "variables": null, "procedures": null}]),
            "p",
            0.7,
        );
        assert_eq!(frameworks.len(), 1);
        assert_eq!(frameworks[0].to_value()["variables"], json!([]));
    }

    fn flow(responses: Vec<Result<String, String>>) -> ComponentFlow {
        let backend = ScriptedBackend::new(responses);
        let llm = LlmService::new(
            backend,
            &LlmConfig {
                retry_attempts: 2,
                backoff_base_ms: 0,
                ..LlmConfig::default()
            },
        );
        let composer = PromptComposer::new(PromptBook::default(), &ExtractionConfig::default());
        ComponentFlow::new(Arc::new(llm), Arc::new(composer), 0.7)
    }

    fn sections() -> SectionMap {
        let mut map = SectionMap::new();
        map.set(SectionName::Methodology, "We used a microscope.");
        map
    }

    #[tokio::test]
    async fn test_run_extracts_components() {
        let flow = flow(vec![Ok(
            "```json\n[{\"itemName\": \"microscope\"}]\n```".to_string()
        )]);
        let ctx = PaperCtx::new(1, 1, Path::new("a.pdf"));
        let outcome = flow
            .run(ComponentKind::MaterialTool, "p1", "Deep Soil", &sections(), &ctx)
            .await;
        match outcome {
            ComponentOutcome::Extracted(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0].to_value()["itemName"], json!("microscope"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_reports_failure_distinctly() {
        let failing = flow(vec![Err("down".to_string()), Err("down".to_string())]);
        let ctx = PaperCtx::new(1, 1, Path::new("a.pdf"));
        let outcome = failing
            .run(ComponentKind::MaterialTool, "p1", "Deep Soil", &sections(), &ctx)
            .await;
        assert!(matches!(outcome, ComponentOutcome::Failed { .. }));

        let empty = flow(vec![Ok("[]".to_string())]);
        let outcome = empty
            .run(ComponentKind::MaterialTool, "p1", "Deep Soil", &sections(), &ctx)
            .await;
        assert!(matches!(outcome, ComponentOutcome::Extracted(ref items) if items.is_empty()));
    }
}
