//! 单篇论文的实体图

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::models::component::{ComponentKind, KnowledgeComponent};
use crate::models::paper::Paper;

/// 单个组件类型的抽取结果
#[derive(Debug, Clone)]
pub enum ComponentOutcome {
    /// 抽取成功（可能为空列表，表示没有找到）
    Extracted(Vec<KnowledgeComponent>),
    /// 抽取失败
    Failed { reason: String },
}

/// 论文及其全部知识组件
#[derive(Debug, Clone)]
pub struct EntityGraph {
    pub paper: Paper,
    components: BTreeMap<ComponentKind, Vec<KnowledgeComponent>>,
    failed: Vec<ComponentKind>,
}

impl EntityGraph {
    pub fn new(paper: Paper) -> Self {
        Self {
            paper,
            components: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    /// 记录一个组件类型的抽取结果
    pub fn record(&mut self, kind: ComponentKind, outcome: ComponentOutcome) {
        match outcome {
            ComponentOutcome::Extracted(items) => {
                self.components.entry(kind).or_default().extend(items);
            }
            ComponentOutcome::Failed { .. } => {
                if !self.failed.contains(&kind) {
                    self.failed.push(kind);
                }
            }
        }
    }

    pub fn components(&self, kind: ComponentKind) -> &[KnowledgeComponent] {
        self.components.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn components_mut(&mut self, kind: ComponentKind) -> &mut [KnowledgeComponent] {
        self.components
            .get_mut(&kind)
            .map(Vec::as_mut_slice)
            .unwrap_or(&mut [])
    }

    /// 抽取失败的组件类型
    pub fn failed_kinds(&self) -> &[ComponentKind] {
        &self.failed
    }

    /// 某类型第一个实例的 ID
    pub fn first_id(&self, kind: ComponentKind) -> Option<String> {
        self.components(kind).first().map(|c| c.id().to_string())
    }

    /// 某类型全部实例的 ID
    pub fn all_ids(&self, kind: ComponentKind) -> Vec<String> {
        self.components(kind)
            .iter()
            .map(|c| c.id().to_string())
            .collect()
    }

    pub fn total_components(&self) -> usize {
        self.components.values().map(Vec::len).sum()
    }

    /// 各类型的组件数量（只含有结果的类型）
    pub fn counts(&self) -> BTreeMap<ComponentKind, usize> {
        self.components
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(kind, items)| (*kind, items.len()))
            .collect()
    }

    /// 全部组件
    pub fn iter(&self) -> impl Iterator<Item = &KnowledgeComponent> {
        self.components.values().flatten()
    }

    /// 计算并写入论文置信度
    ///
    /// 取全部组件置信度的平均值（缺失时用 `default_confidence`），保留 4 位小数；
    /// 没有任何组件时保持未设置。
    pub fn apply_confidence(&mut self, default_confidence: f64) -> Option<f64> {
        let scores: Vec<f64> = self
            .iter()
            .map(|c| c.confidence().unwrap_or(default_confidence))
            .collect();
        if scores.is_empty() {
            return None;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let rounded = (mean * 10_000.0).round() / 10_000.0;
        self.paper.extraction_confidence_score = Some(rounded);
        Some(rounded)
    }

    /// 以 slug 为键的 JSON：论文在前，组件列表按上传顺序排列
    pub fn to_slug_json<F>(&self, slug_for: F) -> Value
    where
        F: Fn(&str) -> String,
    {
        let mut root = Map::new();
        let paper = serde_json::to_value(&self.paper).unwrap_or(Value::Null);
        root.insert(slug_for(crate::config::PAPER_KEY), paper);

        for kind in ComponentKind::in_upload_order() {
            let items = self.components(kind);
            if items.is_empty() {
                continue;
            }
            let values = items.iter().map(KnowledgeComponent::to_value).collect();
            root.insert(slug_for(kind.key()), Value::Array(values));
        }
        Value::Object(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limitation(id: &str, confidence: Option<f64>) -> KnowledgeComponent {
        let mut value = json!({"limitationDescription": "x"});
        if let Some(c) = confidence {
            value["extractionConfidence"] = json!(c);
        }
        let mut component = KnowledgeComponent::from_value(ComponentKind::Limitation, value).unwrap();
        component.base_mut().id = id.to_string();
        component
    }

    #[test]
    fn test_confidence_mean_rounded() {
        let mut graph = EntityGraph::new(Paper::default());
        graph.record(
            ComponentKind::Limitation,
            ComponentOutcome::Extracted(vec![
                limitation("a", Some(0.6)),
                limitation("b", Some(0.8)),
                limitation("c", Some(1.0)),
            ]),
        );
        assert_eq!(graph.apply_confidence(0.7), Some(0.8));
        assert_eq!(graph.paper.extraction_confidence_score, Some(0.8));
    }

    #[test]
    fn test_confidence_uses_default_for_missing() {
        let mut graph = EntityGraph::new(Paper::default());
        graph.record(
            ComponentKind::Limitation,
            ComponentOutcome::Extracted(vec![limitation("a", None), limitation("b", Some(0.2))]),
        );
        assert_eq!(graph.apply_confidence(0.7), Some(0.45));
    }

    #[test]
    fn test_confidence_unset_without_components() {
        let mut graph = EntityGraph::new(Paper::default());
        graph.record(
            ComponentKind::Limitation,
            ComponentOutcome::Failed {
                reason: "timeout".to_string(),
            },
        );
        graph.record(ComponentKind::ResearchProblem, ComponentOutcome::Extracted(vec![]));
        assert_eq!(graph.apply_confidence(0.7), None);
        assert_eq!(graph.paper.extraction_confidence_score, None);
        assert_eq!(graph.failed_kinds(), &[ComponentKind::Limitation]);
    }

    #[test]
    fn test_slug_json_paper_first() {
        let mut graph = EntityGraph::new(Paper {
            id: "p".to_string(),
            title: "T".to_string(),
            ..Default::default()
        });
        graph.record(
            ComponentKind::Limitation,
            ComponentOutcome::Extracted(vec![limitation("a", None)]),
        );
        let value = graph.to_slug_json(|key| format!("slug-{}", key));
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys, vec!["slug-scientific_paper", "slug-limitation"]);
        assert_eq!(value["slug-limitation"][0]["id"], json!("a"));
    }
}
