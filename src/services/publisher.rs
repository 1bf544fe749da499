//! 发布服务 - 业务能力层
//!
//! 把链接好的实体图按依赖顺序上传到 CMS：
//! - 论文最先，组件按 [`ComponentKind::upload_tier`] 分层，关系目标总在引用方之前上传
//! - 内部 ID 不进入请求体，只作为追踪字段
//! - 关系字段通过"内部 ID → 远端 ID"表解析，解析不到的字段直接省略
//! - 单条记录失败只记入汇总，不中断整个发布

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clients::CmsTransport;
use crate::config::{CmsConfig, PAPER_KEY};
use crate::models::{ComponentKind, EntityGraph};

/// 只保存在本地结果文件中的字段
const LOCAL_ONLY_FIELDS: &[&str] = &["sourcePath"];

/// 待解析的关系引用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationRef {
    One(String),
    Many(Vec<String>),
}

/// 上传记录
#[derive(Debug, Clone)]
pub struct UploadRecord {
    /// 内部 ID（不进入请求体）
    pub internal_id: String,
    /// 组件 key 或论文 key
    pub key: String,
    pub slug: String,
    pub tier: u8,
    /// 去掉关系与空值后的字段
    pub fields: Map<String, Value>,
    /// 关系字段名 → 内部 ID
    pub relations: Vec<(String, RelationRef)>,
}

/// 发布汇总
#[derive(Debug, Clone, Default)]
pub struct PublishSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// 因目标未上传而省略的关系数量
    pub dropped_relations: usize,
    pub errors: Vec<String>,
    /// 内部 ID → 远端 ID
    pub created_ids: BTreeMap<String, Value>,
}

impl PublishSummary {
    pub fn is_complete(&self) -> bool {
        self.failed == 0 && self.errors.is_empty()
    }
}

/// 递归删除对象和数组中的 null
pub fn strip_nulls(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_nulls(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_nulls)
                .collect(),
        ),
        other => other,
    }
}

/// 取出关系字段的内部 ID
fn take_relation(fields: &mut Map<String, Value>, field: &str) -> Option<RelationRef> {
    match fields.remove(field)? {
        Value::String(id) if !id.is_empty() => Some(RelationRef::One(id)),
        Value::Array(items) => {
            let ids: Vec<String> = items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .filter(|id| !id.is_empty())
                .collect();
            if ids.is_empty() {
                None
            } else {
                Some(RelationRef::Many(ids))
            }
        }
        _ => None,
    }
}

/// 把实体图转换为按上传顺序排列的记录
///
/// # 参数
/// - `graph`: 已链接的实体图
/// - `slug_for`: key → CMS slug
pub fn build_upload_records<F>(graph: &EntityGraph, slug_for: F) -> Vec<UploadRecord>
where
    F: Fn(&str) -> String,
{
    let mut records = Vec::new();

    let mut paper_fields = match serde_json::to_value(&graph.paper) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    let paper_id = take_internal_id(&mut paper_fields);
    for field in LOCAL_ONLY_FIELDS {
        paper_fields.remove(*field);
    }
    records.push(UploadRecord {
        internal_id: paper_id,
        key: PAPER_KEY.to_string(),
        slug: slug_for(PAPER_KEY),
        tier: 0,
        fields: strip_object(paper_fields),
        relations: Vec::new(),
    });

    for kind in ComponentKind::in_upload_order() {
        for component in graph.components(kind) {
            let mut fields = match component.to_value() {
                Value::Object(map) => map,
                _ => continue,
            };
            let internal_id = take_internal_id(&mut fields);

            let mut relations = Vec::new();
            let relation_fields =
                std::iter::once("paper").chain(kind.relations().iter().map(|r| r.field));
            for field in relation_fields {
                if let Some(reference) = take_relation(&mut fields, field) {
                    relations.push((field.to_string(), reference));
                }
            }

            records.push(UploadRecord {
                internal_id,
                key: kind.key().to_string(),
                slug: slug_for(kind.key()),
                tier: kind.upload_tier(),
                fields: strip_object(fields),
                relations,
            });
        }
    }

    records
}

fn take_internal_id(fields: &mut Map<String, Value>) -> String {
    match fields.remove("id") {
        Some(Value::String(id)) => id,
        _ => String::new(),
    }
}

fn strip_object(fields: Map<String, Value>) -> Map<String, Value> {
    match strip_nulls(Value::Object(fields)) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// 用 ID 表解析关系，得到请求体
///
/// # 返回
/// (请求体, 被省略的关系描述)
pub fn resolve_relations(
    record: &UploadRecord,
    id_map: &BTreeMap<String, Value>,
) -> (Map<String, Value>, Vec<String>) {
    let mut payload = record.fields.clone();
    let mut dropped = Vec::new();

    for (field, reference) in &record.relations {
        match reference {
            RelationRef::One(id) => match id_map.get(id) {
                Some(remote) => {
                    payload.insert(field.clone(), remote.clone());
                }
                None => dropped.push(format!("{} -> {}", field, id)),
            },
            RelationRef::Many(ids) => {
                let mut resolved = Vec::new();
                for id in ids {
                    match id_map.get(id) {
                        Some(remote) => resolved.push(remote.clone()),
                        None => dropped.push(format!("{} -> {}", field, id)),
                    }
                }
                if !resolved.is_empty() {
                    payload.insert(field.clone(), Value::Array(resolved));
                }
            }
        }
    }

    (payload, dropped)
}

/// 发布服务
///
/// 每次 [`publish`](Publisher::publish) 使用独立的 ID 表，不同论文之间不共享状态。
pub struct Publisher {
    transport: Arc<dyn CmsTransport>,
    slugs: BTreeMap<String, String>,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("slugs", &self.slugs)
            .field("retry_attempts", &self.retry_attempts)
            .field("retry_delay", &self.retry_delay)
            .finish_non_exhaustive()
    }
}

impl Publisher {
    pub fn new(transport: Arc<dyn CmsTransport>, config: &CmsConfig) -> Self {
        Self {
            transport,
            slugs: config.api_slugs.clone(),
            retry_attempts: config.retry_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
        }
    }

    /// key → slug，未配置时使用 key 本身
    pub fn slug_for(&self, key: &str) -> String {
        self.slugs
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// 按依赖顺序上传整张实体图
    pub async fn publish(&self, graph: &EntityGraph) -> PublishSummary {
        let records = build_upload_records(graph, |key| self.slug_for(key));
        let mut summary = PublishSummary::default();
        let mut id_map: BTreeMap<String, Value> = BTreeMap::new();
        let mut attempted: HashSet<String> = HashSet::new();

        info!("📤 开始上传: {} 条记录", records.len());

        for record in &records {
            if !record.internal_id.is_empty() && !attempted.insert(record.internal_id.clone()) {
                debug!("跳过重复记录: {} ({})", record.internal_id, record.key);
                continue;
            }
            summary.total += 1;

            let (payload, dropped) = resolve_relations(record, &id_map);
            for relation in &dropped {
                warn!(
                    "⚠️ {} {} 的关系未能解析，已省略: {}",
                    record.key, record.internal_id, relation
                );
            }
            summary.dropped_relations += dropped.len();

            match self.create_with_retry(&record.slug, &Value::Object(payload)).await {
                Ok(remote_id) => {
                    debug!("✓ {} {} → {}", record.key, record.internal_id, remote_id);
                    id_map.insert(record.internal_id.clone(), remote_id);
                    summary.succeeded += 1;
                }
                Err(e) => {
                    warn!("❌ 上传失败 {} {}: {}", record.key, record.internal_id, e);
                    summary.failed += 1;
                    summary
                        .errors
                        .push(format!("{} {}: {}", record.key, record.internal_id, e));
                }
            }
        }

        info!(
            "📤 上传完成: 成功 {}/{}，失败 {}，省略关系 {}",
            summary.succeeded, summary.total, summary.failed, summary.dropped_relations
        );
        summary.created_ids = id_map;
        summary
    }

    /// 固定间隔重试的单条上传
    async fn create_with_retry(&self, slug: &str, payload: &Value) -> anyhow::Result<Value> {
        let mut last_error = None;
        for attempt in 1..=self.retry_attempts {
            match self.transport.create(slug, payload).await {
                Ok(remote_id) => return Ok(remote_id),
                Err(e) => {
                    warn!(
                        "上传 {} 失败 (尝试 {}/{}): {}",
                        slug, attempt, self.retry_attempts, e
                    );
                    last_error = Some(e);
                    if attempt < self.retry_attempts {
                        sleep(self.retry_delay).await;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("上传 {} 未执行", slug)))
    }
}
