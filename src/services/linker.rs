//! 关系链接
//!
//! 粗略的启发式规则：每种锚点类型的第一个实例被当作唯一目标，
//! 连接到所有声明了指向该类型关系的组件上。
//! 这不是语义匹配，同一锚点类型有多个实例时不做区分。
//! 多值关系（潜在应用 → 方法框架）收集目标类型的全部实例。
//!
//! 规则来自 [`ComponentKind::relations`] 关系表。

use tracing::debug;

use crate::models::{Cardinality, ComponentKind, EntityGraph, LinkRule, RelationSlot};

/// 按关系表填充实体图中的关系字段
///
/// # 返回
/// 写入的关系数量
pub fn link_relationships(graph: &mut EntityGraph) -> usize {
    let mut linked = 0;

    for kind in ComponentKind::ALL {
        for relation in kind.relations() {
            let targets = match relation.rule {
                LinkRule::FirstInstance => graph.first_id(relation.target).into_iter().collect(),
                LinkRule::AllInstances => graph.all_ids(relation.target),
            };
            if targets.is_empty() {
                continue;
            }

            for component in graph.components_mut(kind) {
                match (component.relation_slot(relation.field), relation.cardinality) {
                    (Some(RelationSlot::One(slot)), Cardinality::One) => {
                        *slot = targets.first().cloned();
                        linked += 1;
                    }
                    (Some(RelationSlot::Many(slot)), Cardinality::Many) => {
                        for id in &targets {
                            if !slot.contains(id) {
                                slot.push(id.clone());
                                linked += 1;
                            }
                        }
                    }
                    _ => debug!("{}.{} 没有对应的关系字段", kind, relation.field),
                }
            }
        }
    }

    debug!("关系链接完成，共 {} 条", linked);
    linked
}
