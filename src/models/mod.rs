pub mod component;
pub mod graph;
pub mod paper;
pub mod schema;
pub mod section;

pub use component::{
    Cardinality, ComponentKind, KnowledgeComponent, LinkRule, RelationSlot, RelationSpec,
};
pub use graph::{ComponentOutcome, EntityGraph};
pub use paper::{Author, Paper};
pub use schema::{RecordSchema, ResponseSchema, SectionInference, ValidateRecord};
pub use section::{SectionMap, SectionName};
