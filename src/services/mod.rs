pub mod artifact_writer;
pub mod document_service;
pub mod linker;
pub mod llm_service;
pub mod metadata_service;
pub mod prompt_service;
pub mod publisher;
pub mod title_resolver;

pub use artifact_writer::ArtifactWriter;
pub use document_service::{
    converter_for, ConvertedDocument, DocumentConverter, DocumentService, ExtractedDocument,
};
pub use linker::link_relationships;
pub use llm_service::{ExtractOutcome, LlmService};
pub use metadata_service::MetadataService;
pub use prompt_service::{PromptBook, PromptComposer};
pub use publisher::{PublishSummary, Publisher};
pub use title_resolver::{ResolvedTitle, TitleSource};
