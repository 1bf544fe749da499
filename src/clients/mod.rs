pub mod cms_client;
pub mod docling_client;
pub mod llm_client;
pub mod scholar_client;

pub use cms_client::{CmsClient, CmsTransport};
pub use docling_client::DoclingClient;
pub use llm_client::{CompletionBackend, LlmClient};
pub use scholar_client::{MetadataSearch, ScholarClient, ScholarMetadata};
