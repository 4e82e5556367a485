// Public modules
pub mod chat_message;
pub mod completion;
pub mod normalized;
pub mod request;

// Re-exports
pub use chat_message::{ChatMessage, ChatRole, messages_from_json};
pub use completion::{ChatCompletion, CompletionChoice, CompletionMessage, CompletionUsage};
pub use normalized::{
    Choice, Citation, CitationEntry, Context, Intent, NormalizedResponse, ResponseMessage, Usage,
};
pub use request::{
    AzureSearchParameters, ChatCompletionRequest, DataSource, EmbeddingDependency, FieldsMapping,
    QueryType, SearchAuthentication,
};
