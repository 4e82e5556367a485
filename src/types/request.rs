use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// Body of a retrieval-augmented chat-completion request.
///
/// `data_sources` is the extension block that asks the service to ground the
/// answer in a search index; the rest are the standard chat-completion fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatCompletionRequest {
    /// Chat deployment to route the request to.
    pub model: String,

    /// Conversation turns, in order.
    pub messages: Vec<ChatMessage>,

    /// Sampling temperature.
    pub temperature: f64,

    /// Retrieval data sources.
    pub data_sources: Vec<DataSource>,
}

/// A retrieval data source attached to a chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DataSource {
    /// An Azure AI Search index.
    AzureSearch {
        /// Index connection and query parameters.
        parameters: AzureSearchParameters,
    },
}

impl DataSource {
    /// The search parameters of this data source.
    pub fn parameters(&self) -> &AzureSearchParameters {
        match self {
            DataSource::AzureSearch { parameters } => parameters,
        }
    }
}

/// Parameters of an Azure AI Search data source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AzureSearchParameters {
    pub endpoint: String,
    pub index_name: String,
    pub top_n_documents: u32,
    pub role_information: String,
    pub fields_mapping: FieldsMapping,
    pub embedding_dependency: EmbeddingDependency,
    pub query_type: QueryType,
    pub semantic_configuration: String,
    pub authentication: SearchAuthentication,

    /// OData filter applied to the search; absent rather than empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

/// Index fields that carry citation file paths and URLs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldsMapping {
    pub filepath_field: String,
    pub url_field: String,
}

/// How the service vectorizes the query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EmbeddingDependency {
    /// An embedding model deployed next to the chat deployment.
    DeploymentName {
        /// Name of the embedding deployment.
        deployment_name: String,
    },
}

/// Search query mode.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Simple,
    Semantic,
    Vector,
    VectorSimpleHybrid,
    VectorSemanticHybrid,
}

/// How the chat service authenticates against the search index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchAuthentication {
    /// The chat service's own managed identity.
    SystemAssignedManagedIdentity,

    /// A search admin or query key.
    ApiKey {
        /// The key.
        api_key: String,
    },
}

impl SearchAuthentication {
    /// Select key authentication for a non-empty key and managed identity
    /// otherwise.
    pub fn from_key(key: &str) -> Self {
        if key.is_empty() {
            SearchAuthentication::SystemAssignedManagedIdentity
        } else {
            SearchAuthentication::ApiKey {
                api_key: key.to_string(),
            }
        }
    }

    /// Short label of the authentication mode, safe to log.
    pub fn kind(&self) -> &'static str {
        match self {
            SearchAuthentication::SystemAssignedManagedIdentity => {
                "system_assigned_managed_identity"
            }
            SearchAuthentication::ApiKey { .. } => "api_key",
        }
    }
}
