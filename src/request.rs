//! Build retrieval-augmented chat-completion requests.

use crate::config::ClientConfig;
use crate::types::{
    AzureSearchParameters, ChatCompletionRequest, ChatMessage, DataSource, EmbeddingDependency,
    FieldsMapping, QueryType, SearchAuthentication,
};

/// Number of documents retrieved per turn.
pub const TOP_N_DOCUMENTS: u32 = 5;
/// Sampling temperature of every request.
pub const TEMPERATURE: f64 = 0.2;
/// Instruction given to the model about retrieved documents.
pub const ROLE_INFORMATION: &str = "You must generate citation based on the retrieved information.";
/// Index field holding the citation file path.
pub const FILEPATH_FIELD: &str = "chunk_id";
/// Index field holding the citation URL.
pub const URL_FIELD: &str = "metadata_storage_path";

/// Build the search data source for a configuration and filter.
///
/// An empty `filter` is omitted from the data source.
pub fn build_data_source(config: &ClientConfig, filter: &str) -> DataSource {
    DataSource::AzureSearch {
        parameters: AzureSearchParameters {
            endpoint: config.search_endpoint().to_string(),
            index_name: config.search_index_name().to_string(),
            top_n_documents: TOP_N_DOCUMENTS,
            role_information: ROLE_INFORMATION.to_string(),
            fields_mapping: FieldsMapping {
                filepath_field: FILEPATH_FIELD.to_string(),
                url_field: URL_FIELD.to_string(),
            },
            embedding_dependency: EmbeddingDependency::DeploymentName {
                deployment_name: config.embedding_deployment().to_string(),
            },
            query_type: QueryType::VectorSemanticHybrid,
            semantic_configuration: config.semantic_configuration().to_string(),
            authentication: SearchAuthentication::from_key(config.search_api_key()),
            filter: (!filter.is_empty()).then(|| filter.to_string()),
        },
    }
}

/// Build the request body for one conversation.
pub fn build_request(
    config: &ClientConfig,
    filter: &str,
    messages: &[ChatMessage],
) -> ChatCompletionRequest {
    ChatCompletionRequest {
        model: config.chat_deployment().to_string(),
        messages: messages.to_vec(),
        temperature: TEMPERATURE,
        data_sources: vec![build_data_source(config, filter)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AZURESEARCH_API_BASE, ClientOptions};
    use serde_json::{json, to_value};
    use std::collections::HashMap;

    fn config(search_api_key: &str) -> ClientConfig {
        let env = HashMap::from([(
            AZURESEARCH_API_BASE.to_string(),
            "https://search.example.net".to_string(),
        )]);
        ClientConfig::resolve(
            &ClientOptions::new().with_search_api_key(search_api_key),
            &env,
        )
        .unwrap()
    }

    #[test]
    fn data_source_wire_shape() {
        let source = build_data_source(&config(""), "");
        assert_eq!(
            to_value(&source).unwrap(),
            json!({
                "type": "azure_search",
                "parameters": {
                    "endpoint": "https://search.example.net",
                    "index_name": "documents",
                    "top_n_documents": 5,
                    "role_information": "You must generate citation based on the retrieved information.",
                    "fields_mapping": {
                        "filepath_field": "chunk_id",
                        "url_field": "metadata_storage_path"
                    },
                    "embedding_dependency": {
                        "type": "deployment_name",
                        "deployment_name": "text-embedding-ada-002"
                    },
                    "query_type": "vector_semantic_hybrid",
                    "semantic_configuration": "documents-semantic-configuration",
                    "authentication": {"type": "system_assigned_managed_identity"}
                }
            })
        );
    }

    #[test]
    fn api_key_authentication() {
        let source = build_data_source(&config("search-key"), "");
        assert_eq!(
            source.parameters().authentication,
            SearchAuthentication::ApiKey {
                api_key: "search-key".to_string()
            }
        );
        assert_eq!(
            to_value(&source).unwrap()["parameters"]["authentication"],
            json!({"type": "api_key", "api_key": "search-key"})
        );
    }

    #[test]
    fn filter_only_when_non_empty() {
        let json = to_value(build_data_source(&config(""), "")).unwrap();
        assert!(json["parameters"].get("filter").is_none());

        let filter = "department eq 'hr' and year ge 2023";
        let json = to_value(build_data_source(&config(""), filter)).unwrap();
        assert_eq!(json["parameters"]["filter"], json!(filter));
    }

    #[test]
    fn request_preserves_messages() {
        let messages = vec![
            ChatMessage::system("Answer from the handbook."),
            ChatMessage::user("How many vacation days?"),
        ];
        let request = build_request(&config(""), "year eq 2024", &messages);
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.messages, messages);

        let json = to_value(&request).unwrap();
        assert_eq!(json["temperature"], json!(0.2));
        assert_eq!(
            json["messages"],
            json!([
                {"role": "system", "content": "Answer from the handbook."},
                {"role": "user", "content": "How many vacation days?"}
            ])
        );
        assert_eq!(json["data_sources"].as_array().unwrap().len(), 1);
        assert_eq!(
            json["data_sources"][0]["parameters"]["filter"],
            json!("year eq 2024")
        );
    }

    #[test]
    fn build_is_deterministic() {
        let messages = vec![ChatMessage::user("hi")];
        let config = config("k");
        assert_eq!(
            build_request(&config, "f", &messages),
            build_request(&config, "f", &messages)
        );
    }
}
