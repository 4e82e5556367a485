//! Client configuration.
//!
//! Every field resolves from an explicit [`ClientOptions`] value first, then
//! from the environment, then from a default.  The chat endpoint and the
//! search endpoint have no default and fail resolution when absent.
//!
//! | Field | Environment variable | Default |
//! |-------|----------------------|---------|
//! | chat endpoint | `OPENAI_API_BASE` | required |
//! | chat API key | `OPENAI_API_KEY` | token provider |
//! | chat deployment | `OPENAI_DEPLOYMENT_NAME` | `gpt-4o` |
//! | embedding deployment | `OPENAI_EMBEDDING_DEPLOYMENT_NAME` | `text-embedding-ada-002` |
//! | API version | `OPENAI_API_VERSION` | `2024-02-01` |
//! | search endpoint | `AZURESEARCH_API_BASE` | required |
//! | search API key | `AZURESEARCH_API_KEY` | empty (managed identity) |
//! | index name | `AZURESEARCH_INDEX_NAME` | `documents` |
//! | semantic configuration | none | `{index}-semantic-configuration` |

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::credential::{ChatCredential, ManagedIdentityCredential, TokenProvider};
use crate::error::{Error, Result};
use crate::transport::ChatTransport;

pub const OPENAI_API_BASE: &str = "OPENAI_API_BASE";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const OPENAI_DEPLOYMENT_NAME: &str = "OPENAI_DEPLOYMENT_NAME";
pub const OPENAI_EMBEDDING_DEPLOYMENT_NAME: &str = "OPENAI_EMBEDDING_DEPLOYMENT_NAME";
pub const OPENAI_API_VERSION: &str = "OPENAI_API_VERSION";
pub const AZURESEARCH_API_BASE: &str = "AZURESEARCH_API_BASE";
pub const AZURESEARCH_API_KEY: &str = "AZURESEARCH_API_KEY";
pub const AZURESEARCH_INDEX_NAME: &str = "AZURESEARCH_INDEX_NAME";

/// Default chat deployment.
pub const DEFAULT_CHAT_DEPLOYMENT: &str = "gpt-4o";
/// Default embedding deployment.
pub const DEFAULT_EMBEDDING_DEPLOYMENT: &str = "text-embedding-ada-002";
/// Default search index.
pub const DEFAULT_INDEX_NAME: &str = "documents";
/// Default Azure OpenAI data-plane API version.
pub const DEFAULT_API_VERSION: &str = "2024-02-01";

/// A source of configuration variables.
pub trait Environment {
    /// Look up a variable.
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessEnvironment;

impl Environment for ProcessEnvironment {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Explicit overrides for client configuration.
///
/// Unset fields fall back to the environment and then to defaults.  An
/// explicit empty string counts as unset for every field except
/// `search_api_key`, so `with_chat_endpoint("")` still reads
/// `OPENAI_API_BASE`.
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub chat_endpoint: Option<String>,
    pub chat_api_key: Option<String>,
    pub chat_deployment: Option<String>,
    pub embedding_deployment: Option<String>,
    pub api_version: Option<String>,
    pub search_endpoint: Option<String>,
    /// An explicit key, even an empty one, wins over `AZURESEARCH_API_KEY`.
    pub search_api_key: Option<String>,
    pub search_index_name: Option<String>,
    pub semantic_configuration: Option<String>,
    /// Used for the chat endpoint when no API key is configured.
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    /// A pre-built transport; when set, chat endpoint and credential are not
    /// resolved at all.
    pub transport: Option<Arc<dyn ChatTransport>>,
}

impl ClientOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the chat endpoint.
    pub fn with_chat_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.chat_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the chat API key.
    pub fn with_chat_api_key(mut self, key: impl Into<String>) -> Self {
        self.chat_api_key = Some(key.into());
        self
    }

    /// Sets the chat deployment.
    pub fn with_chat_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.chat_deployment = Some(deployment.into());
        self
    }

    /// Sets the embedding deployment.
    pub fn with_embedding_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.embedding_deployment = Some(deployment.into());
        self
    }

    /// Sets the API version.
    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    /// Sets the search endpoint.
    pub fn with_search_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.search_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the search API key.
    pub fn with_search_api_key(mut self, key: impl Into<String>) -> Self {
        self.search_api_key = Some(key.into());
        self
    }

    /// Sets the search index.
    pub fn with_search_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.search_index_name = Some(index_name.into());
        self
    }

    /// Sets the semantic configuration.
    pub fn with_semantic_configuration(mut self, name: impl Into<String>) -> Self {
        self.semantic_configuration = Some(name.into());
        self
    }

    /// Sets the token provider.
    pub fn with_token_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.token_provider = Some(provider);
        self
    }

    /// Sets a pre-built transport.
    pub fn with_transport(mut self, transport: Arc<dyn ChatTransport>) -> Self {
        self.transport = Some(transport);
        self
    }
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("chat_endpoint", &self.chat_endpoint)
            .field("chat_api_key", &self.chat_api_key.as_ref().map(|_| "<redacted>"))
            .field("chat_deployment", &self.chat_deployment)
            .field("embedding_deployment", &self.embedding_deployment)
            .field("api_version", &self.api_version)
            .field("search_endpoint", &self.search_endpoint)
            .field("search_api_key", &self.search_api_key.as_ref().map(|_| "<redacted>"))
            .field("search_index_name", &self.search_index_name)
            .field("semantic_configuration", &self.semantic_configuration)
            .field("token_provider", &self.token_provider.is_some())
            .field("transport", &self.transport.is_some())
            .finish()
    }
}

/// First non-empty value of an explicit option and an environment variable.
fn lookup(explicit: Option<&String>, env: &dyn Environment, key: &str) -> Option<String> {
    explicit
        .filter(|s| !s.is_empty())
        .cloned()
        .or_else(|| env.var(key).filter(|s| !s.is_empty()))
}

/// Connection settings of the chat-completion endpoint.
#[derive(Debug, Clone)]
pub struct ChatEndpointConfig {
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
    pub endpoint: String,
    /// How requests authenticate.
    pub credential: ChatCredential,
    /// Data-plane API version.
    pub api_version: String,
}

impl ChatEndpointConfig {
    /// Resolve the chat endpoint and its credential.
    ///
    /// The credential is the explicit key, else `OPENAI_API_KEY`, else the
    /// supplied token provider, else the ambient managed identity.
    pub fn resolve(options: &ClientOptions, env: &dyn Environment) -> Result<Self> {
        let endpoint = lookup(options.chat_endpoint.as_ref(), env, OPENAI_API_BASE)
            .ok_or_else(|| Error::missing_config(OPENAI_API_BASE, "chat endpoint is required"))?;
        let api_version = lookup(options.api_version.as_ref(), env, OPENAI_API_VERSION)
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string());

        let key = options.chat_api_key.clone().or_else(|| env.var(OPENAI_API_KEY));
        let credential = match (key, &options.token_provider) {
            (Some(key), _) => ChatCredential::ApiKey(key),
            (None, Some(provider)) => ChatCredential::token(Arc::clone(provider)),
            (None, None) => {
                ChatCredential::token(Arc::new(ManagedIdentityCredential::from_environment(env)?))
            }
        };

        Ok(Self {
            endpoint,
            credential,
            api_version,
        })
    }
}

/// Resolved deployment and search settings of a client.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    chat_deployment: String,
    embedding_deployment: String,
    search_endpoint: String,
    search_api_key: String,
    search_index_name: String,
    semantic_configuration: String,
}

impl ClientConfig {
    /// Resolve configuration from explicit options and the environment.
    pub fn resolve(options: &ClientOptions, env: &dyn Environment) -> Result<Self> {
        let search_endpoint = lookup(options.search_endpoint.as_ref(), env, AZURESEARCH_API_BASE)
            .ok_or_else(|| {
                Error::missing_config(AZURESEARCH_API_BASE, "search endpoint is required")
            })?;
        let search_api_key = match &options.search_api_key {
            Some(key) => key.clone(),
            None => env.var(AZURESEARCH_API_KEY).unwrap_or_default(),
        };
        let search_index_name =
            lookup(options.search_index_name.as_ref(), env, AZURESEARCH_INDEX_NAME)
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string());
        let chat_deployment = lookup(options.chat_deployment.as_ref(), env, OPENAI_DEPLOYMENT_NAME)
            .unwrap_or_else(|| DEFAULT_CHAT_DEPLOYMENT.to_string());
        let embedding_deployment = lookup(
            options.embedding_deployment.as_ref(),
            env,
            OPENAI_EMBEDDING_DEPLOYMENT_NAME,
        )
        .unwrap_or_else(|| DEFAULT_EMBEDDING_DEPLOYMENT.to_string());
        let semantic_configuration = options
            .semantic_configuration
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{search_index_name}-semantic-configuration"));

        Ok(Self {
            chat_deployment,
            embedding_deployment,
            search_endpoint,
            search_api_key,
            search_index_name,
            semantic_configuration,
        })
    }

    pub fn chat_deployment(&self) -> &str {
        &self.chat_deployment
    }

    pub fn embedding_deployment(&self) -> &str {
        &self.embedding_deployment
    }

    pub fn search_endpoint(&self) -> &str {
        &self.search_endpoint
    }

    /// The search key; empty means the chat service's managed identity.
    pub fn search_api_key(&self) -> &str {
        &self.search_api_key
    }

    pub fn search_index_name(&self) -> &str {
        &self.search_index_name
    }

    pub fn semantic_configuration(&self) -> &str {
        &self.semantic_configuration
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let search_api_key = if self.search_api_key.is_empty() {
            ""
        } else {
            "<redacted>"
        };
        f.debug_struct("ClientConfig")
            .field("chat_deployment", &self.chat_deployment)
            .field("embedding_deployment", &self.embedding_deployment)
            .field("search_endpoint", &self.search_endpoint)
            .field("search_api_key", &search_api_key)
            .field("search_index_name", &self.search_index_name)
            .field("semantic_configuration", &self.semantic_configuration)
            .finish()
    }
}
