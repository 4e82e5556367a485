//! Retrieval-augmented chat for Azure OpenAI "on your data".
//!
//! [`RagChatClient`] attaches an Azure AI Search data source to every chat
//! request and returns a [`NormalizedResponse`] whose retrieval context has
//! its intent and citations parsed into structured fields.

// Public modules
pub mod client;
pub mod client_logger;
pub mod config;
pub mod credential;
pub mod error;
pub mod normalize;
pub mod observability;
pub mod request;
pub mod transport;
pub mod types;

// Re-exports
pub use client::RagChatClient;
pub use client_logger::ClientLogger;
pub use config::{ChatEndpointConfig, ClientConfig, ClientOptions, Environment, ProcessEnvironment};
pub use credential::{ChatCredential, ManagedIdentityCredential, StaticTokenProvider, TokenProvider};
pub use error::{Error, Result};
pub use normalize::normalize;
pub use observability::register_biometrics;
pub use transport::{AzureOpenAiTransport, ChatTransport};
pub use types::*;
