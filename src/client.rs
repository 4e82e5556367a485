use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::client_logger::ClientLogger;
use crate::config::{
    ChatEndpointConfig, ClientConfig, ClientOptions, Environment, ProcessEnvironment,
};
use crate::error::Result;
use crate::normalize::normalize;
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::request::build_request;
use crate::transport::{AzureOpenAiTransport, ChatTransport};
use crate::types::{ChatCompletionRequest, ChatMessage, NormalizedResponse};

/// Retrieval-augmented chat client.
///
/// Each [`chat`](Self::chat) call grounds the conversation in the configured
/// search index and returns a [`NormalizedResponse`].  The search filter is the
/// only mutable state; changing it requires `&mut self`, so it cannot change
/// underneath an in-flight call.
#[derive(Clone)]
pub struct RagChatClient {
    config: ClientConfig,
    transport: Arc<dyn ChatTransport>,
    filter: String,
    logger: Option<Arc<dyn ClientLogger>>,
}

impl RagChatClient {
    /// Create a client configured entirely from the process environment.
    pub fn new() -> Result<Self> {
        Self::with_options(ClientOptions::new())
    }

    /// Create a client from explicit options, falling back to the process
    /// environment.
    pub fn with_options(options: ClientOptions) -> Result<Self> {
        Self::with_options_and_env(options, &ProcessEnvironment)
    }

    /// Create a client from explicit options and a custom environment.
    pub fn with_options_and_env(options: ClientOptions, env: &dyn Environment) -> Result<Self> {
        let transport = match &options.transport {
            Some(transport) => Arc::clone(transport),
            None => {
                let chat = ChatEndpointConfig::resolve(&options, env)?;
                Arc::new(AzureOpenAiTransport::new(chat)?) as Arc<dyn ChatTransport>
            }
        };
        let config = ClientConfig::resolve(&options, env)?;
        Ok(Self {
            config,
            transport,
            filter: String::new(),
            logger: None,
        })
    }

    /// Install a logger that sees every completion.
    pub fn with_logger(mut self, logger: Arc<dyn ClientLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The resolved configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Set the OData filter applied to searches; empty disables filtering.
    pub fn set_search_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
    }

    /// The current search filter.
    pub fn search_filter(&self) -> &str {
        &self.filter
    }

    /// Build the request a [`chat`](Self::chat) call would send.
    pub fn build_request(&self, messages: &[ChatMessage]) -> ChatCompletionRequest {
        build_request(&self.config, &self.filter, messages)
    }

    /// Send a conversation and return the normalized response.
    ///
    /// Transport failures are returned unchanged and never retried.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<NormalizedResponse> {
        let request = self.build_request(messages);
        let parameters = request.data_sources[0].parameters();
        tracing::debug!(
            deployment = %request.model,
            messages = request.messages.len(),
            filtered = parameters.filter.is_some(),
            search_auth = parameters.authentication.kind(),
            "sending retrieval-augmented chat request"
        );

        CLIENT_REQUESTS.click();
        let start = Instant::now();
        let result = self.transport.create_chat_completion(&request).await;
        CLIENT_REQUEST_DURATION.add(start.elapsed().as_secs_f64());

        let completion = match result {
            Ok(completion) => completion,
            Err(err) => {
                CLIENT_REQUEST_ERRORS.click();
                tracing::warn!(error = %err, "chat completion failed");
                return Err(err);
            }
        };
        if let Some(logger) = &self.logger {
            logger.log_completion(&completion);
        }

        let response = normalize(&completion);
        tracing::debug!(
            id = %response.id,
            choices = response.choices.len(),
            citations = response
                .choices
                .iter()
                .filter_map(|c| c.message.context.as_ref())
                .map(|c| c.citations().count())
                .sum::<usize>(),
            "normalized chat completion"
        );
        if let Some(logger) = &self.logger {
            logger.log_response(&response);
        }
        Ok(response)
    }
}

impl fmt::Debug for RagChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RagChatClient")
            .field("config", &self.config)
            .field("filter", &self.filter)
            .field("logger", &self.logger.is_some())
            .finish_non_exhaustive()
    }
}
