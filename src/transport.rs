//! The chat-completion round trip.
//!
//! [`ChatTransport`] is the seam between the orchestrator and the network.
//! [`AzureOpenAiTransport`] is the reqwest-backed implementation; callers may
//! supply their own to route requests elsewhere.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response};
use serde::Deserialize;

use crate::config::ChatEndpointConfig;
use crate::credential::ChatCredential;
use crate::error::{Error, Result};
use crate::types::{ChatCompletion, ChatCompletionRequest};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends a chat-completion request and returns the service's completion.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Perform one chat-completion round trip.
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion>;
}

/// Transport for an Azure OpenAI resource.
#[derive(Clone)]
pub struct AzureOpenAiTransport {
    client: ReqwestClient,
    endpoint: String,
    credential: ChatCredential,
    api_version: String,
    timeout: Duration,
}

impl AzureOpenAiTransport {
    /// Create a transport for a resolved chat endpoint.
    pub fn new(config: ChatEndpointConfig) -> Result<Self> {
        Self::with_timeout(config, DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom request timeout.
    pub fn with_timeout(config: ChatEndpointConfig, timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            credential: config.credential,
            api_version: config.api_version,
            timeout,
        })
    }

    /// The chat-completions URL of a deployment.
    pub fn completions_url(&self, deployment: &str) -> Result<url::Url> {
        let mut url = url::Url::parse(&format!("{}/", self.endpoint))?
            .join(&format!("openai/deployments/{deployment}/chat/completions"))?;
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Create and return default headers for API requests.
    async fn default_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        let (name, value) = self.credential.header().await?;
        let mut value = HeaderValue::from_str(&value)
            .map_err(|_| Error::authentication("Credential is not a valid header value"))?;
        value.set_sensitive(true);
        headers.insert(name, value);
        Ok(headers)
    }

    /// Process API response errors and convert to our Error type
    async fn process_error_response(response: Response) -> Error {
        let status_code = response.status().as_u16();

        let request_id = ["x-request-id", "apim-request-id"]
            .iter()
            .find_map(|name| response.headers().get(*name))
            .and_then(|val| val.to_str().ok())
            .map(String::from);

        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|val| val.to_str().ok())
            .and_then(|val| val.parse::<u64>().ok());

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: Option<ErrorDetail>,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            code: Option<String>,
            message: Option<String>,
            param: Option<String>,
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {}", e),
                    Some(Box::new(e)),
                );
            }
        };

        let detail = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| e.error);
        let error_type = detail.as_ref().and_then(|e| e.code.clone());
        let error_message = detail
            .as_ref()
            .and_then(|e| e.message.clone())
            .unwrap_or_else(|| error_body.clone());
        let error_param = detail.as_ref().and_then(|e| e.param.clone());

        match status_code {
            400 => Error::bad_request(error_message, error_param),
            401 => Error::authentication(error_message),
            403 => Error::permission(error_message),
            404 => Error::not_found(error_message),
            408 => Error::timeout(error_message, None),
            429 => Error::rate_limit(error_message, retry_after),
            500 => Error::internal_server(error_message, request_id),
            502..=504 => Error::service_unavailable(error_message, retry_after),
            _ => Error::api(status_code, error_type, error_message, request_id),
        }
    }
}

impl fmt::Debug for AzureOpenAiTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureOpenAiTransport")
            .field("endpoint", &self.endpoint)
            .field("credential", &self.credential)
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[async_trait]
impl ChatTransport for AzureOpenAiTransport {
    async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletion> {
        let url = self.completions_url(&request.model)?;

        let response = self
            .client
            .post(url)
            .headers(self.default_headers().await?)
            .json(request)
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;

        if !response.status().is_success() {
            return Err(Self::process_error_response(response).await);
        }

        response.json::<ChatCompletion>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {}", e),
                Some(Box::new(e)),
            )
        })
    }
}

/// Classify a failed reqwest send.
pub(crate) fn request_error(e: reqwest::Error, timeout: Duration) -> Error {
    if e.is_timeout() {
        Error::timeout(
            format!("Request timed out: {}", e),
            Some(timeout.as_secs_f64()),
        )
    } else if e.is_connect() {
        Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(endpoint: &str) -> ChatEndpointConfig {
        ChatEndpointConfig {
            endpoint: endpoint.to_string(),
            credential: ChatCredential::ApiKey("test-key".to_string()),
            api_version: "2024-02-01".to_string(),
        }
    }

    #[test]
    fn transport_creation() {
        let transport = AzureOpenAiTransport::new(endpoint("https://res.openai.azure.com/")).unwrap();
        assert_eq!(transport.endpoint, "https://res.openai.azure.com");
        assert_eq!(transport.timeout, DEFAULT_TIMEOUT);

        let transport = AzureOpenAiTransport::with_timeout(
            endpoint("https://res.openai.azure.com"),
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(transport.timeout, Duration::from_secs(5));
    }

    #[test]
    fn completions_url() {
        let transport = AzureOpenAiTransport::new(endpoint("https://res.openai.azure.com/")).unwrap();
        assert_eq!(
            transport.completions_url("gpt-4o").unwrap().as_str(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );
    }

    #[test]
    fn debug_redacts_key() {
        let transport = AzureOpenAiTransport::new(endpoint("https://res.openai.azure.com")).unwrap();
        assert!(!format!("{transport:?}").contains("test-key"));
    }
}
