//! Credentials for the chat-completion endpoint.
//!
//! The chat endpoint accepts either an API key or a bearer token.  Tokens come
//! from a [`TokenProvider`], an injected capability; the crate ships a
//! [`StaticTokenProvider`] and a [`ManagedIdentityCredential`] that asks the
//! hosting environment for a token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::config::Environment;
use crate::error::{Error, Result};
use crate::observability::TOKEN_FETCHES;
use crate::transport::request_error;

/// Token audience of the Azure OpenAI service.
pub const COGNITIVE_SERVICES_SCOPE: &str = "https://cognitiveservices.azure.com/.default";

const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
const IMDS_API_VERSION: &str = "2018-02-01";
const APP_SERVICE_API_VERSION: &str = "2019-08-01";
const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);
const REFRESH_MARGIN: time::Duration = time::Duration::minutes(5);

/// A source of bearer tokens.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return a bearer token valid for `scope`.
    async fn token(&self, scope: &str) -> Result<String>;
}

/// How requests to the chat endpoint authenticate.
#[derive(Clone)]
pub enum ChatCredential {
    /// Send the key in the `api-key` header.
    ApiKey(String),

    /// Send a bearer token for `scope` in the `Authorization` header.
    Token {
        /// Where tokens come from.
        provider: Arc<dyn TokenProvider>,
        /// Audience requested from the provider.
        scope: String,
    },
}

impl ChatCredential {
    /// Bearer-token authentication against the chat service audience.
    pub fn token(provider: Arc<dyn TokenProvider>) -> Self {
        ChatCredential::Token {
            provider,
            scope: COGNITIVE_SERVICES_SCOPE.to_string(),
        }
    }

    /// Returns true for key-based authentication.
    pub fn is_api_key(&self) -> bool {
        matches!(self, ChatCredential::ApiKey(_))
    }

    /// The header name and value to attach to a request.
    pub(crate) async fn header(&self) -> Result<(&'static str, String)> {
        match self {
            ChatCredential::ApiKey(key) => Ok(("api-key", key.clone())),
            ChatCredential::Token { provider, scope } => {
                let token = provider.token(scope).await?;
                Ok(("authorization", format!("Bearer {token}")))
            }
        }
    }
}

impl fmt::Debug for ChatCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChatCredential::ApiKey(_) => f.debug_tuple("ApiKey").field(&"<redacted>").finish(),
            ChatCredential::Token { scope, .. } => f
                .debug_struct("Token")
                .field("scope", scope)
                .finish_non_exhaustive(),
        }
    }
}

/// A token provider that always returns the same token.
///
/// ```
/// use ragchat::{StaticTokenProvider, TokenProvider};
///
/// # tokio_test::block_on(async {
/// let provider = StaticTokenProvider::new("pre-acquired");
/// let token = provider
///     .token(ragchat::credential::COGNITIVE_SERVICES_SCOPE)
///     .await
///     .unwrap();
/// assert_eq!(token, "pre-acquired");
/// # });
/// ```
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Create a provider for a pre-acquired token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider").finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self, _scope: &str) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Clone)]
enum IdentitySource {
    AppService { endpoint: String, secret: String },
    Imds { endpoint: String },
}

#[derive(Debug, Clone)]
struct AccessToken {
    scope: String,
    token: String,
    expires_on: OffsetDateTime,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_on: EpochSeconds,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Number(i64),
    Text(String),
}

impl EpochSeconds {
    fn to_datetime(&self) -> Result<OffsetDateTime> {
        let seconds = match self {
            EpochSeconds::Number(n) => *n,
            EpochSeconds::Text(s) => s.trim().parse::<i64>().map_err(|e| {
                Error::serialization(
                    format!("Invalid expires_on in token response: {s}"),
                    Some(Box::new(e)),
                )
            })?,
        };
        OffsetDateTime::from_unix_timestamp(seconds).map_err(|e| {
            Error::serialization(
                format!("Out of range expires_on in token response: {seconds}"),
                Some(Box::new(e)),
            )
        })
    }
}

/// Tokens for the identity the host environment assigns to this process.
///
/// Uses the App Service identity endpoint when `IDENTITY_ENDPOINT` and
/// `IDENTITY_HEADER` are set, and the instance metadata service otherwise.
/// `AZURE_CLIENT_ID` selects a user-assigned identity.  Tokens are cached
/// until shortly before they expire.
pub struct ManagedIdentityCredential {
    client: ReqwestClient,
    source: IdentitySource,
    client_id: Option<String>,
    cached: Mutex<Option<AccessToken>>,
}

impl ManagedIdentityCredential {
    /// Discover the identity endpoint from the environment.
    pub fn from_environment(env: &dyn Environment) -> Result<Self> {
        let source = match (env.var("IDENTITY_ENDPOINT"), env.var("IDENTITY_HEADER")) {
            (Some(endpoint), Some(secret)) if !endpoint.is_empty() => {
                IdentitySource::AppService { endpoint, secret }
            }
            _ => IdentitySource::Imds {
                endpoint: IMDS_ENDPOINT.to_string(),
            },
        };
        let client_id = env.var("AZURE_CLIENT_ID").filter(|id| !id.is_empty());
        let client = ReqwestClient::builder()
            .timeout(TOKEN_TIMEOUT)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self {
            client,
            source,
            client_id,
            cached: Mutex::new(None),
        })
    }

    async fn fetch(&self, scope: &str) -> Result<AccessToken> {
        TOKEN_FETCHES.click();
        let resource = scope.strip_suffix("/.default").unwrap_or(scope);
        let (endpoint, api_version) = match &self.source {
            IdentitySource::AppService { endpoint, .. } => (endpoint, APP_SERVICE_API_VERSION),
            IdentitySource::Imds { endpoint } => (endpoint, IMDS_API_VERSION),
        };
        let mut url = url::Url::parse_with_params(
            endpoint,
            &[("api-version", api_version), ("resource", resource)],
        )?;
        if let Some(client_id) = &self.client_id {
            url.query_pairs_mut().append_pair("client_id", client_id);
        }

        let request = match &self.source {
            IdentitySource::AppService { secret, .. } => {
                self.client.get(url).header("X-IDENTITY-HEADER", secret)
            }
            IdentitySource::Imds { .. } => self.client.get(url).header("Metadata", "true"),
        };
        let response = request
            .send()
            .await
            .map_err(|e| request_error(e, TOKEN_TIMEOUT))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::authentication(format!(
                "Managed identity token request failed ({status}): {body}"
            )));
        }

        let parsed = response.json::<TokenResponse>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse token response: {}", e),
                Some(Box::new(e)),
            )
        })?;
        Ok(AccessToken {
            scope: scope.to_string(),
            expires_on: parsed.expires_on.to_datetime()?,
            token: parsed.access_token,
        })
    }
}

impl fmt::Debug for ManagedIdentityCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedIdentityCredential")
            .field("source", &self.source_name())
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl ManagedIdentityCredential {
    fn source_name(&self) -> &'static str {
        match self.source {
            IdentitySource::AppService { .. } => "app_service",
            IdentitySource::Imds { .. } => "imds",
        }
    }
}

#[async_trait]
impl TokenProvider for ManagedIdentityCredential {
    async fn token(&self, scope: &str) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.scope == scope && token.expires_on - REFRESH_MARGIN > OffsetDateTime::now_utc()
            {
                return Ok(token.token.clone());
            }
        }
        let fresh = self.fetch(scope).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn app_service_env(server: &MockServer) -> HashMap<String, String> {
        HashMap::from([
            (
                "IDENTITY_ENDPOINT".to_string(),
                format!("{}/msi/token", server.uri()),
            ),
            ("IDENTITY_HEADER".to_string(), "s3cret".to_string()),
        ])
    }

    #[tokio::test]
    async fn static_token() {
        let provider = StaticTokenProvider::new("abc");
        assert_eq!(provider.token(COGNITIVE_SERVICES_SCOPE).await.unwrap(), "abc");
    }

    #[tokio::test]
    async fn credential_headers() {
        let key = ChatCredential::ApiKey("k".to_string());
        assert_eq!(key.header().await.unwrap(), ("api-key", "k".to_string()));

        let token = ChatCredential::token(Arc::new(StaticTokenProvider::new("t")));
        assert!(!token.is_api_key());
        assert_eq!(
            token.header().await.unwrap(),
            ("authorization", "Bearer t".to_string())
        );
    }

    #[test]
    fn debug_redacts_key() {
        let key = ChatCredential::ApiKey("super-secret".to_string());
        assert!(!format!("{key:?}").contains("super-secret"));
    }

    #[test]
    fn falls_back_to_imds() {
        let env: HashMap<String, String> = HashMap::new();
        let credential = ManagedIdentityCredential::from_environment(&env).unwrap();
        assert_eq!(credential.source_name(), "imds");
        assert!(credential.client_id.is_none());
    }

    #[tokio::test]
    async fn app_service_token_is_cached() {
        let server = MockServer::start().await;
        let expires_on = (OffsetDateTime::now_utc().unix_timestamp() + 3600).to_string();
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .and(header("X-IDENTITY-HEADER", "s3cret"))
            .and(query_param("api-version", APP_SERVICE_API_VERSION))
            .and(query_param("resource", "https://cognitiveservices.azure.com"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_on": expires_on,
                "token_type": "Bearer"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::from_environment(&app_service_env(&server))
            .unwrap();
        assert_eq!(credential.token(COGNITIVE_SERVICES_SCOPE).await.unwrap(), "tok-1");
        assert_eq!(credential.token(COGNITIVE_SERVICES_SCOPE).await.unwrap(), "tok-1");
    }

    #[tokio::test]
    async fn expiring_token_is_refreshed() {
        let server = MockServer::start().await;
        let expires_on = OffsetDateTime::now_utc().unix_timestamp() + 60;
        Mock::given(method("GET"))
            .and(path("/msi/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "short-lived",
                "expires_on": expires_on
            })))
            .expect(2)
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::from_environment(&app_service_env(&server))
            .unwrap();
        credential.token(COGNITIVE_SERVICES_SCOPE).await.unwrap();
        credential.token(COGNITIVE_SERVICES_SCOPE).await.unwrap();
    }

    #[tokio::test]
    async fn failed_token_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(400).set_body_string("no identity"))
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::from_environment(&app_service_env(&server))
            .unwrap();
        let err = credential.token(COGNITIVE_SERVICES_SCOPE).await.unwrap_err();
        assert!(err.is_authentication());
        assert!(err.to_string().contains("no identity"));
    }
}
