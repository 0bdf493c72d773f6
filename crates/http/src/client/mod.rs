//! Tether HTTP client
//!
//! [`AuthClient`] is the dispatch engine: every call gets the stored
//! credential headers, a per-attempt deadline and a bounded retry budget
//! with exponential backoff. It never refreshes tokens on its own; callers
//! decide what an [`ClientError::Unauthorized`] means.

pub mod auth;
pub mod config;
pub mod error;
pub mod retry;
pub mod sessions;
pub mod transport;

pub use config::{ClientConfig, Endpoints};
pub use error::{ClientError, ServerCode};
pub use retry::RetryPolicy;
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport, TransportError};

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tether_core::{EventBus, KeyValueStore, MemoryStore, Notice, SessionStore, rt};

pub const HEADER_TOKEN_TYPE: &str = "X-Token-Type";

/// Credential kind announced in [`HEADER_TOKEN_TYPE`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// Which bearer token a request carries
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Credential {
    /// The stored access token, if one exists
    #[default]
    Stored,
    /// A token supplied by the caller
    Explicit { token: String, kind: TokenKind },
    /// No authorization header
    None,
}

/// Per-call overrides of the client defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOptions {
    pub credential: Credential,
    /// Retry budget; the configured default when `None`
    pub retries: Option<u32>,
    /// Hand exhausted failures to the installed [`FailureSink`]
    pub report_failure: bool,
    /// Per-attempt deadline; the configured default when `None`
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            credential: Credential::Stored,
            retries: None,
            report_failure: true,
            timeout: None,
        }
    }
}

impl RequestOptions {
    /// One attempt, failures returned to the caller only
    #[must_use]
    pub fn single_shot() -> Self {
        Self {
            retries: Some(0),
            report_failure: false,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }
}

/// Decoded response body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Json(Value),
    Text(String),
}

impl ResponseBody {
    fn decode(response: &HttpResponse) -> Result<Self, ClientError> {
        let is_json = response
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.contains("application/json"));
        if is_json {
            serde_json::from_str(&response.body)
                .map(Self::Json)
                .map_err(|e| ClientError::Decode(e.to_string()))
        } else {
            Ok(Self::Text(response.body.clone()))
        }
    }

    /// Like [`decode`](Self::decode), but a malformed JSON body is kept as
    /// text. Used for error responses, which proxies often send as HTML.
    fn decode_lenient(response: &HttpResponse) -> Self {
        Self::decode(response).unwrap_or_else(|_| Self::Text(response.body.clone()))
    }

    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Text(_) => None,
        }
    }

    /// Deserialize a JSON body into `T`
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        match self {
            Self::Json(value) => {
                serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string()))
            }
            Self::Text(text) => Err(ClientError::Decode(format!(
                "expected a JSON body, got text: {text}"
            ))),
        }
    }
}

/// Receives failures that exhausted their retry budget
pub trait FailureSink: Send + Sync {
    fn on_failure(&self, path: &str, error: &ClientError);
}

/// Tether auth API client
#[derive(Clone)]
pub struct AuthClient {
    config: Arc<ClientConfig>,
    session: SessionStore,
    transport: Arc<dyn Transport>,
    events: EventBus,
    failure_sink: Arc<RwLock<Option<Arc<dyn FailureSink>>>>,
}

impl std::fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthClient")
            .field("base_url", &self.config.base_url)
            .field("transport", &self.transport)
            .finish_non_exhaustive()
    }
}

impl AuthClient {
    /// Create a new client with default configuration
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    #[must_use]
    pub fn builder() -> AuthClientBuilder {
        AuthClientBuilder::default()
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    pub fn endpoints(&self) -> &Endpoints {
        &self.config.endpoints
    }

    /// Session attributes the client reads credentials from
    #[must_use]
    pub const fn session(&self) -> &SessionStore {
        &self.session
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// Install the handler for exhausted failures, replacing any previous one
    pub fn set_failure_sink(&self, sink: Arc<dyn FailureSink>) {
        *self
            .failure_sink
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    fn headers(&self, credential: &Credential) -> Vec<(String, String)> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        let bearer = match credential {
            Credential::Stored => self
                .session
                .access_token()
                .map(|token| (token, TokenKind::Access)),
            Credential::Explicit { token, kind } => Some((token.clone(), *kind)),
            Credential::None => None,
        };
        if let Some((token, kind)) = bearer {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
            headers.push((HEADER_TOKEN_TYPE.to_string(), kind.as_str().to_string()));
        }
        headers
    }

    /// Issue a request with timeout, classification and retry.
    ///
    /// Headers and body are built once and replayed unchanged on every
    /// attempt.
    pub async fn dispatch(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        options: RequestOptions,
    ) -> Result<ResponseBody, ClientError> {
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.config.base_url, path),
            headers: self.headers(&options.credential),
            body: body
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| ClientError::Decode(e.to_string()))?,
        };
        let deadline = options.timeout.unwrap_or_else(|| self.config.timeout());
        let policy = RetryPolicy::new(
            options.retries.unwrap_or(self.config.retries),
            self.config.retry_delay(),
        );

        let mut retry = 0;
        loop {
            let err = match self.attempt(&request, deadline).await {
                Ok(body) => return Ok(body),
                Err(err) => err,
            };

            if let Some(delay) = policy.delay_for(retry) {
                let left = policy.remaining(retry);
                tracing::warn!(
                    %method,
                    path,
                    attempt = retry + 1,
                    retries_left = left,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "request failed, retrying"
                );
                self.events
                    .notify(Notice::warning(format!("Retrying {path} ({left} left)")));
                rt::sleep(delay).await;
                retry += 1;
                continue;
            }

            tracing::error!(%method, path, attempts = retry + 1, error = %err, "request failed");
            if options.report_failure {
                let sink = self
                    .failure_sink
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(sink) = sink {
                    sink.on_failure(path, &err);
                }
            }
            return Err(err);
        }
    }

    async fn attempt(
        &self,
        request: &HttpRequest,
        deadline: Duration,
    ) -> Result<ResponseBody, ClientError> {
        tracing::debug!(method = %request.method, url = %request.url, "dispatching");
        let response = rt::deadline(deadline, self.transport.send(request.clone()))
            .await
            .map_err(|_| ClientError::Timeout {
                resource: request.url.clone(),
                deadline,
            })?
            .map_err(|e| ClientError::Transport(e.message))?;

        let body = if (200..300).contains(&response.status) {
            ResponseBody::decode(&response)?
        } else {
            ResponseBody::decode_lenient(&response)
        };
        let has_refresh_token = self.session.refresh_token().is_some();
        match ClientError::from_response(response.status, &body, has_refresh_token) {
            Some(err) => Err(err),
            None => Ok(body),
        }
    }

    pub async fn get(&self, path: &str) -> Result<ResponseBody, ClientError> {
        self.dispatch(Method::Get, path, None, RequestOptions::default())
            .await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ResponseBody, ClientError> {
        self.dispatch(Method::Post, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<ResponseBody, ClientError> {
        self.dispatch(Method::Put, path, Some(body), RequestOptions::default())
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<ResponseBody, ClientError> {
        self.dispatch(Method::Delete, path, None, RequestOptions::default())
            .await
    }

    /// Send a typed body and decode a typed JSON response
    pub async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        options: RequestOptions,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| ClientError::Decode(e.to_string()))?;
        self.dispatch(method, path, body.as_ref(), options)
            .await?
            .into_json()
    }
}

/// Builder for [`AuthClient`]
#[derive(Default)]
pub struct AuthClientBuilder {
    config: ClientConfig,
    base_url: Option<String>,
    store: Option<Arc<dyn KeyValueStore>>,
    transport: Option<Arc<dyn Transport>>,
    events: Option<EventBus>,
}

impl AuthClientBuilder {
    /// Start from a loaded configuration
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        if !config.base_url.is_empty() {
            self.base_url = Some(config.base_url.clone());
        }
        self.config = config;
        self
    }

    /// Set the base URL
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the per-attempt deadline
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the retry budget
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.config.retries = retries;
        self
    }

    /// Set the base retry delay
    #[must_use]
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the user agent
    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    #[must_use]
    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Store holding the session record; in-memory when unset
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the reqwest transport
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    #[must_use]
    pub fn events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the client
    pub fn build(self) -> Result<AuthClient, ClientError> {
        let base_url = self
            .base_url
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        let mut config = self.config;
        // Paths are appended verbatim
        config.base_url = base_url.trim_end_matches('/').to_string();

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(&config.user_agent)?),
        };
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));

        Ok(AuthClient {
            config: Arc::new(config),
            session: SessionStore::new(store),
            transport,
            events: self.events.unwrap_or_default(),
            failure_sink: Arc::new(RwLock::new(None)),
        })
    }
}
