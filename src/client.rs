use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{self, HeaderValue};
use reqwest::{Client as ReqwestClient, RequestBuilder, Response};
use serde::Deserialize;
use url::Url;

use crate::chat_logger::ChatLogger;
use crate::data_stream::{ChatStream, decode_stream};
use crate::error::{Error, Result};
use crate::observability::{CLIENT_REQUEST_DURATION, CLIENT_REQUEST_ERRORS, CLIENT_REQUESTS};
use crate::transport::ChatTransport;
use crate::types::{AgentInfo, AgentListResponse, AgentRecord, AgentResponse, ChatRequest};

/// Where the agent service listens when nothing else is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:4112";
/// Environment variable consulted when no base URL is given.
pub const BASE_URL_ENV: &str = "AGENTCHAT_BASE_URL";
/// Default time allowed for a request to produce response headers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the agent service.
///
/// The timeout bounds how long a request may take to produce response headers.  It does not
/// bound how long a streamed body may run; that is the job of the quiescence timer in
/// [`spawn_stream`](crate::spawn_stream).
#[derive(Clone)]
pub struct AgentClient {
    client: ReqwestClient,
    base_url: Url,
    timeout: Duration,
    logger: Option<Arc<dyn ChatLogger>>,
}

impl AgentClient {
    /// Create a new client.
    ///
    /// The base URL can be provided directly or read from the `AGENTCHAT_BASE_URL` environment
    /// variable, falling back to `http://localhost:4112`.
    pub fn new(base_url: Option<String>) -> Result<Self> {
        Self::with_options(base_url, None)
    }

    /// Create a new client with custom settings.
    pub fn with_options(base_url: Option<String>, timeout: Option<Duration>) -> Result<Self> {
        let base_url = match base_url {
            Some(url) => url,
            None => env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        };
        let timeout = timeout.unwrap_or(DEFAULT_TIMEOUT);
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;

        Self::with_http_client(&base_url, client, Some(timeout))
    }

    /// Create a client around a preconfigured `reqwest::Client` (for custom TLS or proxies).
    pub fn with_http_client(
        base_url: &str,
        client: ReqwestClient,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::url(format!("Invalid base URL '{base_url}': {e}"), Some(e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::url(
                format!("Base URL '{base_url}' cannot have path segments"),
                None,
            ));
        }
        Ok(Self {
            client,
            base_url,
            timeout: timeout.unwrap_or(DEFAULT_TIMEOUT),
            logger: None,
        })
    }

    /// Attach a logger that sees every request and stream part.
    pub fn with_logger(mut self, logger: Arc<dyn ChatLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// The service base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The header timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build `{base}/api/<segments...>`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::url("Base URL cannot have path segments", None))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    /// Process error responses and convert them to our Error type.
    async fn process_error_response(response: Response, agent_name: Option<&str>) -> Error {
        let status = response.status();
        let status_code = status.as_u16();

        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorField,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum ErrorField {
            Message(String),
            Detail { message: Option<String> },
        }

        let error_body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return Error::http_client(
                    format!("Failed to read error response: {e}"),
                    Some(Box::new(e)),
                );
            }
        };

        let parsed = serde_json::from_str::<ErrorResponse>(&error_body)
            .ok()
            .and_then(|e| match e.error {
                ErrorField::Message(message) => Some(message),
                ErrorField::Detail { message } => message,
            });
        let error_message = match parsed {
            Some(message) => message,
            None if !error_body.trim().is_empty() => error_body.trim().to_string(),
            None => status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string(),
        };

        match status_code {
            404 => Error::not_found(error_message, agent_name.map(String::from)),
            408 => Error::timeout(error_message, None),
            _ => Error::api(status_code, error_message),
        }
    }

    /// Send a request, mapping transport failures and non-success statuses to errors.
    async fn execute(
        &self,
        method: &str,
        url: &Url,
        request: RequestBuilder,
        agent_name: Option<&str>,
    ) -> Result<Response> {
        if let Some(logger) = &self.logger {
            logger.log_request(method, url.as_str());
        }
        CLIENT_REQUESTS.click();
        let started = Instant::now();

        let sent = tokio::time::timeout(self.timeout, request.send()).await;
        CLIENT_REQUEST_DURATION.add(started.elapsed().as_secs_f64());
        let result = match sent {
            Err(_) => Err(Error::timeout(
                format!("Request to {url} timed out"),
                Some(self.timeout.as_secs_f64()),
            )),
            Ok(Err(e)) => Err(self.map_send_error(e)),
            Ok(Ok(response)) if !response.status().is_success() => {
                Err(Self::process_error_response(response, agent_name).await)
            }
            Ok(Ok(response)) => Ok(response),
        };
        if result.is_err() {
            CLIENT_REQUEST_ERRORS.click();
        }
        result
    }

    fn map_send_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::timeout(
                format!("Request timed out: {e}"),
                Some(self.timeout.as_secs_f64()),
            )
        } else if e.is_connect() {
            Error::connection(e.to_string(), Some(Box::new(e)))
        } else {
            Error::http_client(format!("Request failed: {e}"), Some(Box::new(e)))
        }
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse response: {e}"),
                Some(Box::new(e)),
            )
        })
    }

    /// Fetch every agent the service offers, sorted by name.
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let url = self.endpoint(&["agents"])?;
        let request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(self.timeout);
        let response = self.execute("GET", &url, request, None).await?;
        let listing: AgentListResponse = Self::read_json(response).await?;
        Ok(listing.into_agents())
    }

    /// Fetch one agent.
    pub async fn get_agent(&self, agent_name: &str) -> Result<AgentInfo> {
        let agent_name = agent_name.trim();
        if agent_name.is_empty() {
            return Err(Error::validation(
                "Agent name is required",
                Some("agentName".to_string()),
            ));
        }
        let url = self.endpoint(&["agents", agent_name])?;
        let request = self
            .client
            .get(url.clone())
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .timeout(self.timeout);
        let response = self.execute("GET", &url, request, Some(agent_name)).await?;
        let record: AgentRecord = Self::read_json(response).await?;
        Ok(record.into_agent(agent_name))
    }

    /// Ask an agent for a complete, non-streamed answer.
    pub async fn generate(&self, request: &ChatRequest) -> Result<AgentResponse> {
        let url = self.endpoint(&["agents", request.agent_name(), "generate"])?;
        let builder = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, HeaderValue::from_static("application/json"))
            .json(&request.body())
            .timeout(self.timeout);
        let response = self
            .execute("POST", &url, builder, Some(request.agent_name()))
            .await?;
        Self::read_json(response).await
    }

    /// Open a streamed chat response.
    ///
    /// Errors before the response headers arrive are returned; errors while reading the body
    /// are items of the returned stream.
    pub async fn stream_chat(&self, request: &ChatRequest) -> Result<ChatStream> {
        let url = self.endpoint(&["agents", request.agent_name(), "stream"])?;
        let builder = self
            .client
            .post(url.clone())
            .header(header::ACCEPT, HeaderValue::from_static("text/plain"))
            .json(&request.body());
        let response = self
            .execute("POST", &url, builder, Some(request.agent_name()))
            .await?;

        let parts = decode_stream(response.bytes_stream());
        match &self.logger {
            Some(logger) => {
                let logger = Arc::clone(logger);
                Ok(Box::pin(parts.inspect(move |item| {
                    if let Ok(part) = item {
                        logger.log_stream_part(part);
                    }
                })))
            }
            None => Ok(parts),
        }
    }
}

impl fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.timeout)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

#[async_trait]
impl ChatTransport for AgentClient {
    async fn open_stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        self.stream_chat(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_are_joined_and_encoded() {
        let client = AgentClient::new(Some("http://localhost:4112".to_string())).unwrap();
        assert_eq!(
            client.endpoint(&["agents"]).unwrap().as_str(),
            "http://localhost:4112/api/agents"
        );
        assert_eq!(
            client
                .endpoint(&["agents", "research agent", "stream"])
                .unwrap()
                .as_str(),
            "http://localhost:4112/api/agents/research%20agent/stream"
        );
    }

    #[test]
    fn base_url_with_path_prefix() {
        let client = AgentClient::new(Some("http://example.com/mastra/".to_string())).unwrap();
        assert_eq!(
            client.endpoint(&["agents"]).unwrap().as_str(),
            "http://example.com/mastra/api/agents"
        );
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = AgentClient::new(Some("not a url".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
        let err = AgentClient::new(Some("mailto:someone@example.com".to_string())).unwrap_err();
        assert!(matches!(err, Error::Url { .. }));
    }

    #[test]
    fn default_timeout() {
        let client = AgentClient::new(Some(DEFAULT_BASE_URL.to_string())).unwrap();
        assert_eq!(client.timeout(), DEFAULT_TIMEOUT);
        let client = AgentClient::with_options(
            Some(DEFAULT_BASE_URL.to_string()),
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(client.timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn get_agent_validates_name() {
        let client = AgentClient::new(Some(DEFAULT_BASE_URL.to_string())).unwrap();
        let err = client.get_agent("   ").await.unwrap_err();
        assert!(err.is_validation());
    }
}
