//! Outbound HTTP client.
//!
//! A thin wrapper over [`reqwest::Client`] for calling other services: an
//! optional base URL, default headers and query parameters, and JSON bodies.
//!
//! ```rust,no_run
//! use gatehouse_server::HttpClient;
//! use http::header::{HeaderValue, ACCEPT};
//!
//! # async fn call() -> Result<(), gatehouse_server::ClientError> {
//! let client = HttpClient::new()?
//!     .base_url("https://auth.internal")
//!     .header(ACCEPT, HeaderValue::from_static("application/json"));
//!
//! let response = client.post("/v1/verify", &serde_json::json!({"token": "t"})).await?;
//! let verdict: serde_json::Value = response.decode()?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Bound on establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an idle pooled connection is kept.
pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const TCP_KEEPALIVE: Duration = Duration::from_secs(30);

/// Outbound request failures.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The underlying client could not be constructed.
    #[error("build http client: {0}")]
    Build(#[source] reqwest::Error),

    /// Sending the request or reading the response failed.
    #[error("request {url}: {source}")]
    Request {
        /// Full request URL.
        url: String,
        /// The transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The request body could not be serialized.
    #[error("encode request body: {0}")]
    Encode(#[source] serde_json::Error),

    /// The response body is not the expected JSON.
    #[error("decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// A received response, fully buffered.
#[derive(Debug, Clone)]
pub struct ClientResponse {
    /// Status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body.
    pub body: Bytes,
}

impl ClientResponse {
    /// Parses the body as JSON.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, ClientError> {
        serde_json::from_slice(&self.body).map_err(ClientError::Decode)
    }
}

/// Outbound HTTP client.
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
    base_url: String,
    headers: HeaderMap,
    query: Vec<(String, String)>,
}

impl HttpClient {
    /// Creates a client with the default timeouts. Proxies are taken from
    /// the environment.
    pub fn new() -> Result<Self, ClientError> {
        let inner = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()
            .map_err(ClientError::Build)?;
        Ok(Self::from_client(inner))
    }

    /// Wraps a preconfigured client.
    #[must_use]
    pub fn from_client(inner: reqwest::Client) -> Self {
        Self {
            inner,
            base_url: String::new(),
            headers: HeaderMap::new(),
            query: Vec::new(),
        }
    }

    /// Prefixes every request URL with `url`.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Sends `name: value` on every request.
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Appends a query parameter to every request.
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Returns the full URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends a `GET`.
    pub async fn get(&self, path: &str) -> Result<ClientResponse, ClientError> {
        let url = self.url(path);
        let request = self.inner.get(&url);
        self.send(url, request).await
    }

    /// Sends a `POST` with `body` encoded as JSON.
    pub async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ClientResponse, ClientError> {
        let payload = serde_json::to_vec(body).map_err(ClientError::Encode)?;
        let url = self.url(path);
        let request = self
            .inner
            .post(&url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload);
        self.send(url, request).await
    }

    async fn send(&self, url: String, request: reqwest::RequestBuilder) -> Result<ClientResponse, ClientError> {
        let mut request = request.headers(self.headers.clone());
        if !self.query.is_empty() {
            request = request.query(&self.query);
        }

        tracing::debug!(url = %url, "outbound request");
        let response = match request.send().await {
            Ok(response) => response,
            Err(source) => return Err(ClientError::Request { url, source }),
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = match response.bytes().await {
            Ok(body) => body,
            Err(source) => return Err(ClientError::Request { url, source }),
        };
        tracing::debug!(url = %url, status = status.as_u16(), "outbound response");

        Ok(ClientResponse { status, headers, body })
    }
}
