//! The transport seam: one request in, one response (any status) or a fault out.

use async_trait::async_trait;
use bytes::Bytes;
use indexmap::IndexMap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, ClientBuilder, Method};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ClientError;
use crate::headers::names;

/// A fully resolved request handed to a transport.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// Header snapshot in wire form.
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

/// A response as received. 4xx and 5xx are responses, not faults.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    /// Response headers, names lower-cased. Repeated headers are joined with `, `.
    pub headers: IndexMap<String, String>,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Faults raised when no response was obtained.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl TransportError {
    /// Dispatched but no response: eligible for retry.
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Timeout(_) | TransportError::Network(_))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(Duration::ZERO)
        } else if e.is_builder() {
            TransportError::InvalidRequest(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Performs the actual network I/O.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

/// Connection-level settings for `ReqwestTransport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connection timeout.
    #[serde(with = "duration_ms")]
    pub connect_timeout: Duration,
    /// User agent string.
    pub user_agent: String,
    /// Maximum idle connections per host.
    pub pool_max_idle_per_host: usize,
    /// Enable gzip decompression.
    pub gzip: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            user_agent: format!("courier/{}", env!("CARGO_PKG_VERSION")),
            pool_max_idle_per_host: 10,
            gzip: true,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Build a configured reqwest client.
pub fn build_client(config: &TransportConfig) -> Result<Client, ClientError> {
    let mut builder = ClientBuilder::new()
        .connect_timeout(config.connect_timeout)
        .user_agent(&config.user_agent)
        .pool_max_idle_per_host(config.pool_max_idle_per_host);

    if config.gzip {
        builder = builder.gzip(true);
    }

    builder.build().map_err(ClientError::TransportBuild)
}

/// `Transport` over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    inner: Client,
}

impl ReqwestTransport {
    /// Create a transport with default settings.
    pub fn new() -> Result<Self, ClientError> {
        Self::with_config(&TransportConfig::default())
    }

    /// Create a transport with custom settings.
    pub fn with_config(config: &TransportConfig) -> Result<Self, ClientError> {
        Ok(Self {
            inner: build_client(config)?,
        })
    }

    /// Wrap an existing client, sharing its connection pool.
    pub fn from_client(inner: Client) -> Self {
        Self { inner }
    }

    /// Get the inner reqwest client.
    pub fn inner(&self) -> &Client {
        &self.inner
    }
}

/// Later entries replace earlier ones whose names match case-insensitively.
fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| TransportError::InvalidRequest(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::try_from(value.as_str())
            .map_err(|e| TransportError::InvalidRequest(format!("header value for {name}: {e}")))?;
        map.insert(name, value);
    }
    Ok(map)
}

fn collect_headers(headers: &HeaderMap) -> IndexMap<String, String> {
    let mut collected: IndexMap<String, String> = IndexMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        collected
            .entry(name.as_str().to_string())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    collected
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let mut headers = header_map(&request.headers)?;
        let url = reqwest::Url::parse(&request.url)
            .map_err(|e| TransportError::InvalidRequest(format!("url {:?}: {e}", request.url)))?;

        let mut builder = self
            .inner
            .request(request.method.clone(), url)
            .timeout(request.timeout);

        if let Some(body) = &request.body {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(names::CONTENT_TYPE_JSON));
            }
            let bytes = serde_json::to_vec(body)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            builder = builder.body(bytes);
        }

        let response = builder.headers(headers).send().await.map_err(|e| {
            match TransportError::from(e) {
                TransportError::Timeout(_) => TransportError::Timeout(request.timeout),
                other => other,
            }
        })?;

        let status = response.status().as_u16();
        let headers = collect_headers(response.headers());
        let body = response.bytes().await.map_err(|e| match TransportError::from(e) {
            TransportError::Timeout(_) => TransportError::Timeout(request.timeout),
            other => other,
        })?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
