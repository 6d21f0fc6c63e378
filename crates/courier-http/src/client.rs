//! The client facade.

use parking_lot::RwLock;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::config::HttpClientConfig;
use crate::error::ClientError;
use crate::headers::{to_wire, HeaderScalar, HeaderSet, HeaderStore};
use crate::response::{normalize, ResponseEnvelope};
use crate::retry::RetryPolicy;
use crate::transport::{ReqwestTransport, Transport, TransportError, TransportRequest};

/// Per-request overrides.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Overlaid on the client's default headers; these win on conflict.
    pub headers: HeaderSet,
    /// Replaces the client's per-attempt timeout.
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderScalar>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers(mut self, headers: HeaderSet) -> Self {
        self.headers.extend(headers);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// HTTP client returning a [`ResponseEnvelope`] for every dispatched request.
///
/// Remote and network failures never surface as `Err`; only problems found
/// before dispatch do. Default headers may be changed while requests are in
/// flight; each request works on the snapshot taken when it was issued.
pub struct HttpClient {
    base_url: String,
    headers: RwLock<HeaderStore>,
    retry: RetryPolicy,
    timeout: Duration,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.base_url)
            .field("headers", &*self.headers.read())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a client over its own reqwest transport.
    pub fn new(config: HttpClientConfig) -> Result<Self, ClientError> {
        let transport = ReqwestTransport::with_config(&config.transport)?;
        Self::with_transport(config, Arc::new(transport))
    }

    /// Create a client over a shared transport.
    pub fn with_transport(
        config: HttpClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, ClientError> {
        config.validate()?;

        let mut headers = HeaderStore::with_defaults();
        headers.append(&config.headers);

        let mut retry = RetryPolicy::new(config.retries)
            .with_delay(config.retry_delay)
            .with_observer(config.on_retry);
        if let Some(predicate) = config.retryable_methods {
            retry = retry.with_method_predicate(move |method| predicate(method));
        }

        Ok(Self {
            base_url: config.base_url,
            headers: RwLock::new(headers),
            retry,
            timeout: config.timeout,
            transport,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Set a default header for all subsequent requests.
    pub fn set_header(&self, name: impl Into<String>, value: impl Into<HeaderScalar>) {
        self.headers.write().set(name, value);
    }

    /// Merge default headers, overwriting on conflict.
    pub fn append_headers(&self, headers: &HeaderSet) {
        self.headers.write().append(headers);
    }

    pub fn remove_header(&self, name: &str) -> Option<HeaderScalar> {
        self.headers.write().remove(name)
    }

    pub fn header(&self, name: &str) -> Option<HeaderScalar> {
        self.headers.read().get(name).cloned()
    }

    /// Snapshot of the default headers.
    pub fn headers(&self) -> HeaderSet {
        self.headers.read().snapshot()
    }

    /// Build the URL.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        let base = self.base_url.trim_end_matches('/');
        match path.trim_start_matches('/') {
            "" => base.to_string(),
            path => format!("{base}/{path}"),
        }
    }

    pub async fn get(
        &self,
        path: &str,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        self.request(Method::GET, path, None, config).await
    }

    pub async fn head(
        &self,
        path: &str,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        self.request(Method::HEAD, path, None, config).await
    }

    pub async fn options(
        &self,
        path: &str,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        self.request(Method::OPTIONS, path, None, config).await
    }

    pub async fn delete(
        &self,
        path: &str,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        self.request(Method::DELETE, path, None, config).await
    }

    /// POST a JSON body. A body serialising to `null` sends no body.
    pub async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        let body = json_body(body)?;
        self.request(Method::POST, path, body, config).await
    }

    pub async fn put<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        let body = json_body(body)?;
        self.request(Method::PUT, path, body, config).await
    }

    pub async fn patch<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        let body = json_body(body)?;
        self.request(Method::PATCH, path, body, config).await
    }

    /// Issue a request with any method.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        config: Option<&RequestConfig>,
    ) -> Result<ResponseEnvelope, ClientError> {
        let timeout = match config.and_then(|c| c.timeout) {
            Some(timeout) if timeout.is_zero() => return Err(ClientError::InvalidTimeout(timeout)),
            Some(timeout) => timeout,
            None => self.timeout,
        };

        let headers = self.headers.read().resolve(config.map(|c| &c.headers));
        let request = TransportRequest {
            method: method.clone(),
            url: self.url(path),
            headers: to_wire(&headers),
            body,
            timeout,
        };

        let span = tracing::debug_span!("http_request", %method, url = %request.url);
        async move {
            tracing::debug!("dispatching request");

            let outcome = self
                .retry
                .run(&method, |attempt| {
                    let request = request.clone();
                    let transport = Arc::clone(&self.transport);
                    async move {
                        tracing::trace!(attempt = attempt.number, "sending attempt");
                        match tokio::time::timeout(timeout, transport.send(request)).await {
                            Ok(result) => result,
                            Err(_) => Err(TransportError::Timeout(timeout)),
                        }
                    }
                })
                .await;

            let envelope = normalize(outcome);
            tracing::debug!(
                success = envelope.is_success(),
                status = ?envelope.status(),
                "request finished"
            );
            Ok(envelope)
        }
        .instrument(span)
        .await
    }
}

fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<Option<Value>, ClientError> {
    match serde_json::to_value(body).map_err(ClientError::Serialization)? {
        Value::Null => Ok(None),
        value => Ok(Some(value)),
    }
}
