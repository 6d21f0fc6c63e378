//! Resilient HTTP client for Courier.
//!
//! Requests merge the client's default headers with per-request overrides,
//! idempotent requests are retried on network faults and 5xx responses, and
//! every outcome comes back as a [`ResponseEnvelope`].

pub mod client;
pub mod config;
pub mod error;
pub mod headers;
pub mod response;
pub mod retry;
pub mod transport;

pub use client::{HttpClient, RequestConfig};
pub use config::{ConfigError, HttpClientConfig, HttpClientSettings, DEFAULT_TIMEOUT};
pub use error::ClientError;
pub use headers::{header_set, HeaderScalar, HeaderSet, HeaderStore, DEFAULT_HEADERS};
pub use response::{ApiMessage, ErrorKind, ErrorResponse, ResponseEnvelope, SuccessResponse};
pub use retry::{
    is_idempotent_method, Attempt, AttemptFailure, ExponentialBackoff, RetryDelay, RetryPolicy,
    DEFAULT_RETRIES,
};
pub use transport::{
    ReqwestTransport, Transport, TransportConfig, TransportError, TransportRequest,
    TransportResponse,
};

pub use reqwest::Method;
