//! Client configuration: the programmatic builder and its file/env-loadable subset.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::headers::{HeaderScalar, HeaderSet};
use crate::retry::{AttemptFailure, MethodPredicate, RetryDelay, RetryObserver, DEFAULT_RETRIES};
use crate::transport::TransportConfig;

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Environment variable names.
pub mod vars {
    pub const COURIER_BASE_URL: &str = "COURIER_BASE_URL";
    pub const COURIER_TIMEOUT_MS: &str = "COURIER_TIMEOUT_MS";
    pub const COURIER_RETRIES: &str = "COURIER_RETRIES";
}

/// Config loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("failed to read config: {source}")]
    ReadError {
        #[from]
        source: std::io::Error,
    },

    #[error("invalid YAML at line {}: {message}", line.map(|l| l.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    ParseError { line: Option<usize>, message: String },

    #[error("validation error: {message}")]
    Validation { message: String },

    #[error("required environment variable not set: {var}")]
    MissingEnv { var: String },

    #[error("invalid value for {var}: {message}")]
    InvalidEnv { var: String, message: String },
}

/// The serialisable part of a client's configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpClientSettings {
    /// Prefix for all relative paths.
    pub base_url: String,
    /// Seeds the client's default headers.
    #[serde(default)]
    pub headers: HeaderSet,
    /// Per-attempt timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Retries after the first attempt.
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default)]
    pub transport: TransportConfig,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT.as_millis() as u64
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

impl HttpClientSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            headers: HeaderSet::new(),
            timeout_ms: default_timeout_ms(),
            retries: DEFAULT_RETRIES,
            transport: TransportConfig::default(),
        }
    }

    /// Parse settings from YAML text.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(contents).map_err(|e| ConfigError::ParseError {
            line: e.location().map(|l| l.line()),
            message: e.to_string(),
        })
    }

    /// Load settings from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    /// Load settings from `COURIER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var(vars::COURIER_BASE_URL).map_err(|_| ConfigError::MissingEnv {
            var: vars::COURIER_BASE_URL.to_string(),
        })?;
        let mut settings = Self::new(base_url);

        if let Some(timeout_ms) = env_number(vars::COURIER_TIMEOUT_MS)? {
            settings.timeout_ms = timeout_ms;
        }
        if let Some(retries) = env_number(vars::COURIER_RETRIES)? {
            settings.retries = retries;
        }

        Ok(settings)
    }

    /// Expand into a full client configuration.
    pub fn into_config(self) -> HttpClientConfig {
        HttpClientConfig {
            base_url: self.base_url,
            headers: self.headers,
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
            retry_delay: RetryDelay::default(),
            on_retry: None,
            retryable_methods: None,
            transport: self.transport,
        }
    }
}

fn env_number<T: std::str::FromStr>(var: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(v) => v.trim().parse().map(Some).map_err(|_| ConfigError::InvalidEnv {
            var: var.to_string(),
            message: "expected a non-negative integer".to_string(),
        }),
        Err(_) => Ok(None),
    }
}

/// Everything an `HttpClient` is built from.
#[derive(Clone)]
pub struct HttpClientConfig {
    pub base_url: String,
    pub headers: HeaderSet,
    pub timeout: Duration,
    pub retries: u32,
    pub retry_delay: RetryDelay,
    pub on_retry: Option<RetryObserver>,
    /// Overrides the default idempotent-method predicate.
    pub retryable_methods: Option<MethodPredicate>,
    pub transport: TransportConfig,
}

impl std::fmt::Debug for HttpClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClientConfig")
            .field("base_url", &self.base_url)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("on_retry", &self.on_retry.is_some())
            .field("retryable_methods", &self.retryable_methods.is_some())
            .field("transport", &self.transport)
            .finish()
    }
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpClientSettings::new(base_url).into_config()
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
        self.timeout = timeout;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: RetryDelay) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn on_retry<F>(mut self, observer: F) -> Self
    where
        F: Fn(u32, &AttemptFailure) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(observer));
        self
    }

    pub fn retryable_methods<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&reqwest::Method) -> bool + Send + Sync + 'static,
    {
        self.retryable_methods = Some(Arc::new(predicate));
        self
    }

    pub fn transport(mut self, transport: TransportConfig) -> Self {
        self.transport = transport;
        self
    }

    /// Reject configurations that could never dispatch a request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = url::Url::parse(&self.base_url).map_err(|e| ConfigError::Validation {
            message: format!("base_url {:?} is not a valid URL: {e}", self.base_url),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation {
                message: format!("base_url scheme must be http or https, got {}", url.scheme()),
            });
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
