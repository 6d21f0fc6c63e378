//! Errors raised before a request reaches the network.
//!
//! Anything that happens after dispatch is folded into a
//! [`ResponseEnvelope`](crate::ResponseEnvelope) instead.

use std::time::Duration;

use crate::config::ConfigError;

/// Pre-dispatch failures: misconfiguration and programming errors.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("invalid client configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to serialize request body: {0}")]
    Serialization(#[source] serde_json::Error),

    #[error("invalid request timeout: {0:?}")]
    InvalidTimeout(Duration),

    #[error("failed to build HTTP transport: {0}")]
    TransportBuild(#[source] reqwest::Error),
}
