//! Response envelopes and outcome classification.
//!
//! Every terminal outcome of a request becomes exactly one of
//! [`SuccessResponse`] or [`ErrorResponse`]. A message embedded in the body
//! beats the canonical status message, and a `success: false` embedded in a
//! 2xx body beats the status.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::retry::Outcome;
use crate::transport::{TransportError, TransportResponse};

/// Canonical messages, used when the backend supplies none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiMessage {
    NetworkError,
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    UnprocessableEntity,
    InternalServerError,
    UnknownError,
}

impl ApiMessage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMessage::NetworkError => "Network Error",
            ApiMessage::BadRequest => "Bad Request",
            ApiMessage::Unauthorized => "Unauthorized",
            ApiMessage::Forbidden => "Forbidden",
            ApiMessage::NotFound => "Resource Not Found",
            ApiMessage::UnprocessableEntity => "Unprocessable Entity",
            ApiMessage::InternalServerError => "Internal Server Error",
            ApiMessage::UnknownError => "An Unknown Error Occurred",
        }
    }

    /// Table entry for a non-2xx status; unmapped codes get `UnknownError`.
    pub fn for_status(status: u16) -> Self {
        match status {
            400 => ApiMessage::BadRequest,
            401 => ApiMessage::Unauthorized,
            403 => ApiMessage::Forbidden,
            404 => ApiMessage::NotFound,
            422 => ApiMessage::UnprocessableEntity,
            500 => ApiMessage::InternalServerError,
            _ => ApiMessage::UnknownError,
        }
    }
}

impl fmt::Display for ApiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What went wrong, for callers that branch beyond `success`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A non-2xx response arrived.
    Http,
    /// Dispatched, but no response arrived.
    Network,
    /// The transport could not form the request.
    Unknown,
}

/// A 2xx response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuccessResponse {
    /// `false` only when the body itself reports `success: false`.
    pub success: bool,
    pub status: u16,
    pub headers: IndexMap<String, String>,
    /// Decoded body: JSON when it parses, otherwise the text as a string, `null` when empty.
    #[serde(rename = "data")]
    pub body: Value,
}

impl SuccessResponse {
    /// Decode the body into a typed value.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.body)
    }
}

/// A failed request.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    #[serde(serialize_with = "always_false")]
    success: (),
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(rename = "data", skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
    #[serde(skip)]
    pub kind: ErrorKind,
    #[serde(skip)]
    pub source: Option<Arc<TransportError>>,
}

fn always_false<S: Serializer>(_: &(), s: S) -> Result<S::Ok, S::Error> {
    s.serialize_bool(false)
}

impl ErrorResponse {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: (),
            message: message.into(),
            status: None,
            body: None,
            kind,
            source: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_body(mut self, body: Option<Value>) -> Self {
        self.body = body;
        self
    }

    pub fn with_source(mut self, source: Arc<TransportError>) -> Self {
        self.source = Some(source);
        self
    }
}

impl PartialEq for ErrorResponse {
    fn eq(&self, other: &Self) -> bool {
        self.message == other.message
            && self.status == other.status
            && self.body == other.body
            && self.kind == other.kind
    }
}

/// The uniform result of every request. Exactly one variant is active.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResponseEnvelope {
    Success(SuccessResponse),
    Error(ErrorResponse),
}

impl ResponseEnvelope {
    /// The `success` flag callers branch on.
    pub fn is_success(&self) -> bool {
        match self {
            ResponseEnvelope::Success(ok) => ok.success,
            ResponseEnvelope::Error(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ResponseEnvelope::Success(ok) => Some(ok.status),
            ResponseEnvelope::Error(err) => err.status,
        }
    }

    pub fn data(&self) -> Option<&Value> {
        match self {
            ResponseEnvelope::Success(ok) => Some(&ok.body),
            ResponseEnvelope::Error(err) => err.body.as_ref(),
        }
    }

    /// Message of an error envelope.
    pub fn message(&self) -> Option<&str> {
        match self {
            ResponseEnvelope::Success(_) => None,
            ResponseEnvelope::Error(err) => Some(&err.message),
        }
    }

    /// Split by variant. A 2xx whose body reports `success: false` is still `Ok`.
    pub fn into_result(self) -> Result<SuccessResponse, ErrorResponse> {
        match self {
            ResponseEnvelope::Success(ok) => Ok(ok),
            ResponseEnvelope::Error(err) => Err(err),
        }
    }
}

/// Decode a raw body: empty is `None`, JSON is parsed, anything else is kept as text.
pub fn decode_body(bytes: &[u8]) -> Option<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return None;
    }
    match serde_json::from_slice(bytes) {
        Ok(value) => Some(value),
        Err(_) => Some(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}

fn body_message(body: Option<&Value>) -> Option<&str> {
    body?
        .get("message")?
        .as_str()
        .filter(|message| !message.is_empty())
}

fn body_reports_failure(body: &Value) -> bool {
    matches!(body.get("success"), Some(Value::Bool(false)))
}

/// Classify a received response.
pub fn normalize_response(response: TransportResponse) -> ResponseEnvelope {
    let body = decode_body(&response.body);

    if response.is_success() {
        let body = body.unwrap_or(Value::Null);
        return ResponseEnvelope::Success(SuccessResponse {
            success: !body_reports_failure(&body),
            status: response.status,
            headers: response.headers,
            body,
        });
    }

    let message = body_message(body.as_ref())
        .map(str::to_string)
        .unwrap_or_else(|| ApiMessage::for_status(response.status).to_string());

    ResponseEnvelope::Error(
        ErrorResponse::new(ErrorKind::Http, message)
            .with_status(response.status)
            .with_body(body),
    )
}

/// Classify a fault raised with no response.
pub fn normalize_fault(fault: Arc<TransportError>) -> ResponseEnvelope {
    let envelope = if fault.is_network() {
        ErrorResponse::new(ErrorKind::Network, ApiMessage::NetworkError.as_str())
    } else {
        ErrorResponse::new(ErrorKind::Unknown, ApiMessage::UnknownError.as_str())
    };
    ResponseEnvelope::Error(envelope.with_source(fault))
}

/// Classify the terminal outcome of the retry loop.
pub fn normalize(outcome: Outcome) -> ResponseEnvelope {
    match outcome {
        Ok(response) => normalize_response(response),
        Err(fault) => normalize_fault(fault),
    }
}
