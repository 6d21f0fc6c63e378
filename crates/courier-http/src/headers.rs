//! Default header storage and per-request header resolution.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Common HTTP header names and values.
pub mod names {
    pub const ACCEPT: &str = "Accept";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CONTENT_TYPE_JSON: &str = "application/json";
    pub const ACCEPT_ANY: &str = "application/json, text/plain, */*";
}

/// Headers every client starts with, before constructor headers are applied.
pub const DEFAULT_HEADERS: &[(&str, &str)] = &[(names::ACCEPT, names::ACCEPT_ANY)];

/// A scalar header value. Coerced to its string form on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl fmt::Display for HeaderScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderScalar::Bool(b) => write!(f, "{b}"),
            HeaderScalar::Int(i) => write!(f, "{i}"),
            HeaderScalar::Float(x) => write!(f, "{x}"),
            HeaderScalar::String(s) => f.write_str(s),
        }
    }
}

impl From<&str> for HeaderScalar {
    fn from(value: &str) -> Self {
        HeaderScalar::String(value.to_string())
    }
}

impl From<String> for HeaderScalar {
    fn from(value: String) -> Self {
        HeaderScalar::String(value)
    }
}

impl From<bool> for HeaderScalar {
    fn from(value: bool) -> Self {
        HeaderScalar::Bool(value)
    }
}

impl From<f64> for HeaderScalar {
    fn from(value: f64) -> Self {
        HeaderScalar::Float(value)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for HeaderScalar {
                fn from(value: $t) -> Self {
                    HeaderScalar::Int(i64::from(value))
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

/// Insertion-ordered header name to value mapping. Names are case-sensitive.
pub type HeaderSet = IndexMap<String, HeaderScalar>;

/// Build a `HeaderSet` from name/value pairs, later pairs overwriting earlier ones.
pub fn header_set<I, K, V>(pairs: I) -> HeaderSet
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<HeaderScalar>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A client's default header set.
///
/// Last write wins for every key, and the latest write is moved to the end so
/// it also wins on the wire, where names differing only in case collapse into
/// one header. No validation of names or values happens here; the transport
/// rejects what it cannot send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeaderStore {
    headers: HeaderSet,
}

impl HeaderStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `DEFAULT_HEADERS`.
    pub fn with_defaults() -> Self {
        Self {
            headers: header_set(DEFAULT_HEADERS.iter().copied()),
        }
    }

    /// Insert or overwrite one header.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<HeaderScalar>) {
        let name = name.into();
        self.headers.shift_remove(&name);
        self.headers.insert(name, value.into());
    }

    /// Current value of a header, if any.
    pub fn get(&self, name: &str) -> Option<&HeaderScalar> {
        self.headers.get(name)
    }

    /// Merge a batch key by key, overwriting on conflict.
    pub fn append(&mut self, headers: &HeaderSet) {
        for (name, value) in headers {
            self.set(name.clone(), value.clone());
        }
    }

    /// Remove a header, returning its previous value.
    pub fn remove(&mut self, name: &str) -> Option<HeaderScalar> {
        self.headers.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Owned copy of the current contents.
    pub fn snapshot(&self) -> HeaderSet {
        self.headers.clone()
    }

    /// Snapshot overlaid by `overrides`; overrides win on conflict.
    ///
    /// An override also drops every stored header whose name matches it
    /// case-insensitively.
    pub fn resolve(&self, overrides: Option<&HeaderSet>) -> HeaderSet {
        let mut resolved = self.snapshot();
        if let Some(overrides) = overrides {
            resolved.retain(|name, _| !overrides.keys().any(|o| o.eq_ignore_ascii_case(name)));
            for (name, value) in overrides {
                resolved.insert(name.clone(), value.clone());
            }
        }
        resolved
    }
}

impl From<HeaderSet> for HeaderStore {
    fn from(headers: HeaderSet) -> Self {
        Self { headers }
    }
}

/// Wire form of a resolved header set.
pub fn to_wire(headers: &HeaderSet) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| (name.clone(), value.to_string()))
        .collect()
}
