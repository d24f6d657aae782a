//! Request descriptors
//!
//! A [`RequestDescriptor`] is the logical description of one API call. It is
//! built per call, handed through the request interceptors (each may return a
//! modified copy) and cloned verbatim when a request has to be replayed.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::impl_wire_names;

/// HTTP verbs used by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Whether automatic retries are enabled for this verb by default.
    pub fn retries_by_default(&self) -> bool {
        matches!(self, Self::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the response body should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    Json,
    Text,
    Binary,
}

impl_wire_names!(ResponseType {
    Json => "json",
    Text => "text",
    Binary => "binary",
});

/// One part of a multipart upload.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text { name: String, value: String },
    File { name: String, filename: String, content_type: Option<String>, data: Vec<u8> },
}

impl FormPart {
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Text { name: name.into(), value: value.into() }
    }

    pub fn file(name: impl Into<String>, filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self::File { name: name.into(), filename: filename.into(), content_type: None, data }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// Request payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    /// Plain object, serialized as JSON.
    Json(Value),
    /// Binary payload sent as-is.
    Bytes { data: Vec<u8>, content_type: Option<String> },
    /// Multipart form; the transport chooses the boundary.
    Multipart(Vec<FormPart>),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Logical description of a single API call.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Endpoint relative to the configured base URL, or an absolute URL.
    pub path: String,
    pub query: Vec<(String, String)>,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
    /// Overrides the configured default timeout.
    pub timeout: Option<Duration>,
    /// Explicit retry opt-in/opt-out. `None` falls back to the verb default.
    pub retry: Option<bool>,
    /// Additional attempts after the first failure.
    pub retries: Option<u32>,
    pub retry_delay: Option<Duration>,
    pub response_type: Option<ResponseType>,
    /// Skip bearer-token injection and refresh handling.
    pub skip_auth: bool,
    /// Set once the request has been replayed after an auth refresh.
    pub retried: bool,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
            timeout: None,
            retry: None,
            retries: None,
            retry_delay: None,
            response_type: None,
            skip_auth: false,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::Put, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::Patch, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn bytes(mut self, data: Vec<u8>, content_type: Option<String>) -> Self {
        self.body = RequestBody::Bytes { data, content_type };
        self
    }

    pub fn multipart(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_header(name, value);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Opt in to retries with an explicit budget and delay.
    pub fn with_retry(mut self, retries: u32, delay: Duration) -> Self {
        self.retry = Some(true);
        self.retries = Some(retries);
        self.retry_delay = Some(delay);
        self
    }

    pub fn no_retry(mut self) -> Self {
        self.retry = Some(false);
        self
    }

    pub fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = Some(response_type);
        self
    }

    pub fn skip_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn remove_header(&mut self, name: &str) -> Option<String> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Bearer token carried by the request, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header_value("authorization").and_then(|v| v.strip_prefix("Bearer "))
    }

    /// Whether the retry policy applies to this request.
    pub fn retry_enabled(&self) -> bool {
        self.retry.unwrap_or_else(|| self.method.retries_by_default())
    }
}
