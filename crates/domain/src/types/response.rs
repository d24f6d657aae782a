//! Parsed API responses

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::errors::ApiError;

/// Response body interpreted by content type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
    Binary(Vec<u8>),
}

/// A successful (2xx) response after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are stored lowercase.
    pub headers: BTreeMap<String, String>,
    pub body: ResponseBody,
}

impl ApiResponse {
    pub fn new(status: u16, body: ResponseBody) -> Self {
        Self { status, headers: BTreeMap::new(), body }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Deserialize the body into `T`.
    ///
    /// Empty bodies (204/205) deserialize from `null`, so `()` and `Option<_>`
    /// targets succeed.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let value = match &self.body {
            ResponseBody::Json(value) => value.clone(),
            ResponseBody::Empty => Value::Null,
            ResponseBody::Text(text) => Value::String(text.clone()),
            ResponseBody::Binary(_) => {
                return Err(ApiError::Decode(
                    "binary response cannot be deserialized as JSON".to_string(),
                ))
            }
        };

        serde_json::from_value(value).map_err(|e| {
            ApiError::Decode(format!("Failed to parse response ({}): {}", self.status, e))
        })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.body {
            ResponseBody::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match &self.body {
            ResponseBody::Binary(data) => Some(data),
            _ => None,
        }
    }
}
