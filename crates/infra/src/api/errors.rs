//! Response classification
//!
//! Converts raw transport results into the domain error taxonomy and parses
//! successful bodies. Every error is built here, once.

use std::time::Duration;

use rentline_core::{TransportError, TransportResponse};
use rentline_domain::constants::HEADER_RETRY_AFTER;
use rentline_domain::{ApiError, ResponseBody, ResponseType};
use serde_json::Value;

/// Map a failure that produced no response.
pub fn from_transport(err: TransportError) -> ApiError {
    match err {
        TransportError::Timeout(after) => ApiError::Timeout(after),
        TransportError::Connect(message) | TransportError::Request(message) => {
            ApiError::Network(message)
        }
    }
}

/// Build the typed error for a non-2xx response.
pub fn classify_status(response: &TransportResponse) -> ApiError {
    let status = response.status;
    let body = json_body(response);
    let message = body
        .as_ref()
        .and_then(extract_message)
        .or_else(|| text_body(response))
        .unwrap_or_else(|| default_message(status));

    match status {
        400 => ApiError::Validation { message, errors: body },
        401 => ApiError::Unauthorized { message },
        403 => ApiError::Forbidden { message },
        404 => ApiError::NotFound { message },
        429 => ApiError::RateLimited {
            message,
            retry_after: response.header(HEADER_RETRY_AFTER).and_then(parse_retry_after),
        },
        500..=599 => ApiError::Server { status, message, body },
        _ => ApiError::Http {
            status,
            message,
            body: body.or_else(|| text_body(response).map(Value::String)),
        },
    }
}

/// Parse a 2xx body by the declared response type, or by content type.
pub fn parse_body(
    response: &TransportResponse,
    declared: Option<ResponseType>,
) -> Result<ResponseBody, ApiError> {
    if response.body.is_empty() || matches!(response.status, 204 | 205) {
        return Ok(ResponseBody::Empty);
    }

    let response_type = declared.unwrap_or_else(|| observed_type(response.content_type()));

    match response_type {
        ResponseType::Json => serde_json::from_slice(&response.body)
            .map(ResponseBody::Json)
            .map_err(|e| {
                ApiError::Decode(format!("Invalid JSON in {} response: {}", response.status, e))
            }),
        ResponseType::Text => {
            Ok(ResponseBody::Text(String::from_utf8_lossy(&response.body).into_owned()))
        }
        ResponseType::Binary => Ok(ResponseBody::Binary(response.body.clone())),
    }
}

fn observed_type(content_type: Option<&str>) -> ResponseType {
    let Some(content_type) = content_type.map(str::to_ascii_lowercase) else {
        return ResponseType::Binary;
    };

    if content_type.contains("json") {
        ResponseType::Json
    } else if content_type.starts_with("text/")
        || content_type.contains("xml")
        || content_type.contains("javascript")
    {
        ResponseType::Text
    } else {
        ResponseType::Binary
    }
}

fn json_body(response: &TransportResponse) -> Option<Value> {
    if response.body.is_empty() {
        return None;
    }
    serde_json::from_slice(&response.body).ok()
}

fn text_body(response: &TransportResponse) -> Option<String> {
    let text = String::from_utf8_lossy(&response.body).trim().to_string();
    (!text.is_empty() && !text.starts_with('{') && !text.starts_with('[')).then_some(text)
}

/// Pull a human message out of a JSON error body.
///
/// Understands `{"detail": ...}`, `{"message": ...}`, `{"error": ...}`,
/// `{"non_field_errors": [...]}` and field maps `{"field": ["msg"]}`.
fn extract_message(body: &Value) -> Option<String> {
    for key in ["detail", "message", "error"] {
        if let Some(message) = body.get(key).and_then(first_string) {
            return Some(message);
        }
    }

    if let Some(message) = body.get("non_field_errors").and_then(first_string) {
        return Some(message);
    }

    body.as_object().and_then(|fields| {
        fields.iter().find_map(|(field, value)| {
            first_string(value).map(|message| format!("{field}: {message}"))
        })
    })
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_string),
        _ => None,
    }
}

fn default_message(status: u16) -> String {
    match status {
        400 => "Invalid request".to_string(),
        401 => "Authentication credentials were not provided or are invalid".to_string(),
        403 => "You do not have permission to perform this action".to_string(),
        404 => "The requested resource was not found".to_string(),
        429 => "Too many requests".to_string(),
        _ => format!("Request failed with status {status}"),
    }
}

/// `Retry-After` in delta-seconds form. HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
