//! Error taxonomy for TechHub API calls.

use thiserror::Error;

/// Errors returned by the TechHub HTTP API, classified by status code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests, please try again later")]
    RateLimited,

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Classify a non-success response from its status code and raw body.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|value| extract_error_message(&value))
            .unwrap_or_else(|| {
                let trimmed = body.trim();
                if trimmed.is_empty() {
                    format!("request failed with status {}", status)
                } else {
                    trimmed.to_string()
                }
            });

        match status {
            400 | 422 => ApiError::Validation(message),
            401 => ApiError::Unauthorized(message),
            403 => ApiError::Forbidden(message),
            404 => ApiError::NotFound(message),
            409 => ApiError::Conflict(message),
            429 => ApiError::RateLimited,
            _ => ApiError::Server { status, message },
        }
    }

    /// True when the server rejected the credentials carried by the request.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, ApiError::Unauthorized(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

/// Pull a user-facing message out of an error payload.
///
/// Understands `{"detail": "..."}`, `{"message": "..."}` and the field-level
/// form `{"detail": [{"loc": [...], "msg": "..."}]}`, which is flattened into a
/// single `"; "`-separated string.
pub fn extract_error_message(body: &serde_json::Value) -> Option<String> {
    if let Some(detail) = body.get("detail") {
        match detail {
            serde_json::Value::String(s) if !s.is_empty() => return Some(s.clone()),
            serde_json::Value::Array(entries) => {
                let messages: Vec<String> = entries.iter().filter_map(field_message).collect();
                if !messages.is_empty() {
                    return Some(messages.join("; "));
                }
            }
            _ => {}
        }
    }

    body.get("message")
        .and_then(|m| m.as_str())
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

fn field_message(entry: &serde_json::Value) -> Option<String> {
    let msg = entry.get("msg").and_then(|m| m.as_str())?;
    // The first element of `loc` is the request part ("body", "query"), skip it.
    let field = entry
        .get("loc")
        .and_then(|loc| loc.as_array())
        .and_then(|loc| loc.iter().skip(1).last())
        .and_then(|f| f.as_str());
    Some(match field {
        Some(field) => format!("{}: {}", field, msg),
        None => msg.to_string(),
    })
}
