use crate::redact::mask_sent_tokens;
use crate::store::StoreError;
use crate::types::{FailureKind, FailureReport};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Connect, DNS, reset or timeout, including a response body that could
    /// not be read to the end.
    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),
    #[error("{message}")]
    Http { status: u16, message: String },
    #[error("session expired; sign in again")]
    SessionInvalidated,
    #[error("invalid response body: {0}")]
    Decode(String),
    #[error("not signed in")]
    Unauthenticated,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("credential store error: {0}")]
    Store(#[from] StoreError),
}

impl ApiError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network(_) => FailureKind::Network,
            Self::Http { .. } => FailureKind::Http,
            Self::SessionInvalidated => FailureKind::SessionInvalidated,
            Self::Decode(_) => FailureKind::Decode,
            Self::Unauthenticated => FailureKind::Unauthenticated,
            Self::InvalidRequest(_) => FailureKind::InvalidRequest,
            Self::Store(_) => FailureKind::Store,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Network(e) if e.is_timeout())
    }

    pub fn report(&self) -> FailureReport {
        FailureReport {
            kind: self.kind(),
            status: self.status(),
            message: self.to_string(),
            occurred_at: now_iso(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

pub(crate) fn now_iso() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

fn read_message_field(root: &serde_json::Map<String, Value>, key: &str) -> Option<String> {
    let s = root.get(key)?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

/// Best-effort human message for a non-2xx response.
///
/// Order: JSON `error`, JSON `message`, raw body, generic status line.
pub fn extract_message(status: u16, body: &str) -> String {
    if let Ok(Value::Object(root)) = serde_json::from_str::<Value>(body) {
        if let Some(msg) = read_message_field(&root, "error") {
            return msg;
        }
        if let Some(msg) = read_message_field(&root, "message") {
            return msg;
        }
    }

    let raw = body.trim();
    if raw.is_empty() {
        format!("HTTP error! status: {status}")
    } else {
        raw.to_string()
    }
}

/// `sent` is the token the failing request carried; an echo of it is masked.
pub(crate) fn http_failure(status: u16, body: &str, sent: Option<&str>) -> ApiError {
    let message = extract_message(status, body);
    let message = match sent {
        Some(token) => mask_sent_tokens(&message, &[token]).into_owned(),
        None => message,
    };
    ApiError::Http { status, message }
}
