use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Access/refresh token pair for one authenticated session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, refresh_token: Option<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
        }
    }

    /// Builds a credential from a login or refresh response body.
    ///
    /// `previous_refresh` is kept when the server does not rotate the refresh token.
    pub fn from_token_response(json: &Value, previous_refresh: Option<&str>) -> Option<Self> {
        let root = json.as_object()?;
        let access_token = ["token", "access_token", "accessToken"]
            .iter()
            .find_map(|key| read_token(root.get(*key)))?;
        let refresh_token = ["refresh_token", "refreshToken"]
            .iter()
            .find_map(|key| read_token(root.get(*key)))
            .or_else(|| previous_refresh.map(|s| s.to_string()));

        Some(Self {
            access_token,
            refresh_token,
        })
    }
}

fn read_token(value: Option<&Value>) -> Option<String> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"REDACTED")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "REDACTED"),
            )
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// Attach the stored credential when there is one.
    #[default]
    Attach,
    /// Fail without touching the network when nothing is stored.
    Require,
    /// Never attach a credential (login, registration).
    Skip,
}

/// One HTTP call against the configured backend. Replayable as-is.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    body: Option<Value>,
    headers: HeaderMap,
    auth: AuthMode,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            headers: HeaderMap::new(),
            auth: AuthMode::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serializes `body` as the JSON payload.
    pub fn with_json<B: Serialize + ?Sized>(self, body: &B) -> Result<Self, serde_json::Error> {
        Ok(self.with_body(serde_json::to_value(body)?))
    }

    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth: AuthMode) -> Self {
        self.auth = auth;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn auth(&self) -> AuthMode {
        self.auth
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Network,
    Http,
    SessionInvalidated,
    Decode,
    Unauthenticated,
    InvalidRequest,
    Store,
}

/// Renderable view of a failed call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub message: String,
    pub occurred_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_token_response_accepts_known_access_token_keys() {
        for key in ["token", "access_token", "accessToken"] {
            let mut root = serde_json::Map::new();
            root.insert(key.to_string(), json!("abc"));
            let body = Value::Object(root);
            let cred = Credential::from_token_response(&body, None).unwrap();
            assert_eq!(cred.access_token, "abc");
            assert_eq!(cred.refresh_token, None);
        }
    }

    #[test]
    fn from_token_response_keeps_previous_refresh_token_unless_rotated() {
        let body = json!({ "token": "new" });
        let cred = Credential::from_token_response(&body, Some("r1")).unwrap();
        assert_eq!(cred.refresh_token.as_deref(), Some("r1"));

        let body = json!({ "accessToken": "new", "refreshToken": "r2" });
        let cred = Credential::from_token_response(&body, Some("r1")).unwrap();
        assert_eq!(cred.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn from_token_response_rejects_missing_or_blank_tokens() {
        assert!(Credential::from_token_response(&json!({ "token": "  " }), None).is_none());
        assert!(Credential::from_token_response(&json!({ "ok": true }), None).is_none());
        assert!(Credential::from_token_response(&json!(["token"]), None).is_none());
    }

    #[test]
    fn credential_debug_hides_tokens() {
        let cred = Credential::new("secret-access", Some("secret-refresh".to_string()));
        let out = format!("{cred:?}");
        assert!(!out.contains("secret-access"));
        assert!(!out.contains("secret-refresh"));
    }

    #[test]
    fn descriptor_defaults_to_attach_without_body() {
        let d = RequestDescriptor::get("/orders/abc");
        assert_eq!(*d.method(), Method::GET);
        assert_eq!(d.path(), "/orders/abc");
        assert!(d.body().is_none());
        assert_eq!(d.auth(), AuthMode::Attach);
    }

    #[test]
    fn failure_report_serializes_camel_case() {
        let report = FailureReport {
            kind: FailureKind::SessionInvalidated,
            status: None,
            message: "Session expired.".to_string(),
            occurred_at: "2026-01-01T00:00:00Z".to_string(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "session_invalidated");
        assert_eq!(json["occurredAt"], "2026-01-01T00:00:00Z");
        assert!(json.get("status").is_none());
    }
}
