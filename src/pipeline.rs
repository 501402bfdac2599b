//! Authenticated request pipeline.
//!
//! Every call attaches the stored bearer token, and a 401 on the first
//! attempt triggers at most one refresh followed by at most one replay. The
//! replay's result is final whatever its status.

use crate::error::{http_failure, ApiError};
use crate::redact::redact_secrets;
use crate::refresh::policy::{next_step, Attempt, CallState, Step};
use crate::refresh::{GateOutcome, RefreshClient, RefreshGate, RefreshJob};
use crate::settings::Settings;
use crate::store::{CredentialStore, CredentialVault};
use crate::types::{AuthMode, Credential, RequestDescriptor};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};

/// Called with the login redirect path when the session cannot be recovered.
///
/// Runs on the refresh task, once per invalidation, before the failing call
/// returns [`ApiError::SessionInvalidated`]. It must not block.
pub type SessionHook = Arc<dyn Fn(&str) + Send + Sync>;

pub(crate) struct Captured {
    pub(crate) status: StatusCode,
    pub(crate) body: String,
}

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    vault: CredentialVault,
    refresher: RefreshClient,
    gate: RefreshGate,
    login_redirect: String,
    logout_path: Option<String>,
    on_session_invalidated: Option<SessionHook>,
}

/// Cheap to clone; clones share the HTTP pool, vault and refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

pub struct ApiClientBuilder {
    settings: Settings,
    store: Arc<dyn CredentialStore>,
    on_session_invalidated: Option<SessionHook>,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn on_session_invalidated<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_session_invalidated = Some(Arc::new(hook));
        self
    }

    pub fn build(self) -> Result<ApiClient, ApiError> {
        let settings = self.settings;
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(ApiError::Network)?;

        let refresh_url = endpoint_url(&settings.base_url, &settings.refresh_path);
        let refresher = RefreshClient::new(http.clone(), refresh_url, settings.refresh_style);
        let vault = CredentialVault::new(
            self.store,
            settings.access_token_key,
            settings.refresh_token_key,
        );

        Ok(ApiClient {
            inner: Arc::new(Inner {
                http,
                base_url: settings.base_url,
                vault,
                refresher,
                gate: RefreshGate::default(),
                login_redirect: settings.login_redirect,
                logout_path: settings.logout_path,
                on_session_invalidated: self.on_session_invalidated,
            }),
        })
    }
}

/// Joins `path` onto the base URL, keeping any base path prefix.
pub(crate) fn endpoint_url(base: &Url, path: &str) -> Url {
    let (path, query) = match path.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path, None),
    };
    let joined = format!(
        "{}/{}",
        base.path().trim_end_matches('/'),
        path.trim_start_matches('/')
    );

    let mut url = base.clone();
    url.set_path(&joined);
    url.set_query(query.filter(|q| !q.is_empty()));
    url.set_fragment(None);
    url
}

fn build_headers(
    descriptor: &RequestDescriptor,
    credential: Option<&Credential>,
) -> Result<HeaderMap, ApiError> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    for (name, value) in descriptor.headers() {
        headers.insert(name.clone(), value.clone());
    }

    // The pipeline owns Authorization.
    headers.remove(AUTHORIZATION);
    if let Some(credential) = credential {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", credential.access_token))
            .map_err(|_| {
                ApiError::InvalidRequest("stored access token is not a valid header value".into())
            })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    Ok(headers)
}

fn decode<T: DeserializeOwned>(captured: &Captured) -> Result<T, ApiError> {
    let text = captured.body.trim();
    let text = if text.is_empty() { "null" } else { text };
    Ok(serde_json::from_str(text)?)
}

impl ApiClient {
    pub fn builder(settings: Settings, store: Arc<dyn CredentialStore>) -> ApiClientBuilder {
        ApiClientBuilder {
            settings,
            store,
            on_session_invalidated: None,
        }
    }

    pub fn new(settings: Settings, store: Arc<dyn CredentialStore>) -> Result<Self, ApiError> {
        Self::builder(settings, store).build()
    }

    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    pub fn vault(&self) -> &CredentialVault {
        &self.inner.vault
    }

    pub(crate) fn logout_path(&self) -> Option<&str> {
        self.inner.logout_path.as_deref()
    }

    /// Performs one logical call and decodes a 2xx body into `T`.
    ///
    /// An empty success body decodes as JSON `null`, so `()` and `Option<_>`
    /// work for 204 responses.
    ///
    /// # Errors
    ///
    /// See [`ApiError`]. A 401 on the replay after a refresh is returned as
    /// [`ApiError::Http`]; a failed refresh is [`ApiError::SessionInvalidated`].
    /// A refresh whose new credential cannot be stored is [`ApiError::Store`]
    /// and the call is not replayed.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<T, ApiError> {
        let credential = match descriptor.auth() {
            AuthMode::Skip => None,
            AuthMode::Attach | AuthMode::Require => self.inner.vault.load()?,
        };
        if credential.is_none() && descriptor.auth() == AuthMode::Require {
            debug!(
                path = descriptor.path(),
                state = CallState::Unauthenticated.as_str(),
                "no credential for a protected call"
            );
            return Err(ApiError::Unauthenticated);
        }

        let first = self
            .send(descriptor, credential.as_ref(), Attempt::First)
            .await?;
        let sent = credential.as_ref().map(|c| c.access_token.as_str());
        let step = next_step(first.status, Attempt::First, sent.is_some());
        if step == Step::Decode {
            return decode(&first);
        }
        let (Step::Refresh, Some(stale)) = (step, credential.as_ref()) else {
            return Err(http_failure(first.status.as_u16(), &first.body, sent));
        };

        debug!(
            path = descriptor.path(),
            state = step.next_state().as_str(),
            "access token rejected"
        );
        let fresh = match self.refresh_after_rejection(stale.access_token.clone()).await {
            GateOutcome::Refreshed(fresh) | GateOutcome::Reused(fresh) => fresh,
            GateOutcome::Unpersisted(err) => return Err(ApiError::Store(err)),
            GateOutcome::Invalidated | GateOutcome::AlreadyInvalidated => {
                debug!(
                    path = descriptor.path(),
                    state = CallState::SessionInvalidated.as_str(),
                    "giving up on call"
                );
                return Err(ApiError::SessionInvalidated);
            }
        };

        let replay = self.send(descriptor, Some(&fresh), Attempt::Replay).await?;
        match next_step(replay.status, Attempt::Replay, true) {
            Step::Decode => decode(&replay),
            Step::Refresh | Step::Fail => Err(http_failure(
                replay.status.as_u16(),
                &replay.body,
                Some(fresh.access_token.as_str()),
            )),
        }
    }

    async fn refresh_after_rejection(&self, rejected_access: String) -> GateOutcome {
        let job = RefreshJob {
            rejected_access,
            vault: self.inner.vault.clone(),
            client: self.inner.refresher.clone(),
            hook: self.inner.on_session_invalidated.clone(),
            login_redirect: self.inner.login_redirect.clone(),
        };
        self.inner.gate.run(job).await
    }

    /// Issues the descriptor once and captures status and body.
    pub(crate) async fn send(
        &self,
        descriptor: &RequestDescriptor,
        credential: Option<&Credential>,
        attempt: Attempt,
    ) -> Result<Captured, ApiError> {
        let url = endpoint_url(&self.inner.base_url, descriptor.path());
        let headers = build_headers(descriptor, credential)?;

        let mut request = self
            .inner
            .http
            .request(descriptor.method().clone(), url)
            .headers(headers);
        if let Some(body) = descriptor.body() {
            request = request.json(body);
        }

        let res = match request.send().await {
            Ok(res) => res,
            Err(err) => {
                warn!(
                    method = %descriptor.method(),
                    path = descriptor.path(),
                    state = attempt.state().as_str(),
                    timeout = err.is_timeout(),
                    error = %redact_secrets(&err.to_string()),
                    "request failed before a response"
                );
                return Err(ApiError::Network(err));
            }
        };

        let status = res.status();
        // A body cut short (reset, timeout) is a transport failure, not a
        // malformed payload.
        let body = res.text().await.map_err(ApiError::Network)?;
        debug!(
            method = %descriptor.method(),
            path = descriptor.path(),
            state = attempt.state().as_str(),
            authenticated = credential.is_some(),
            status = status.as_u16(),
            "response received"
        );
        Ok(Captured { status, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, CONTENT_TYPE};

    #[test]
    fn endpoint_url_keeps_base_path_prefix() {
        let base = Url::parse("https://api.example.com/v1").unwrap();
        assert_eq!(
            endpoint_url(&base, "/orders/abc").as_str(),
            "https://api.example.com/v1/orders/abc"
        );

        let base = Url::parse("https://api.example.com/v1/").unwrap();
        assert_eq!(
            endpoint_url(&base, "orders/abc").as_str(),
            "https://api.example.com/v1/orders/abc"
        );
    }

    #[test]
    fn endpoint_url_carries_query() {
        let base = Url::parse("http://127.0.0.1:8080").unwrap();
        assert_eq!(
            endpoint_url(&base, "/items?page=2&size=10").as_str(),
            "http://127.0.0.1:8080/items?page=2&size=10"
        );
        assert_eq!(
            endpoint_url(&base, "/items?").as_str(),
            "http://127.0.0.1:8080/items"
        );
    }

    #[test]
    fn build_headers_attaches_bearer_when_present() {
        let descriptor = RequestDescriptor::get("/orders");
        let cred = Credential::new("abc", None);

        let headers = build_headers(&descriptor, Some(&cred)).unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer abc");
        assert!(headers.get(AUTHORIZATION).unwrap().is_sensitive());

        let headers = build_headers(&descriptor, None).unwrap();
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.get(ACCEPT).unwrap(), "application/json");
    }

    #[test]
    fn build_headers_applies_overrides_but_not_authorization() {
        let descriptor = RequestDescriptor::get("/orders")
            .with_header(ACCEPT, HeaderValue::from_static("text/csv"))
            .with_header(
                HeaderName::from_static("x-request-id"),
                HeaderValue::from_static("req-1"),
            )
            .with_header(AUTHORIZATION, HeaderValue::from_static("Basic Zm9v"));

        let headers = build_headers(&descriptor, None).unwrap();
        assert_eq!(headers.get(ACCEPT).unwrap(), "text/csv");
        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
        assert!(headers.get(AUTHORIZATION).is_none());
        assert!(headers.get(CONTENT_TYPE).is_none());
    }

    #[test]
    fn build_headers_rejects_unprintable_token() {
        let descriptor = RequestDescriptor::get("/orders");
        let cred = Credential::new("bad\ntoken", None);
        assert!(matches!(
            build_headers(&descriptor, Some(&cred)),
            Err(ApiError::InvalidRequest(_))
        ));
    }

    #[test]
    fn decode_treats_empty_body_as_null() {
        let captured = Captured {
            status: StatusCode::NO_CONTENT,
            body: String::new(),
        };
        let _: () = decode(&captured).unwrap();
        let none: Option<u32> = decode(&captured).unwrap();
        assert_eq!(none, None);
    }

    #[test]
    fn decode_failure_is_decode_error() {
        let captured = Captured {
            status: StatusCode::OK,
            body: "not json".to_string(),
        };
        let result: Result<Vec<u32>, _> = decode(&captured);
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }
}
