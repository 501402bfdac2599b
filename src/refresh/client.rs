use crate::error::extract_message;
use crate::redact::mask_sent_tokens;
use crate::settings::RefreshStyle;
use crate::store::{CredentialVault, StoreError};
use crate::types::Credential;
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::Url;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("no refresh token stored")]
    NoRefreshCredential,
    #[error("refresh request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("refresh rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("refresh response is malformed: {0}")]
    Malformed(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Exchanges the stored refresh token for a new access token.
///
/// Never retries and never refreshes itself; every failure is final.
#[derive(Debug, Clone)]
pub struct RefreshClient {
    http: reqwest::Client,
    url: Url,
    style: RefreshStyle,
}

impl RefreshClient {
    pub fn new(http: reqwest::Client, url: Url, style: RefreshStyle) -> Self {
        Self { http, url, style }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub async fn refresh(&self, vault: &CredentialVault) -> Result<Credential, RefreshError> {
        let Some(refresh_token) = vault.refresh_token()? else {
            return Err(RefreshError::NoRefreshCredential);
        };

        let request = self
            .http
            .post(self.url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        let request = match &self.style {
            RefreshStyle::Body { field } => {
                let mut body = Map::new();
                body.insert(field.clone(), Value::String(refresh_token.clone()));
                request.json(&Value::Object(body))
            }
            RefreshStyle::Header => request.bearer_auth(&refresh_token),
        };

        let res = request.send().await.map_err(RefreshError::Network)?;
        let status = res.status();
        let text = res.text().await.map_err(RefreshError::Network)?;
        debug!(status = status.as_u16(), "refresh endpoint responded");

        if !status.is_success() {
            let message = extract_message(status.as_u16(), &text);
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
                message: mask_sent_tokens(&message, &[refresh_token.as_str()]).into_owned(),
            });
        }

        let json: Value =
            serde_json::from_str(&text).map_err(|e| RefreshError::Malformed(e.to_string()))?;
        Credential::from_token_response(&json, Some(&refresh_token))
            .ok_or_else(|| RefreshError::Malformed("missing access token".to_string()))
    }
}
