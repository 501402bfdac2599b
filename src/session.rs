use crate::error::ApiError;
use crate::pipeline::ApiClient;
use crate::redact::redact_secrets;
use crate::refresh::policy::Attempt;
use crate::types::{AuthMode, Credential, RequestDescriptor};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

impl ApiClient {
    /// Posts `body` to a login endpoint and stores the returned credential.
    pub async fn login<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Credential, ApiError> {
        self.authenticate(path, body).await
    }

    /// Same exchange as [`ApiClient::login`] against a registration endpoint.
    pub async fn register<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Credential, ApiError> {
        self.authenticate(path, body).await
    }

    async fn authenticate<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Credential, ApiError> {
        let descriptor = RequestDescriptor::post(path)
            .with_json(body)
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?
            .with_auth(AuthMode::Skip);

        let json: Value = self.execute(&descriptor).await?;
        let credential = Credential::from_token_response(&json, None)
            .ok_or_else(|| ApiError::Decode("response carries no access token".to_string()))?;
        self.store_credential(&credential)?;
        info!(path, "session established");
        Ok(credential)
    }

    /// Stores a credential obtained outside this client.
    pub fn store_credential(&self, credential: &Credential) -> Result<(), ApiError> {
        Ok(self.vault().save(credential)?)
    }

    pub fn credential(&self) -> Result<Option<Credential>, ApiError> {
        Ok(self.vault().load()?)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.credential(), Ok(Some(_)))
    }

    /// Clears the stored credential.
    ///
    /// When a logout endpoint is configured it is called once first; its
    /// outcome never prevents the local logout and never triggers a refresh.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Some(path) = self.logout_path() {
            let credential = self.vault().load()?;
            let descriptor = RequestDescriptor::post(path);
            match self
                .send(&descriptor, credential.as_ref(), Attempt::First)
                .await
            {
                Ok(res) if res.status.is_success() => {}
                Ok(res) => warn!(status = res.status.as_u16(), "logout endpoint refused"),
                Err(err) => warn!(
                    error = %redact_secrets(&err.to_string()),
                    "logout endpoint unreachable"
                ),
            }
        }

        self.vault().clear()?;
        info!("session cleared");
        Ok(())
    }
}
