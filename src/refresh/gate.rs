use super::client::RefreshClient;
use crate::pipeline::SessionHook;
use crate::redact::redact_secrets;
use crate::store::{CredentialVault, StoreError};
use crate::types::Credential;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub(crate) enum GateOutcome {
    /// This caller ran the exchange.
    Refreshed(Credential),
    /// Another caller refreshed while this one waited.
    Reused(Credential),
    /// The exchange succeeded but the new credential could not be stored.
    Unpersisted(StoreError),
    /// The exchange failed; the vault was cleared and the hook fired.
    Invalidated,
    /// The vault was already empty; nothing else to do.
    AlreadyInvalidated,
}

/// Everything a refresh needs, owned so it can outlive the caller.
pub(crate) struct RefreshJob {
    pub(crate) rejected_access: String,
    pub(crate) vault: CredentialVault,
    pub(crate) client: RefreshClient,
    pub(crate) hook: Option<SessionHook>,
    pub(crate) login_redirect: String,
}

/// Serializes refreshes so concurrent 401s share one exchange.
#[derive(Debug, Clone, Default)]
pub(crate) struct RefreshGate {
    lock: Arc<Mutex<()>>,
}

impl RefreshGate {
    /// Runs the job on its own task so a dropped caller cannot lose a
    /// rotated refresh token halfway through.
    pub(crate) async fn run(&self, job: RefreshJob) -> GateOutcome {
        let lock = self.lock.clone();
        let handle = tokio::spawn(async move {
            let _guard = lock.lock_owned().await;
            job.execute().await
        });

        match handle.await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(error = %err, "refresh task aborted");
                GateOutcome::AlreadyInvalidated
            }
        }
    }
}

impl RefreshJob {
    async fn execute(self) -> GateOutcome {
        match self.vault.load() {
            Ok(None) => {
                debug!("session already cleared by another call");
                return GateOutcome::AlreadyInvalidated;
            }
            Ok(Some(current)) if current.access_token != self.rejected_access => {
                debug!("reusing credential refreshed by another call");
                return GateOutcome::Reused(current);
            }
            Ok(Some(_)) => {}
            Err(err) => {
                warn!(error = %err, "credential store unreadable before refresh");
                return self.invalidate();
            }
        }

        match self.client.refresh(&self.vault).await {
            Ok(fresh) => {
                if let Err(err) = self.vault.save(&fresh) {
                    error!(error = %err, "refreshed credential could not be persisted");
                    return GateOutcome::Unpersisted(err);
                }
                info!(rotated = fresh.refresh_token.is_some(), "access token refreshed");
                GateOutcome::Refreshed(fresh)
            }
            Err(err) => {
                warn!(error = %redact_secrets(&err.to_string()), "refresh failed");
                self.invalidate()
            }
        }
    }

    /// Fires the hook here on the refresh task, so it runs exactly once even
    /// when the caller that triggered the refresh has been dropped.
    fn invalidate(self) -> GateOutcome {
        if let Err(err) = self.vault.clear() {
            warn!(error = %err, "credential store could not be cleared");
        }
        if let Some(hook) = &self.hook {
            hook(&self.login_redirect);
        }
        info!(redirect = %self.login_redirect, "session invalidated");
        GateOutcome::Invalidated
    }
}
