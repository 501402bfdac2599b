mod app;
pub mod error;
pub mod pipeline;
pub mod redact;
pub mod refresh;
mod session;
pub mod settings;
pub mod store;
pub mod types;

pub use error::ApiError;
pub use pipeline::{ApiClient, ApiClientBuilder, SessionHook};
pub use settings::{RefreshStyle, Settings, SettingsError};
pub use store::{CredentialStore, CredentialVault, StoreError};
pub use types::{AuthMode, Credential, FailureKind, FailureReport, RequestDescriptor};

pub fn run() -> std::process::ExitCode {
    app::run()
}
