use crate::error::ApiError;
use crate::pipeline::ApiClient;
use crate::settings::{Settings, SettingsError};
use crate::store::{CredentialStore, FileStore, KeyringStore, StoreError};
use crate::types::{AuthMode, RequestDescriptor};
use clap::{Args, Parser, Subcommand};
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const CREDENTIALS_RELATIVE_PATH: &str = ".restguard/credentials.json";

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("invalid header `{0}`; expected NAME:VALUE")]
    InvalidHeader(String),
    #[error("invalid HTTP method `{0}`")]
    InvalidMethod(String),
    #[error("HOME is not set; pass --store or set RESTGUARD_STORE")]
    HomeMissing,
    #[error("failed to start async runtime: {0}")]
    Runtime(std::io::Error),
}

#[derive(Parser, Debug)]
#[command(
    name = "restguard",
    about = "Authenticated REST client with transparent token refresh"
)]
struct Cli {
    #[arg(long, env = "RESTGUARD_BASE_URL")]
    base_url: Option<String>,

    /// Credential file (JSON). Defaults to ~/.restguard/credentials.json.
    #[arg(long, env = "RESTGUARD_STORE", conflicts_with = "keyring")]
    store: Option<PathBuf>,

    /// Keep tokens in the OS keychain instead of a file.
    #[arg(long)]
    keyring: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in and store the returned tokens.
    Login(AuthArgs),
    /// Create an account and store the returned tokens.
    Register(AuthArgs),
    /// Forget the stored tokens.
    Logout,
    /// Show whether tokens are stored.
    Status,
    /// Send one request through the pipeline.
    Request(RequestArgs),
}

#[derive(Args, Debug)]
struct AuthArgs {
    #[arg(long)]
    path: Option<String>,
    /// JSON credentials payload.
    #[arg(long)]
    body: String,
}

#[derive(Args, Debug)]
struct RequestArgs {
    method: String,
    path: String,
    #[arg(long)]
    body: Option<String>,
    /// Extra header as NAME:VALUE; repeatable.
    #[arg(long = "header")]
    headers: Vec<String>,
    /// Fail locally when no token is stored.
    #[arg(long)]
    require_auth: bool,
}

fn init_tracing() {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn default_store_path() -> Result<PathBuf, CliError> {
    let home = std::env::var("HOME").map_err(|_| CliError::HomeMissing)?;
    let home = home.trim();
    if home.is_empty() {
        return Err(CliError::HomeMissing);
    }
    Ok(PathBuf::from(home).join(CREDENTIALS_RELATIVE_PATH))
}

fn open_store(cli: &Cli) -> Result<Arc<dyn CredentialStore>, CliError> {
    if cli.keyring {
        let store = KeyringStore::default();
        if !store.is_available() {
            warn!("OS keychain/secret service looks unavailable");
        }
        return Ok(Arc::new(store));
    }
    let path = match &cli.store {
        Some(path) => path.clone(),
        None => default_store_path()?,
    };
    Ok(Arc::new(FileStore::open(path)?))
}

fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue), CliError> {
    let invalid = || CliError::InvalidHeader(raw.to_string());
    let (name, value) = raw.split_once(':').ok_or_else(invalid)?;
    let name = HeaderName::from_bytes(name.trim().as_bytes()).map_err(|_| invalid())?;
    let value = HeaderValue::from_str(value.trim()).map_err(|_| invalid())?;
    Ok((name, value))
}

fn build_descriptor(args: &RequestArgs) -> Result<RequestDescriptor, CliError> {
    let method = Method::from_bytes(args.method.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| CliError::InvalidMethod(args.method.clone()))?;

    let mut descriptor = RequestDescriptor::new(method, args.path.clone());
    if let Some(body) = &args.body {
        descriptor = descriptor.with_body(serde_json::from_str(body)?);
    }
    for raw in &args.headers {
        let (name, value) = parse_header(raw)?;
        descriptor = descriptor.with_header(name, value);
    }
    if args.require_auth {
        descriptor = descriptor.with_auth(AuthMode::Require);
    }
    Ok(descriptor)
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let mut settings = Settings::from_env()?;
    if let Some(base_url) = &cli.base_url {
        settings = settings.with_base_url(base_url)?;
    }
    let store = open_store(&cli)?;
    let client = ApiClient::builder(settings, store)
        .on_session_invalidated(|redirect: &str| {
            warn!(redirect, "session expired; sign in again");
        })
        .build()?;

    match cli.command {
        Command::Login(args) => {
            let body: Value = serde_json::from_str(&args.body)?;
            let path = args.path.as_deref().unwrap_or("/auth/login");
            let credential = client.login(path, &body).await?;
            print_json(&json!({
                "authenticated": true,
                "hasRefreshToken": credential.refresh_token.is_some(),
            }))
        }
        Command::Register(args) => {
            let body: Value = serde_json::from_str(&args.body)?;
            let path = args.path.as_deref().unwrap_or("/auth/register");
            let credential = client.register(path, &body).await?;
            print_json(&json!({
                "authenticated": true,
                "hasRefreshToken": credential.refresh_token.is_some(),
            }))
        }
        Command::Logout => {
            client.logout().await?;
            print_json(&json!({ "authenticated": false }))
        }
        Command::Status => {
            let credential = client.credential()?;
            print_json(&json!({
                "baseUrl": client.base_url().as_str(),
                "authenticated": credential.is_some(),
                "hasRefreshToken": credential.is_some_and(|c| c.refresh_token.is_some()),
            }))
        }
        Command::Request(args) => {
            let descriptor = build_descriptor(&args)?;
            let value: Value = client.execute(&descriptor).await?;
            print_json(&value)
        }
    }
}

pub fn run() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("error: {}", CliError::Runtime(err));
            return ExitCode::from(2);
        }
    };

    match runtime.block_on(dispatch(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Api(err)) => {
            let report = serde_json::to_string_pretty(&err.report())
                .unwrap_or_else(|_| err.to_string());
            eprintln!("{report}");
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_args(method: &str, headers: &[&str]) -> RequestArgs {
        RequestArgs {
            method: method.to_string(),
            path: "/items".to_string(),
            body: Some(r#"{"name":"widget"}"#.to_string()),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            require_auth: true,
        }
    }

    #[test]
    fn parse_header_splits_on_first_colon() {
        let (name, value) = parse_header("X-Trace: a:b").unwrap();
        assert_eq!(name.as_str(), "x-trace");
        assert_eq!(value, "a:b");
    }

    #[test]
    fn parse_header_rejects_missing_separator() {
        assert!(matches!(
            parse_header("X-Trace"),
            Err(CliError::InvalidHeader(_))
        ));
    }

    #[test]
    fn build_descriptor_normalizes_method_and_collects_parts() {
        let descriptor = build_descriptor(&request_args("post", &["X-Trace: 1"])).unwrap();
        assert_eq!(*descriptor.method(), Method::POST);
        assert_eq!(descriptor.path(), "/items");
        assert_eq!(descriptor.body(), Some(&json!({ "name": "widget" })));
        assert_eq!(descriptor.headers().get("x-trace").unwrap(), "1");
        assert_eq!(descriptor.auth(), AuthMode::Require);
    }

    #[test]
    fn build_descriptor_rejects_invalid_method() {
        assert!(matches!(
            build_descriptor(&request_args("GE T", &[])),
            Err(CliError::InvalidMethod(_))
        ));
    }

    #[test]
    fn cli_parses_request_command() {
        let cli = Cli::try_parse_from([
            "restguard",
            "--base-url",
            "http://localhost:9000",
            "request",
            "GET",
            "/orders/abc",
            "--header",
            "X-Trace: 1",
        ])
        .unwrap();
        assert_eq!(cli.base_url.as_deref(), Some("http://localhost:9000"));
        let Command::Request(args) = cli.command else {
            panic!("expected request command");
        };
        assert_eq!(args.path, "/orders/abc");
        assert_eq!(args.headers, vec!["X-Trace: 1".to_string()]);
    }
}
