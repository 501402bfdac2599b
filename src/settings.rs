use reqwest::Url;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

pub const ENV_PREFIX: &str = "RESTGUARD_";

pub const KEY_BASE_URL: &str = "RESTGUARD_BASE_URL";
pub const KEY_REFRESH_PATH: &str = "RESTGUARD_REFRESH_PATH";
pub const KEY_REFRESH_STYLE: &str = "RESTGUARD_REFRESH_STYLE";
pub const KEY_REFRESH_FIELD: &str = "RESTGUARD_REFRESH_FIELD";
pub const KEY_LOGIN_REDIRECT: &str = "RESTGUARD_LOGIN_REDIRECT";
pub const KEY_LOGOUT_PATH: &str = "RESTGUARD_LOGOUT_PATH";
pub const KEY_ACCESS_TOKEN_KEY: &str = "RESTGUARD_ACCESS_TOKEN_KEY";
pub const KEY_REFRESH_TOKEN_KEY: &str = "RESTGUARD_REFRESH_TOKEN_KEY";
pub const KEY_TIMEOUT_SECONDS: &str = "RESTGUARD_TIMEOUT_SECONDS";
pub const KEY_CONNECT_TIMEOUT_SECONDS: &str = "RESTGUARD_CONNECT_TIMEOUT_SECONDS";

fn defaults() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        (KEY_BASE_URL, "http://127.0.0.1:8080"),
        (KEY_REFRESH_PATH, "/auth/refresh"),
        (KEY_REFRESH_STYLE, "body"),
        (KEY_REFRESH_FIELD, "refresh_token"),
        (KEY_LOGIN_REDIRECT, "/login"),
        (KEY_ACCESS_TOKEN_KEY, "token"),
        (KEY_REFRESH_TOKEN_KEY, "refreshToken"),
        (KEY_TIMEOUT_SECONDS, "40"),
        (KEY_CONNECT_TIMEOUT_SECONDS, "10"),
    ])
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid base URL `{value}`: {reason}")]
    InvalidBaseUrl { value: String, reason: String },
}

/// How the refresh token travels to the refresh endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStyle {
    /// JSON body `{ "<field>": "<refresh token>" }`.
    Body { field: String },
    /// `Authorization: Bearer <refresh token>`.
    Header,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    pub refresh_path: String,
    pub refresh_style: RefreshStyle,
    pub login_redirect: String,
    pub logout_path: Option<String>,
    pub access_token_key: String,
    pub refresh_token_key: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

struct Source<'a> {
    values: &'a HashMap<String, String>,
    defaults: HashMap<&'static str, &'static str>,
}

impl Source<'_> {
    fn get_string(&self, key: &str) -> Option<String> {
        let configured = self
            .values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty());
        configured
            .or_else(|| self.defaults.get(key).copied())
            .map(|v| v.to_string())
    }

    fn get_u64(&self, key: &str, fallback: u64) -> u64 {
        self.values
            .get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(fallback)
    }
}

impl Settings {
    /// Reads every `RESTGUARD_*` variable from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        let values = std::env::vars()
            .filter(|(k, _)| k.starts_with(ENV_PREFIX))
            .collect::<HashMap<_, _>>();
        Self::from_map(&values)
    }

    pub fn from_map(values: &HashMap<String, String>) -> Result<Self, SettingsError> {
        let source = Source {
            values,
            defaults: defaults(),
        };

        let raw_base = source.get_string(KEY_BASE_URL).unwrap_or_default();
        let base_url = parse_base_url(&raw_base)?;

        let refresh_style = match source.get_string(KEY_REFRESH_STYLE).as_deref() {
            Some("header") => RefreshStyle::Header,
            _ => RefreshStyle::Body {
                field: source
                    .get_string(KEY_REFRESH_FIELD)
                    .unwrap_or_else(|| "refresh_token".to_string()),
            },
        };

        Ok(Self {
            base_url,
            refresh_path: source
                .get_string(KEY_REFRESH_PATH)
                .unwrap_or_else(|| "/auth/refresh".to_string()),
            refresh_style,
            login_redirect: source
                .get_string(KEY_LOGIN_REDIRECT)
                .unwrap_or_else(|| "/login".to_string()),
            logout_path: source.get_string(KEY_LOGOUT_PATH),
            access_token_key: source
                .get_string(KEY_ACCESS_TOKEN_KEY)
                .unwrap_or_else(|| "token".to_string()),
            refresh_token_key: source
                .get_string(KEY_REFRESH_TOKEN_KEY)
                .unwrap_or_else(|| "refreshToken".to_string()),
            timeout: Duration::from_secs(source.get_u64(KEY_TIMEOUT_SECONDS, 40)),
            connect_timeout: Duration::from_secs(source.get_u64(KEY_CONNECT_TIMEOUT_SECONDS, 10)),
        })
    }

    /// Same settings against another backend.
    pub fn with_base_url(mut self, raw: &str) -> Result<Self, SettingsError> {
        self.base_url = parse_base_url(raw)?;
        Ok(self)
    }
}

fn parse_base_url(raw: &str) -> Result<Url, SettingsError> {
    let url = Url::parse(raw.trim()).map_err(|e| SettingsError::InvalidBaseUrl {
        value: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(SettingsError::InvalidBaseUrl {
            value: raw.to_string(),
            reason: "expected an http(s) URL".to_string(),
        });
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn from_map_applies_defaults() {
        let settings = Settings::from_map(&HashMap::new()).unwrap();
        assert_eq!(settings.base_url.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(settings.refresh_path, "/auth/refresh");
        assert_eq!(
            settings.refresh_style,
            RefreshStyle::Body {
                field: "refresh_token".to_string()
            }
        );
        assert_eq!(settings.login_redirect, "/login");
        assert_eq!(settings.logout_path, None);
        assert_eq!(settings.access_token_key, "token");
        assert_eq!(settings.refresh_token_key, "refreshToken");
        assert_eq!(settings.timeout, Duration::from_secs(40));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn from_map_reads_overrides() {
        let settings = Settings::from_map(&map(&[
            (KEY_BASE_URL, "https://api.example.com/v1"),
            (KEY_REFRESH_STYLE, "header"),
            (KEY_LOGOUT_PATH, "/auth/logout"),
            (KEY_TIMEOUT_SECONDS, "5"),
        ]))
        .unwrap();
        assert_eq!(settings.base_url.as_str(), "https://api.example.com/v1");
        assert_eq!(settings.refresh_style, RefreshStyle::Header);
        assert_eq!(settings.logout_path.as_deref(), Some("/auth/logout"));
        assert_eq!(settings.timeout, Duration::from_secs(5));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let settings = Settings::from_map(&map(&[
            (KEY_TIMEOUT_SECONDS, "soon"),
            (KEY_CONNECT_TIMEOUT_SECONDS, "0"),
        ]))
        .unwrap();
        assert_eq!(settings.timeout, Duration::from_secs(40));
        assert_eq!(settings.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn blank_values_use_defaults() {
        let settings = Settings::from_map(&map(&[(KEY_LOGOUT_PATH, "  ")])).unwrap();
        assert_eq!(settings.logout_path, None);
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(Settings::from_map(&map(&[(KEY_BASE_URL, "not a url")])).is_err());
        assert!(Settings::from_map(&map(&[(KEY_BASE_URL, "mailto:a@b.c")])).is_err());
    }
}
