use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capabilities::{KeyNamespace, KvError, KvKey, UrlError, ValidatedUrl};
use crate::listing::DEFAULT_PAGE_SIZE;

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REDIRECT_DELAY_MS: u64 = 3_000;
pub const DEFAULT_CREDENTIALS_KEY: &str = "userLoginToken";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("malformed configuration: {0}")]
    Malformed(String),
    #[error("invalid backend url: {0}")]
    BackendUrl(#[from] UrlError),
    #[error("'{0}' must be greater than zero")]
    Zero(&'static str),
    #[error("invalid credentials key: {0}")]
    CredentialsKey(#[from] KvError),
}

/// Shell-supplied settings; every field falls back to its default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub request_timeout_ms: u64,
    pub page_size: usize,
    pub session_redirect_delay_ms: u64,
    pub credentials_key: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            page_size: DEFAULT_PAGE_SIZE,
            session_redirect_delay_ms: DEFAULT_REDIRECT_DELAY_MS,
            credentials_key: DEFAULT_CREDENTIALS_KEY.to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(raw).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<ValidatedUrl, ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Zero("request_timeout_ms"));
        }
        if self.page_size == 0 {
            return Err(ConfigError::Zero("page_size"));
        }
        if self.session_redirect_delay_ms == 0 {
            return Err(ConfigError::Zero("session_redirect_delay_ms"));
        }
        KvKey::new(KeyNamespace::Session, self.credentials_key.as_str())?;
        Ok(ValidatedUrl::new(self.backend_url.as_str())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert_eq!(config.page_size, 10);
        assert_eq!(config.request_timeout_ms, 5000);
        let base = config.validate().unwrap();
        assert_eq!(base.host(), "127.0.0.1");
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config = AppConfig::from_json(r#"{"backend_url":"https://cases.example.org"}"#).unwrap();
        assert_eq!(config.backend_url, "https://cases.example.org");
        assert_eq!(config.session_redirect_delay_ms, DEFAULT_REDIRECT_DELAY_MS);
        assert_eq!(config.credentials_key, DEFAULT_CREDENTIALS_KEY);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert_matches!(AppConfig::from_json("{"), Err(ConfigError::Malformed(_)));
        assert_matches!(
            AppConfig::from_json(r#"{"page_size":0}"#),
            Err(ConfigError::Zero("page_size"))
        );
        assert_matches!(
            AppConfig::from_json(r#"{"backend_url":"file:///etc"}"#),
            Err(ConfigError::BackendUrl(UrlError::Scheme(_)))
        );
        assert_matches!(
            AppConfig::from_json(r#"{"credentials_key":" "}"#),
            Err(ConfigError::CredentialsKey(_))
        );
        assert_matches!(
            AppConfig::from_json(r#"{"credentials_key":"a:b"}"#),
            Err(ConfigError::CredentialsKey(_))
        );
    }
}
