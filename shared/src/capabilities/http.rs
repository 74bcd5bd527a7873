use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::event::{CaseId, UserId};

pub const MAX_URL_LENGTH: usize = 2048;
const MAX_REPORTED_URL: usize = 100;

/// Completion value delivered by `crux_http` for a byte-bodied request.
pub type HttpOutcome = crux_http::Result<crux_http::Response<Vec<u8>>>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("URL cannot be empty")]
    Empty,
    #[error("URL exceeds maximum length of {max} bytes")]
    TooLong { max: usize },
    #[error("invalid URL '{url}': {reason}")]
    Parse { url: String, reason: String },
    #[error("invalid scheme '{0}', only 'http' and 'https' are allowed")]
    Scheme(String),
    #[error("URL must have a host")]
    MissingHost,
    #[error("credentials in URL are not allowed")]
    EmbeddedCredentials,
    #[error("base URL cannot carry a query or fragment")]
    QueryOrFragment,
}

/// Backend base address, checked once and joined with route paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ValidatedUrl {
    url: String,
    host: String,
}

impl ValidatedUrl {
    pub fn new(url: impl Into<String>) -> Result<Self, UrlError> {
        let url = url.into();
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(UrlError::Empty);
        }
        if trimmed.len() > MAX_URL_LENGTH {
            return Err(UrlError::TooLong {
                max: MAX_URL_LENGTH,
            });
        }

        let parsed = Url::parse(trimmed).map_err(|e| UrlError::Parse {
            url: truncate(trimmed),
            reason: e.to_string(),
        })?;

        let scheme = parsed.scheme().to_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(UrlError::Scheme(scheme));
        }

        let host = parsed
            .host_str()
            .ok_or(UrlError::MissingHost)?
            .to_lowercase();

        if !parsed.username().is_empty() || parsed.password().is_some() {
            return Err(UrlError::EmbeddedCredentials);
        }

        if parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(UrlError::QueryOrFragment);
        }

        Ok(Self {
            url: parsed.to_string(),
            host,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Appends an absolute route path (`/cases/case`) to the base.
    pub fn join(&self, path: &str) -> Result<Url, UrlError> {
        let joined = format!(
            "{}/{}",
            self.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| UrlError::Parse {
            url: truncate(&joined),
            reason: e.to_string(),
        })
    }
}

fn truncate(url: &str) -> String {
    match url.char_indices().nth(MAX_REPORTED_URL) {
        Some((idx, _)) => format!("{}...", &url[..idx]),
        None => url.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Delete => "DELETE",
        }
    }
}

impl From<HttpMethod> for crux_http::http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::Get,
            HttpMethod::Post => Self::Post,
            HttpMethod::Delete => Self::Delete,
        }
    }
}

/// Which half of the credential pair goes into the bearer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Anonymous,
    AccessToken,
    RefreshToken,
}

/// One backend route: method, path and the token it must carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub method: HttpMethod,
    pub path: String,
    pub auth: AuthScheme,
}

impl Endpoint {
    fn new(method: HttpMethod, path: impl Into<String>, auth: AuthScheme) -> Self {
        Self {
            method,
            path: path.into(),
            auth,
        }
    }

    pub fn login() -> Self {
        Self::new(HttpMethod::Post, "/manager/login", AuthScheme::Anonymous)
    }

    pub fn refresh() -> Self {
        Self::new(HttpMethod::Post, "/manager/refresh", AuthScheme::RefreshToken)
    }

    pub fn current_user() -> Self {
        Self::new(
            HttpMethod::Get,
            "/manager/getCurrentUser",
            AuthScheme::AccessToken,
        )
    }

    pub fn list_users() -> Self {
        Self::new(HttpMethod::Get, "/manager/admin/users", AuthScheme::AccessToken)
    }

    pub fn create_user() -> Self {
        Self::new(HttpMethod::Post, "/manager/admin/users", AuthScheme::AccessToken)
    }

    pub fn delete_user(id: UserId) -> Self {
        Self::new(
            HttpMethod::Delete,
            format!("/manager/admin/user/{id}"),
            AuthScheme::AccessToken,
        )
    }

    pub fn list_cases() -> Self {
        Self::new(HttpMethod::Get, "/cases/case", AuthScheme::AccessToken)
    }

    pub fn create_case() -> Self {
        Self::new(HttpMethod::Post, "/cases/case", AuthScheme::AccessToken)
    }

    pub fn update_case(id: &CaseId) -> Self {
        Self::new(
            HttpMethod::Post,
            format!("/cases/case/{id}"),
            AuthScheme::AccessToken,
        )
    }

    pub fn delete_case(id: &CaseId) -> Self {
        Self::new(
            HttpMethod::Delete,
            format!("/cases/case/{id}"),
            AuthScheme::AccessToken,
        )
    }
}

/// Classification of a failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("authorization rejected")]
    Unauthorized,
    #[error("bad request: {message}")]
    BadRequest { message: String },
    #[error("unexpected status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response body: {0}")]
    Decode(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    #[serde(default)]
    message: String,
}

impl Fault {
    pub fn from_status(status: u16, body: Option<&[u8]>) -> Self {
        let message = body
            .and_then(|b| serde_json::from_slice::<ApiErrorResponse>(b).ok())
            .map(|e| e.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP error: {status}"));

        match status {
            401 => Self::Unauthorized,
            400 => Self::BadRequest { message },
            _ => Self::Status { status, message },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized => Some(401),
            Self::BadRequest { .. } => Some(400),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<&crux_http::Error> for Fault {
    fn from(error: &crux_http::Error) -> Self {
        match error {
            crux_http::Error::Http(e) => Self::from_status(e.code as u16, e.body.as_deref()),
            crux_http::Error::Json(m) => Self::Decode(m.clone()),
            crux_http::Error::Url(m) => Self::InvalidRequest(m.clone()),
            crux_http::Error::Io(m) => Self::Transport(m.clone()),
            crux_http::Error::Timeout => Self::Timeout,
        }
    }
}

impl From<UrlError> for Fault {
    fn from(error: UrlError) -> Self {
        Self::InvalidRequest(error.to_string())
    }
}

/// Succeeds when the call succeeded, discarding the body.
pub fn expect_success(outcome: &HttpOutcome) -> Result<(), Fault> {
    match outcome {
        Ok(_) => Ok(()),
        Err(e) => Err(Fault::from(e)),
    }
}

/// Decodes a successful JSON body or classifies the failure.
pub fn decode_json<T: DeserializeOwned>(outcome: HttpOutcome) -> Result<T, Fault> {
    match outcome {
        Ok(mut response) => response.body_json::<T>().map_err(|e| match e {
            crux_http::Error::Json(m) => Fault::Decode(m),
            other => Fault::from(&other),
        }),
        Err(e) => Err(Fault::from(&e)),
    }
}
