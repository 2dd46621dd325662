mod http_transport;

pub use http_transport::HttpTransport;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use konfig_core::RequestBody;
use konfig_errors::TransportError;
use std::time::Duration;

pub const DEFAULT_ADDRESS: &str = "http://localhost:8001";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Auth {
    #[default]
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

impl Auth {
    /// A token wins over basic credentials; nothing set means no header.
    pub fn from_credentials(username: &str, password: &str, token: &str) -> Self {
        if !token.is_empty() {
            Auth::Bearer(token.to_string())
        } else if !username.is_empty() {
            Auth::Basic {
                username: username.to_string(),
                password: password.to_string(),
            }
        } else {
            Auth::None
        }
    }
}

/// Connection settings shared by every reconciler of one provider. Immutable
/// once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub address: String,
    pub auth: Auth,
    pub timeout: Duration,
    pub tls_skip_verify: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_string(),
            auth: Auth::None,
            timeout: DEFAULT_TIMEOUT,
            tls_skip_verify: false,
        }
    }
}

impl ClientConfig {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone)]
pub struct AdminResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl AdminResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        self.status.canonical_reason()
    }

    /// `409 Conflict`, or just the code when it has no canonical reason.
    pub fn status_line(&self) -> String {
        match self.reason() {
            Some(reason) => format!("{} {reason}", self.status.as_u16()),
            None => self.status.as_u16().to_string(),
        }
    }
}

/// One request, one response. Retries and cancellation are the caller's concern.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, path: &str, body: RequestBody) -> Result<AdminResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_takes_precedence_over_basic_credentials() {
        assert_eq!(Auth::from_credentials("admin", "pw", "jwt"), Auth::Bearer("jwt".into()));
        assert_eq!(
            Auth::from_credentials("admin", "", ""),
            Auth::Basic {
                username: "admin".into(),
                password: String::new()
            }
        );
        assert_eq!(Auth::from_credentials("", "pw", ""), Auth::None);
    }
}
