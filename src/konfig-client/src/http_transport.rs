use async_trait::async_trait;
use http::Method;
use http::header::CONTENT_TYPE;
use konfig_core::RequestBody;
use konfig_errors::TransportError;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::{AdminResponse, Auth, ClientConfig, Transport};

const USER_AGENT: &str = concat!("konfig/", env!("CARGO_PKG_VERSION"));

/// `reqwest`-backed transport against the gateway admin API.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    auth: Auth,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut base = Url::parse(&config.address).map_err(|e| TransportError::InvalidAddress {
            address: config.address.clone(),
            message: e.to_string(),
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut builder = Client::builder().timeout(config.timeout).user_agent(USER_AGENT);
        if config.tls_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build().map_err(|e| TransportError::Client { message: e.to_string() })?;

        Ok(Self {
            client,
            base,
            auth: config.auth.clone(),
        })
    }

    pub fn url(&self, path: &str) -> Result<Url, TransportError> {
        self.base
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidAddress {
                address: format!("{}{}", self.base, path),
                message: e.to_string(),
            })
    }
}

fn failure(url: &Url, e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout { url: url.to_string() };
    }
    TransportError::Request {
        url: url.to_string(),
        message: e.to_string(),
        source: Some(Box::new(e)),
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, path: &str, body: RequestBody) -> Result<AdminResponse, TransportError> {
        let url = self.url(path)?;
        let mut request = self.client.request(method.clone(), url.clone());

        request = match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
            Auth::Bearer(token) => request.bearer_auth(token),
        };

        request = match body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Form(pairs) => {
                let encoded = form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(pairs.iter())
                    .finish();
                request
                    .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(encoded)
            }
        };

        debug!("{} {}", method, url);
        let response = request.send().await.map_err(|e| failure(&url, e))?;
        let status = response.status();
        let body = response.bytes().await.map_err(|e| failure(&url, e))?;
        debug!("{} {} -> {}", method, url, status);

        Ok(AdminResponse { status, body })
    }
}
