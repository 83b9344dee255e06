//! HTTP transport abstraction.
//!
//! A [`Transport`] performs exactly one round trip per call. It never
//! retries, never interprets the status code and never parses the body;
//! those concerns belong to the client.

use std::time::Duration;

use reqwest::Method;
use reqwest::header::CONTENT_TYPE;

use crate::error::TransportError;

/// Header carrying the client token.
pub const TOKEN_HEADER: &str = "X-Vault-Token";
/// Header identifying API requests (as opposed to browser requests).
pub const REQUEST_HEADER: &str = "X-Vault-Request";

const USER_AGENT: &str = concat!("vaultkv/", env!("CARGO_PKG_VERSION"));

/// A fully built request.
#[derive(Clone)]
pub struct TransportRequest {
    pub method: Method,
    /// Absolute URL, including any query string.
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    /// JSON body, if any.
    pub body: Option<Vec<u8>>,
}

impl TransportRequest {
    /// Build a request carrying the token and client-identification headers.
    pub fn authenticated(method: Method, url: String, token: &str, body: Option<Vec<u8>>) -> Self {
        Self {
            method,
            url,
            headers: vec![
                (TOKEN_HEADER, token.to_owned()),
                (REQUEST_HEADER, "true".to_owned()),
            ],
            body,
        }
    }

    /// Value of the first header with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl std::fmt::Debug for TransportRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("body_len", &self.body.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

/// Status code and body of a completed round trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Executes a single HTTP request.
///
/// Implementations must be safe to share across tasks (`Send + Sync`);
/// the client issues concurrent calls through one instance without locking.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Send `request` and return the raw response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when no status code was received.
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError>;
}

/// [`Transport`] backed by a `reqwest` connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with an optional per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] if the TLS backend cannot be
    /// initialised.
    pub fn new(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| TransportError::Build {
            reason: e.to_string(),
        })?;
        Ok(Self { client })
    }

    /// Wrap an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        let TransportRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let mut req = self.client.request(method, &url);
        for (name, value) in headers {
            req = req.header(name, value);
        }
        if let Some(body) = body {
            req = req.header(CONTENT_TYPE, "application/json").body(body);
        }

        let resp = req.send().await.map_err(|e| network_error(&url, e))?;
        let status = resp.status().as_u16();
        let body = resp.bytes().await.map_err(|e| network_error(&url, e))?;

        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

fn network_error(url: &str, err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_owned(),
        }
    } else {
        TransportError::Network {
            url: url.to_owned(),
            source: Box::new(err),
        }
    }
}
