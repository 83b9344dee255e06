//! Client identity and the request pipeline shared by every operation.
//!
//! Each call goes transport → status classifier → envelope decoder →
//! payload projector, short-circuiting at the first failure.

use std::sync::Arc;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::config::{ClientConfig, DEFAULT_ADDRESS};
use crate::envelope::{self, Envelope};
use crate::error::KvError;
use crate::status::{Outcome, StatusKind, classify};
use crate::transport::{HttpTransport, RawResponse, Transport, TransportRequest};

/// An authenticated handle to one server.
///
/// Immutable after construction and cheap to clone; clones share the
/// transport's connection pool. Safe to use from many tasks at once.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn Transport>,
    address: Arc<str>,
    token: Arc<str>,
}

impl Client {
    /// Build a client over an explicit transport.
    ///
    /// An empty `address` falls back to `http://127.0.0.1:8200`; a trailing
    /// `/` is dropped. Nothing else is validated.
    pub fn new(transport: Arc<dyn Transport>, address: &str, token: &str) -> Self {
        let address = address.trim().trim_end_matches('/');
        let address = if address.is_empty() {
            DEFAULT_ADDRESS
        } else {
            address
        };
        Self {
            transport,
            address: Arc::from(address),
            token: Arc::from(token),
        }
    }

    /// Build a client with an [`HttpTransport`] from explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, KvError> {
        let transport = HttpTransport::new(config.timeout)?;
        Ok(Self::new(Arc::new(transport), &config.address, &config.token))
    }

    /// Build a client from `VAULT_ADDR`, `VAULT_TOKEN` and
    /// `VAULT_CLIENT_TIMEOUT`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Transport`] if the HTTP client cannot be built.
    pub fn from_env() -> Result<Self, KvError> {
        Self::from_config(&ClientConfig::from_env())
    }

    /// Server base address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Absolute URL for an endpoint relative to `/v1/`.
    pub(crate) fn url(&self, endpoint: &str, query: &[(&str, String)]) -> String {
        let path = endpoint
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let mut url = format!("{}/v1/{path}", self.address);
        for (i, (key, value)) in query.iter().enumerate() {
            url.push(if i == 0 { '?' } else { '&' });
            url.push_str(key);
            url.push('=');
            url.push_str(&urlencoding::encode(value));
        }
        url
    }

    /// One transport round trip with the auth headers attached.
    pub(crate) async fn round_trip(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<RawResponse, KvError> {
        let url = self.url(endpoint, query);
        debug!(%method, endpoint, "sending request");
        let request = TransportRequest::authenticated(method, url, &self.token, body);
        let response = self.transport.send(request).await?;
        trace!(endpoint, status = response.status, bytes = response.body.len(), "response received");
        Ok(response)
    }

    /// Call an endpoint that answers with an envelope and project its
    /// `data` into `T`.
    pub(crate) async fn read_data<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
        body: Option<Vec<u8>>,
    ) -> Result<T, KvError> {
        let response = self.round_trip(method, endpoint, query, body).await?;
        match classify(response.status) {
            Outcome::Ok => decode_envelope(endpoint, &response.body)?.into_data(endpoint),
            Outcome::OkNoBody => Err(KvError::MissingData {
                endpoint: endpoint.to_owned(),
            }),
            Outcome::Failed(kind) => Err(status_error(endpoint, kind, &response.body)),
        }
    }

    /// Call an endpoint whose success carries no meaningful body.
    pub(crate) async fn write_only(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<(), KvError> {
        let response = self.round_trip(method, endpoint, &[], body).await?;
        match classify(response.status) {
            Outcome::Ok | Outcome::OkNoBody => Ok(()),
            Outcome::Failed(kind) => Err(status_error(endpoint, kind, &response.body)),
        }
    }

    /// Call an endpoint that may or may not answer with data.
    pub(crate) async fn write_optional<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Option<T>, KvError> {
        let response = self.round_trip(method, endpoint, &[], body).await?;
        match classify(response.status) {
            Outcome::Ok if response.body.is_empty() => Ok(None),
            Outcome::Ok => match decode_envelope(endpoint, &response.body)?.data {
                None | Some(serde_json::Value::Null) => Ok(None),
                Some(data) => envelope::project(data).map(Some),
            },
            Outcome::OkNoBody => Ok(None),
            Outcome::Failed(kind) => Err(status_error(endpoint, kind, &response.body)),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

/// Join mount, segment and secret path into an endpoint relative to `/v1/`.
///
/// Empty components and stray slashes are dropped, so `("secret", "data",
/// "/foo/")` and `("/secret/", "data", "foo")` both give `secret/data/foo`.
pub(crate) fn endpoint(mount: &str, segment: &str, path: &str) -> String {
    [mount, segment, path]
        .iter()
        .flat_map(|part| part.split('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn encode_body<B: Serialize>(endpoint: &str, body: &B) -> Result<Vec<u8>, KvError> {
    serde_json::to_vec(body).map_err(|source| KvError::Encode {
        endpoint: endpoint.to_owned(),
        source,
    })
}

pub(crate) fn decode_envelope(endpoint: &str, bytes: &[u8]) -> Result<Envelope, KvError> {
    let env = envelope::decode(endpoint, bytes)?;
    trace!(endpoint, request_id = %env.request_id, "envelope received");
    Ok(env)
}

pub(crate) fn status_error(endpoint: &str, kind: StatusKind, body: &[u8]) -> KvError {
    KvError::Status {
        kind,
        endpoint: endpoint.to_owned(),
        errors: envelope::server_errors(body),
    }
}
