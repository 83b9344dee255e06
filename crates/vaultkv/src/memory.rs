//! In-memory KV v2 engine for tests and offline use.
//!
//! [`MemoryKv`] implements [`Transport`] by answering requests the way a
//! real server's KV v2 mount does: versioned writes with check-and-set,
//! soft delete, undelete, destroy, listing and metadata. State lives behind
//! a `RwLock`; clones share it. Nothing is persisted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Method, Url};
use serde::{Deserialize, Deserializer};
use serde_json::json;
use tokio::sync::RwLock;

use crate::duration::go_string;
use crate::error::TransportError;
use crate::transport::{RawResponse, TOKEN_HEADER, Transport, TransportRequest};
use crate::types::{EngineConfig, VersionMetadata};

/// Versions kept per secret when the engine's `max_versions` is `0`.
const DEFAULT_MAX_VERSIONS: u32 = 10;

/// An in-memory KV v2 mount reachable through the [`Transport`] trait.
///
/// # Examples
///
/// ```
/// # use std::collections::HashMap;
/// # use std::sync::Arc;
/// # use vaultkv::{Client, MemoryKv, WriteOptions};
/// # #[tokio::main]
/// # async fn main() {
/// let client = Client::new(Arc::new(MemoryKv::new()), "", "root");
/// let kv = client.kv2();
/// let data = HashMap::from([("k".to_owned(), "v".to_owned())]);
/// kv.create_or_update_secret("foo", &data, &WriteOptions::default()).await.unwrap();
/// let secret = kv.read_secret_version("foo", 0).await.unwrap();
/// assert_eq!(secret.metadata.version, 1);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemoryKv {
    mount: Arc<str>,
    token: Option<Arc<str>>,
    state: Arc<RwLock<EngineState>>,
}

#[derive(Debug, Default)]
struct EngineState {
    config: EngineConfig,
    secrets: BTreeMap<String, StoredSecret>,
    sealed: bool,
}

#[derive(Debug)]
struct StoredSecret {
    versions: BTreeMap<u64, StoredVersion>,
    current_version: u64,
    created_time: DateTime<Utc>,
    updated_time: DateTime<Utc>,
}

#[derive(Debug)]
struct StoredVersion {
    data: HashMap<String, String>,
    created_time: DateTime<Utc>,
    deletion_time: Option<DateTime<Utc>>,
    destroyed: bool,
}

impl StoredVersion {
    fn metadata(&self, version: u64) -> VersionMetadata {
        VersionMetadata {
            created_time: self.created_time,
            deletion_time: self.deletion_time,
            destroyed: self.destroyed,
            version,
        }
    }

    fn is_readable(&self) -> bool {
        self.deletion_time.is_none() && !self.destroyed
    }
}

#[derive(Deserialize)]
struct WriteBody {
    #[serde(default)]
    data: HashMap<String, String>,
    #[serde(default)]
    options: WriteBodyOptions,
}

#[derive(Default, Deserialize)]
struct WriteBodyOptions {
    cas: Option<u64>,
}

/// Config writes only touch the fields present in the body.
#[derive(Deserialize)]
struct ConfigPatch {
    max_versions: Option<u32>,
    cas_required: Option<bool>,
    #[serde(default, deserialize_with = "present_duration")]
    delete_version_after: Option<Duration>,
}

fn present_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
    go_string::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct VersionsBody {
    #[serde(default)]
    versions: Vec<u64>,
}

impl MemoryKv {
    /// An empty engine mounted at `secret` that accepts any token.
    #[must_use]
    pub fn new() -> Self {
        Self::with_mount("secret")
    }

    /// An empty engine mounted at `mount`.
    #[must_use]
    pub fn with_mount(mount: &str) -> Self {
        Self {
            mount: Arc::from(mount.trim_matches('/')),
            token: None,
            state: Arc::new(RwLock::new(EngineState::default())),
        }
    }

    /// Reject requests whose token differs from `token` with `403`.
    #[must_use]
    pub fn require_token(mut self, token: &str) -> Self {
        self.token = Some(Arc::from(token));
        self
    }

    /// Answer every request with `503` until [`unseal`](Self::unseal).
    pub async fn seal(&self) {
        self.state.write().await.sealed = true;
    }

    /// Resume normal operation after [`seal`](Self::seal).
    pub async fn unseal(&self) {
        self.state.write().await.sealed = false;
    }

    async fn handle(&self, request: &TransportRequest) -> RawResponse {
        if self.state.read().await.sealed {
            return errors(503, &["Vault is sealed"]);
        }
        if let Some(expected) = &self.token {
            if request.header(TOKEN_HEADER) != Some(expected.as_ref()) {
                return errors(403, &["permission denied"]);
            }
        }

        let Ok(url) = Url::parse(&request.url) else {
            return errors(400, &["malformed request URL"]);
        };
        let Some(route) = self.route(&url) else {
            return errors(404, &["no handler for route"]);
        };
        let query: HashMap<String, String> = url.query_pairs().into_owned().collect();
        let body = request.body.as_deref().unwrap_or_default();

        let (segment, path) = route.split_once('/').unwrap_or((route.as_str(), ""));
        let path = path.trim_matches('/');
        let method = &request.method;

        match segment {
            "config" if path.is_empty() => match *method {
                Method::GET => self.read_config().await,
                Method::POST | Method::PUT => self.write_config(body).await,
                _ => errors(405, &[]),
            },
            "data" if !path.is_empty() => match *method {
                Method::GET => self.read(path, &query).await,
                Method::POST | Method::PUT => self.write(path, body).await,
                Method::DELETE => self.delete_latest(path).await,
                _ => errors(405, &[]),
            },
            "metadata" if *method == Method::GET => {
                if query.get("list").is_some_and(|v| v == "true") {
                    self.list(path).await
                } else if path.is_empty() {
                    errors(404, &[])
                } else {
                    self.metadata(path).await
                }
            }
            "delete" | "undelete" | "destroy" if !path.is_empty() => {
                if *method == Method::POST || *method == Method::PUT {
                    self.change_versions(segment, path, body).await
                } else {
                    errors(405, &[])
                }
            }
            _ => errors(404, &["no handler for route"]),
        }
    }

    /// Path below the mount, percent-decoded.
    fn route(&self, url: &Url) -> Option<String> {
        let decoded: Vec<String> = url
            .path()
            .split('/')
            .map(|s| urlencoding::decode(s).map(std::borrow::Cow::into_owned).unwrap_or_default())
            .collect();
        let full = decoded.join("/");
        let rest = full.strip_prefix("/v1/")?;
        let rest = rest.strip_prefix(self.mount.as_ref())?;
        rest.strip_prefix('/').map(str::to_owned)
    }

    async fn read_config(&self) -> RawResponse {
        let state = self.state.read().await;
        envelope(&state.config)
    }

    async fn write_config(&self, body: &[u8]) -> RawResponse {
        let Ok(patch) = serde_json::from_slice::<ConfigPatch>(body) else {
            return errors(400, &["invalid config body"]);
        };
        let config = &mut self.state.write().await.config;
        if let Some(max_versions) = patch.max_versions {
            config.max_versions = max_versions;
        }
        if let Some(cas_required) = patch.cas_required {
            config.cas_required = cas_required;
        }
        if let Some(after) = patch.delete_version_after {
            config.delete_version_after = after;
        }
        no_content()
    }

    async fn read(&self, path: &str, query: &HashMap<String, String>) -> RawResponse {
        let requested = match query.get("version").map(|v| v.parse::<u64>()) {
            None => 0,
            Some(Ok(v)) => v,
            Some(Err(_)) => return errors(400, &["invalid version"]),
        };

        let state = self.state.read().await;
        let Some(secret) = state.secrets.get(path) else {
            return errors(404, &[]);
        };
        let number = if requested == 0 {
            secret.current_version
        } else {
            requested
        };
        let Some(version) = secret.versions.get(&number) else {
            return errors(404, &[]);
        };

        if version.is_readable() {
            envelope(&json!({ "data": version.data, "metadata": version.metadata(number) }))
        } else {
            let mut resp = envelope(&json!({ "data": null, "metadata": version.metadata(number) }));
            resp.status = 404;
            resp
        }
    }

    async fn write(&self, path: &str, body: &[u8]) -> RawResponse {
        let Ok(body) = serde_json::from_slice::<WriteBody>(body) else {
            return errors(400, &["invalid request body"]);
        };

        let mut state = self.state.write().await;
        let cas_required = state.config.cas_required;
        let max_versions = match state.config.max_versions {
            0 => DEFAULT_MAX_VERSIONS,
            n => n,
        };
        let current = state.secrets.get(path).map_or(0, |s| s.current_version);

        match body.options.cas {
            None if cas_required => {
                return errors(400, &["check-and-set parameter required for this call"]);
            }
            Some(cas) if cas != current => {
                return errors(400, &["check-and-set parameter did not match the current version"]);
            }
            _ => {}
        }

        let now = Utc::now();
        let secret = state
            .secrets
            .entry(path.to_owned())
            .or_insert_with(|| StoredSecret {
                versions: BTreeMap::new(),
                current_version: 0,
                created_time: now,
                updated_time: now,
            });

        secret.current_version = secret.current_version.saturating_add(1);
        secret.updated_time = now;
        let number = secret.current_version;
        secret.versions.insert(
            number,
            StoredVersion {
                data: body.data,
                created_time: now,
                deletion_time: None,
                destroyed: false,
            },
        );

        while secret.versions.len() > max_versions as usize {
            if secret.versions.pop_first().is_none() {
                break;
            }
        }

        match secret.versions.get(&number) {
            Some(version) => envelope(&version.metadata(number)),
            None => errors(500, &["written version missing"]),
        }
    }

    async fn delete_latest(&self, path: &str) -> RawResponse {
        let mut state = self.state.write().await;
        if let Some(secret) = state.secrets.get_mut(path) {
            let current = secret.current_version;
            if let Some(version) = secret.versions.get_mut(&current) {
                if version.deletion_time.is_none() && !version.destroyed {
                    version.deletion_time = Some(Utc::now());
                }
            }
        }
        no_content()
    }

    async fn change_versions(&self, action: &str, path: &str, body: &[u8]) -> RawResponse {
        let Ok(body) = serde_json::from_slice::<VersionsBody>(body) else {
            return errors(400, &["invalid request body"]);
        };
        if body.versions.is_empty() {
            return errors(400, &["no version number provided"]);
        }

        let now = Utc::now();
        let mut state = self.state.write().await;
        let Some(secret) = state.secrets.get_mut(path) else {
            return no_content();
        };
        for number in body.versions {
            let Some(version) = secret.versions.get_mut(&number) else {
                continue;
            };
            match action {
                "delete" if !version.destroyed && version.deletion_time.is_none() => {
                    version.deletion_time = Some(now);
                }
                "undelete" if !version.destroyed => version.deletion_time = None,
                "destroy" => {
                    version.destroyed = true;
                    version.data.clear();
                }
                _ => {}
            }
        }
        no_content()
    }

    async fn list(&self, path: &str) -> RawResponse {
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };

        let state = self.state.read().await;
        let keys: BTreeSet<String> = state
            .secrets
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter_map(|(k, _)| k.strip_prefix(&prefix))
            .map(|rest| match rest.split_once('/') {
                Some((dir, _)) => format!("{dir}/"),
                None => rest.to_owned(),
            })
            .collect();

        if keys.is_empty() {
            return errors(404, &[]);
        }
        envelope(&json!({ "keys": keys }))
    }

    async fn metadata(&self, path: &str) -> RawResponse {
        let state = self.state.read().await;
        let Some(secret) = state.secrets.get(path) else {
            return errors(404, &[]);
        };
        let versions: BTreeMap<String, VersionMetadata> = secret
            .versions
            .iter()
            .map(|(n, v)| (n.to_string(), v.metadata(*n)))
            .collect();

        envelope(&json!({
            "cas_required": false,
            "created_time": secret.created_time,
            "current_version": secret.current_version,
            "delete_version_after": "0s",
            "max_versions": 0,
            "oldest_version": secret.versions.keys().next().copied().unwrap_or(0),
            "updated_time": secret.updated_time,
            "versions": versions,
        }))
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Transport for MemoryKv {
    async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
        Ok(self.handle(&request).await)
    }
}

fn envelope<T: serde::Serialize>(data: &T) -> RawResponse {
    let body = json!({
        "request_id": uuid::Uuid::new_v4().to_string(),
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": data,
        "wrap_info": null,
        "warnings": null,
        "auth": null,
    });
    RawResponse {
        status: 200,
        body: body.to_string().into_bytes(),
    }
}

fn errors(status: u16, messages: &[&str]) -> RawResponse {
    RawResponse {
        status,
        body: json!({ "errors": messages }).to_string().into_bytes(),
    }
}

fn no_content() -> RawResponse {
    RawResponse {
        status: 204,
        body: Vec::new(),
    }
}
