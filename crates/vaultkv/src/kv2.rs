//! KV version 2 secrets engine operations.
//!
//! Every operation is a single request against
//! `/v1/<mount>/<segment>/<path>` where the segment selects the endpoint
//! family: `config`, `data`, `metadata`, `delete`, `undelete`, `destroy`.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use reqwest::Method;
use tracing::debug;

use crate::client::{Client, decode_envelope, encode_body, endpoint, status_error};
use crate::error::KvError;
use crate::status::{Outcome, StatusKind, classify};
use crate::types::{
    EngineConfig, KeyList, SecretMetadata, SecretVersion, VersionMetadata, VersionsRequest,
    WriteOptions, WriteRequest,
};

/// Mount path used by [`Client::kv2`].
pub const DEFAULT_MOUNT_PATH: &str = "secret";

/// A [`Client`] bound to one KV v2 mount.
///
/// Deriving a handle for another mount with [`with_mount_path`] returns a
/// new value and leaves this one untouched.
///
/// [`with_mount_path`]: KvV2::with_mount_path
#[derive(Debug, Clone)]
pub struct KvV2 {
    client: Client,
    mount_path: String,
}

impl Client {
    /// Handle for the KV v2 engine mounted at `secret`.
    pub fn kv2(&self) -> KvV2 {
        KvV2 {
            client: self.clone(),
            mount_path: DEFAULT_MOUNT_PATH.to_owned(),
        }
    }
}

impl KvV2 {
    /// Mount path this handle addresses.
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    /// Independent handle for the engine mounted at `path`.
    #[must_use]
    pub fn with_mount_path(&self, path: &str) -> Self {
        debug!(mount = path, "using mount path");
        Self {
            client: self.client.clone(),
            mount_path: path.to_owned(),
        }
    }

    fn endpoint(&self, segment: &str, path: &str) -> String {
        endpoint(&self.mount_path, segment, path)
    }

    /// Write the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] if the server rejects the configuration.
    pub async fn configure(&self, config: &EngineConfig) -> Result<(), KvError> {
        let endpoint = self.endpoint("config", "");
        let body = encode_body(&endpoint, config)?;
        self.client
            .write_only(Method::POST, &endpoint, Some(body))
            .await
    }

    /// Read the current engine configuration. Never cached.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`], [`KvError::Decode`] or
    /// [`KvError::Projection`] on failure.
    pub async fn read_config(&self) -> Result<EngineConfig, KvError> {
        let endpoint = self.endpoint("config", "");
        self.client
            .read_data(Method::GET, &endpoint, &[], None)
            .await
    }

    /// Read one version of a secret. `version == 0` reads the latest.
    ///
    /// A version that was soft-deleted or destroyed is returned as a record
    /// with empty data and its `deletion_time`/`destroyed` markers set,
    /// rather than as an error.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] with
    /// [`StatusKind::InvalidPathOrNoPermission`] if the secret or version
    /// does not exist (or is not visible to the token).
    pub async fn read_secret_version(
        &self,
        path: &str,
        version: u64,
    ) -> Result<SecretVersion, KvError> {
        let endpoint = self.endpoint("data", path);
        let query: Vec<(&str, String)> = if version == 0 {
            Vec::new()
        } else {
            vec![("version", version.to_string())]
        };
        let response = self
            .client
            .round_trip(Method::GET, &endpoint, &query, None)
            .await?;

        match classify(response.status) {
            Outcome::Ok => decode_envelope(&endpoint, &response.body)?.into_data(&endpoint),
            Outcome::OkNoBody => Err(KvError::MissingData { endpoint }),
            // Deleted versions come back as 404 with the record attached.
            // Anything else in `data` leaves the 404 as it is.
            Outcome::Failed(StatusKind::InvalidPathOrNoPermission) => {
                decode_envelope(&endpoint, &response.body)
                    .and_then(|env| env.into_data::<SecretVersion>(&endpoint))
                    .map_err(|_| {
                        status_error(
                            &endpoint,
                            StatusKind::InvalidPathOrNoPermission,
                            &response.body,
                        )
                    })
            }
            Outcome::Failed(kind) => Err(status_error(&endpoint, kind, &response.body)),
        }
    }

    /// Write a new version of a secret.
    ///
    /// `options` is sent exactly as given; the client never fills in a
    /// check-and-set value. Returns the new version's metadata when the
    /// server reports it.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] with [`StatusKind::InvalidRequest`] when
    /// the check-and-set condition fails or is required but missing.
    pub async fn create_or_update_secret(
        &self,
        path: &str,
        data: &HashMap<String, String>,
        options: &WriteOptions,
    ) -> Result<Option<VersionMetadata>, KvError> {
        let endpoint = self.endpoint("data", path);
        let body = encode_body(
            &endpoint,
            &WriteRequest {
                data,
                options: *options,
            },
        )?;
        self.client
            .write_optional(Method::POST, &endpoint, Some(body))
            .await
    }

    /// Soft-delete the latest version of a secret.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] if the server rejects the request.
    pub async fn delete_latest_secret_version(&self, path: &str) -> Result<(), KvError> {
        let endpoint = self.endpoint("data", path);
        self.client
            .write_only(Method::DELETE, &endpoint, None)
            .await
    }

    /// Soft-delete specific versions. They can be restored with
    /// [`undelete_secret_versions`](Self::undelete_secret_versions).
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] if the server rejects the request.
    pub async fn delete_secret_versions(&self, path: &str, versions: &[u64]) -> Result<(), KvError> {
        self.post_versions("delete", path, versions).await
    }

    /// Restore soft-deleted versions.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] if the server rejects the request.
    pub async fn undelete_secret_versions(
        &self,
        path: &str,
        versions: &[u64],
    ) -> Result<(), KvError> {
        self.post_versions("undelete", path, versions).await
    }

    /// Permanently remove the data of specific versions.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] if the server rejects the request.
    pub async fn destroy_secret_versions(
        &self,
        path: &str,
        versions: &[u64],
    ) -> Result<(), KvError> {
        self.post_versions("destroy", path, versions).await
    }

    async fn post_versions(
        &self,
        segment: &str,
        path: &str,
        versions: &[u64],
    ) -> Result<(), KvError> {
        let endpoint = self.endpoint(segment, path);
        let body = encode_body(&endpoint, &VersionsRequest { versions })?;
        self.client
            .write_only(Method::POST, &endpoint, Some(body))
            .await
    }

    /// List key names directly under `path`. Sub-directories end in `/`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] with
    /// [`StatusKind::InvalidPathOrNoPermission`] when nothing lives under
    /// `path`.
    pub async fn list_secrets(&self, path: &str) -> Result<BTreeSet<String>, KvError> {
        let endpoint = format!("{}/", self.endpoint("metadata", path));
        let list: KeyList = self
            .client
            .read_data(Method::GET, &endpoint, &[("list", "true".to_owned())], None)
            .await?;
        Ok(list.keys.into_iter().collect())
    }

    /// Read the metadata and version history of a secret.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::Status`] if the secret does not exist.
    pub async fn read_secret_metadata(&self, path: &str) -> Result<SecretMetadata, KvError> {
        let endpoint = self.endpoint("metadata", path);
        self.client
            .read_data(Method::GET, &endpoint, &[], None)
            .await
    }

    /// Replace a secret's metadata settings. Not available yet.
    ///
    /// # Errors
    ///
    /// Always returns [`KvError::Unsupported`] without contacting the server.
    pub async fn update_metadata(
        &self,
        _path: &str,
        _max_versions: u32,
        _cas_required: bool,
        _delete_version_after: Duration,
    ) -> Result<(), KvError> {
        Err(KvError::Unsupported {
            operation: "update_metadata",
        })
    }

    /// Delete a secret's metadata and every version. Not available yet.
    ///
    /// # Errors
    ///
    /// Always returns [`KvError::Unsupported`] without contacting the server.
    pub async fn delete_metadata_and_all_versions(&self, _path: &str) -> Result<(), KvError> {
        Err(KvError::Unsupported {
            operation: "delete_metadata_and_all_versions",
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::error::TransportError;
    use crate::transport::{RawResponse, Transport, TransportRequest};

    /// Records every request and answers with a fixed response.
    struct Recorder {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<TransportRequest>>,
    }

    impl Recorder {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn last(&self) -> TransportRequest {
            self.seen.lock().unwrap().last().cloned().unwrap()
        }

        fn count(&self) -> usize {
            self.seen.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Transport for Recorder {
        async fn send(&self, request: TransportRequest) -> Result<RawResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(RawResponse {
                status: self.status,
                body: self.body.as_bytes().to_vec(),
            })
        }
    }

    fn kv(recorder: &Arc<Recorder>) -> KvV2 {
        Client::new(recorder.clone(), "http://vault:8200", "s.token").kv2()
    }

    fn body_json(req: &TransportRequest) -> serde_json::Value {
        serde_json::from_slice(req.body.as_deref().unwrap()).unwrap()
    }

    const SECRET: &str = r#"{"request_id":"r1","data":{"data":{"k":"v"},"metadata":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"","destroyed":false,"version":4}}}"#;

    #[test]
    fn derived_mount_does_not_alias_parent() {
        let rec = Recorder::new(204, "");
        let base = kv(&rec);
        let other = base.with_mount_path("kv");
        let third = other.with_mount_path("team/kv");
        assert_eq!(base.mount_path(), "secret");
        assert_eq!(other.mount_path(), "kv");
        assert_eq!(third.mount_path(), "team/kv");
    }

    #[tokio::test]
    async fn version_zero_omits_query() {
        let rec = Recorder::new(200, SECRET);
        kv(&rec).read_secret_version("foo", 0).await.unwrap();
        let req = rec.last();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.url, "http://vault:8200/v1/secret/data/foo");
        assert!(req.body.is_none());
    }

    #[tokio::test]
    async fn specific_version_sets_query() {
        let rec = Recorder::new(200, SECRET);
        let secret = kv(&rec).read_secret_version("foo", 4).await.unwrap();
        assert_eq!(rec.last().url, "http://vault:8200/v1/secret/data/foo?version=4");
        assert_eq!(secret.metadata.version, 4);
        assert_eq!(secret.data["k"], "v");
    }

    #[tokio::test]
    async fn requests_use_derived_mount() {
        let rec = Recorder::new(200, SECRET);
        kv(&rec)
            .with_mount_path("kv")
            .read_secret_version("bar", 3)
            .await
            .unwrap();
        assert_eq!(rec.last().url, "http://vault:8200/v1/kv/data/bar?version=3");
    }

    #[tokio::test]
    async fn write_sends_data_and_options() {
        let rec = Recorder::new(204, "");
        let data = HashMap::from([("mykey".to_owned(), "myval".to_owned())]);
        let meta = kv(&rec)
            .create_or_update_secret("mysecret", &data, &WriteOptions::cas(1))
            .await
            .unwrap();
        assert!(meta.is_none());
        let req = rec.last();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.url, "http://vault:8200/v1/secret/data/mysecret");
        assert_eq!(
            body_json(&req),
            serde_json::json!({ "data": { "mykey": "myval" }, "options": { "cas": 1 } })
        );
    }

    #[tokio::test]
    async fn write_without_cas_sends_no_cas() {
        let rec = Recorder::new(204, "");
        kv(&rec)
            .create_or_update_secret("foo", &HashMap::new(), &WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(
            body_json(&rec.last()),
            serde_json::json!({ "data": {}, "options": {} })
        );
    }

    #[tokio::test]
    async fn write_returns_reported_metadata() {
        let rec = Recorder::new(
            200,
            r#"{"data":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"","destroyed":false,"version":7}}"#,
        );
        let meta = kv(&rec)
            .create_or_update_secret("foo", &HashMap::new(), &WriteOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(meta.version, 7);
    }

    #[tokio::test]
    async fn version_operations_hit_their_segments() {
        for (segment, status) in [("delete", 204), ("undelete", 204), ("destroy", 200)] {
            let rec = Recorder::new(status, "");
            let kv = kv(&rec);
            let result = match segment {
                "delete" => kv.delete_secret_versions("app/db", &[1, 2]).await,
                "undelete" => kv.undelete_secret_versions("app/db", &[1, 2]).await,
                _ => kv.destroy_secret_versions("app/db", &[1, 2]).await,
            };
            result.unwrap();
            let req = rec.last();
            assert_eq!(req.method, Method::POST);
            assert_eq!(req.url, format!("http://vault:8200/v1/secret/{segment}/app/db"));
            assert_eq!(body_json(&req), serde_json::json!({ "versions": [1, 2] }));
        }
    }

    #[tokio::test]
    async fn delete_latest_uses_delete_method() {
        let rec = Recorder::new(204, "");
        kv(&rec).delete_latest_secret_version("foo").await.unwrap();
        let req = rec.last();
        assert_eq!(req.method, Method::DELETE);
        assert_eq!(req.url, "http://vault:8200/v1/secret/data/foo");
    }

    #[tokio::test]
    async fn configure_accepts_no_content() {
        let rec = Recorder::new(204, "");
        let cfg = EngineConfig {
            max_versions: 5,
            cas_required: false,
            delete_version_after: Duration::from_secs(12319),
        };
        kv(&rec).configure(&cfg).await.unwrap();
        let req = rec.last();
        assert_eq!(req.url, "http://vault:8200/v1/secret/config");
        assert_eq!(
            body_json(&req),
            serde_json::json!({
                "max_versions": 5,
                "cas_required": false,
                "delete_version_after": "3h25m19s"
            })
        );
    }

    #[tokio::test]
    async fn read_config_rejects_no_content() {
        let rec = Recorder::new(204, "");
        let err = kv(&rec).read_config().await.unwrap_err();
        assert!(matches!(err, KvError::MissingData { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn list_uses_metadata_with_list_flag() {
        let rec = Recorder::new(200, r#"{"data":{"keys":["foo","bar","app/"]}}"#);
        let keys = kv(&rec).list_secrets("/").await.unwrap();
        assert_eq!(rec.last().url, "http://vault:8200/v1/secret/metadata/?list=true");
        assert_eq!(
            keys,
            BTreeSet::from(["app/".to_owned(), "bar".to_owned(), "foo".to_owned()])
        );
    }

    #[tokio::test]
    async fn status_failures_keep_kind_and_messages() {
        let rec = Recorder::new(503, r#"{"errors":["Vault is sealed"]}"#);
        let err = kv(&rec).read_config().await.unwrap_err();
        match err {
            KvError::Status {
                kind,
                endpoint,
                errors,
            } => {
                assert_eq!(kind, StatusKind::Sealed);
                assert_eq!(endpoint, "secret/config");
                assert_eq!(errors, vec!["Vault is sealed".to_owned()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn not_found_without_data_is_status_error() {
        let rec = Recorder::new(404, r#"{"errors":[]}"#);
        let err = kv(&rec).read_secret_version("nope", 0).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[tokio::test]
    async fn not_found_with_deleted_record_returns_record() {
        let rec = Recorder::new(
            404,
            r#"{"data":{"data":null,"metadata":{"created_time":"2024-05-01T10:00:00Z","deletion_time":"2024-05-02T10:00:00Z","destroyed":false,"version":1}}}"#,
        );
        let secret = kv(&rec).read_secret_version("foo", 1).await.unwrap();
        assert!(secret.is_deleted());
        assert!(secret.data.is_empty());
    }

    #[tokio::test]
    async fn not_found_with_foreign_data_stays_not_found() {
        let rec = Recorder::new(404, r#"{"data":{"message":"gone"}}"#);
        let err = kv(&rec).read_secret_version("foo", 0).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
        assert_eq!(err.status_kind(), Some(StatusKind::InvalidPathOrNoPermission));
    }

    #[tokio::test]
    async fn not_found_with_unparsable_body_stays_not_found() {
        let rec = Recorder::new(404, "<html>404</html>");
        let err = kv(&rec).read_secret_version("foo", 0).await.unwrap_err();
        assert!(err.is_not_found(), "{err:?}");
    }

    #[tokio::test]
    async fn unsupported_operations_fail_without_round_trip() {
        let rec = Recorder::new(204, "");
        let kv = kv(&rec);
        let err = kv
            .update_metadata("foo", 3, true, Duration::ZERO)
            .await
            .unwrap_err();
        assert!(matches!(err, KvError::Unsupported { operation: "update_metadata" }));
        let err = kv.delete_metadata_and_all_versions("foo").await.unwrap_err();
        assert!(matches!(
            err,
            KvError::Unsupported {
                operation: "delete_metadata_and_all_versions"
            }
        ));
        assert_eq!(rec.count(), 0);
    }
}
