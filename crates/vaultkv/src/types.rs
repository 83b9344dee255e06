//! Public record types for the KV v2 engine.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::duration::go_string;

/// One version of a secret, as returned by a data read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretVersion {
    /// The secret's key/value pairs. Empty for deleted or destroyed versions.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: HashMap<String, String>,
    /// Version bookkeeping.
    pub metadata: VersionMetadata,
}

impl SecretVersion {
    /// Whether this version has been soft-deleted or destroyed.
    pub fn is_deleted(&self) -> bool {
        self.metadata.deletion_time.is_some() || self.metadata.destroyed
    }
}

/// Bookkeeping for a single secret version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// When the version was written.
    pub created_time: DateTime<Utc>,
    /// When the version was soft-deleted. Sent as `""` when not deleted.
    #[serde(default, with = "optional_timestamp")]
    pub deletion_time: Option<DateTime<Utc>>,
    /// Whether the version's data has been permanently removed.
    #[serde(default)]
    pub destroyed: bool,
    /// Version number, starting at 1.
    #[serde(default)]
    pub version: u64,
}

/// Mount-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Versions kept per secret. `0` selects the engine default.
    #[serde(default)]
    pub max_versions: u32,
    /// Whether every write must carry a check-and-set version.
    #[serde(default)]
    pub cas_required: bool,
    /// Age after which versions are soft-deleted. Zero disables it.
    #[serde(default, with = "go_string")]
    pub delete_version_after: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_versions: 0,
            cas_required: false,
            delete_version_after: Duration::ZERO,
        }
    }
}

/// Options for [`KvV2::create_or_update_secret`](crate::KvV2::create_or_update_secret).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteOptions {
    /// Check-and-set version. `Some(0)` writes only if the key does not
    /// exist; `Some(n)` only if the current version is `n`. `None` omits
    /// the parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cas: Option<u64>,
}

impl WriteOptions {
    /// Options carrying the given check-and-set version.
    pub fn cas(version: u64) -> Self {
        Self { cas: Some(version) }
    }
}

/// Metadata for every version of a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretMetadata {
    #[serde(default)]
    pub cas_required: bool,
    pub created_time: DateTime<Utc>,
    pub current_version: u64,
    #[serde(default, with = "go_string")]
    pub delete_version_after: Duration,
    #[serde(default)]
    pub max_versions: u32,
    #[serde(default)]
    pub oldest_version: u64,
    pub updated_time: DateTime<Utc>,
    /// Per-version bookkeeping, keyed by version number.
    #[serde(default, deserialize_with = "versions_by_number")]
    pub versions: BTreeMap<u64, VersionMetadata>,
}

// ── Request bodies ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct WriteRequest<'a> {
    pub data: &'a HashMap<String, String>,
    pub options: WriteOptions,
}

#[derive(Debug, Serialize)]
pub(crate) struct VersionsRequest<'a> {
    pub versions: &'a [u64],
}

#[derive(Debug, Deserialize)]
pub(crate) struct KeyList {
    #[serde(default)]
    pub keys: Vec<String>,
}

// ── Serde helpers ────────────────────────────────────────────────────

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The server keys versions by decimal strings and omits the number from
/// each entry; fill it back in from the key.
fn versions_by_number<'de, D>(deserializer: D) -> Result<BTreeMap<u64, VersionMetadata>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<u64, VersionMetadata> = null_as_default(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(number, mut meta)| {
            meta.version = number;
            (number, meta)
        })
        .collect())
}

/// RFC 3339 timestamp that the server sends as `""` when unset.
mod optional_timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            None => serializer.serialize_str(""),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => DateTime::parse_from_rfc3339(text)
                .map(|ts| Some(ts.with_timezone(&Utc)))
                .map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_version() -> SecretVersion {
        SecretVersion {
            data: HashMap::from([
                ("username".to_owned(), "admin".to_owned()),
                ("password".to_owned(), "hunter2".to_owned()),
            ]),
            metadata: VersionMetadata {
                created_time: "2018-03-22T02:24:06.945319214Z".parse().unwrap(),
                deletion_time: None,
                destroyed: false,
                version: 2,
            },
        }
    }

    #[test]
    fn secret_version_from_server_json() {
        let raw = json!({
            "data": { "foo": "bar" },
            "metadata": {
                "created_time": "2018-03-22T02:24:06.945319214Z",
                "custom_metadata": null,
                "deletion_time": "",
                "destroyed": false,
                "version": 1
            }
        });
        let secret: SecretVersion = serde_json::from_value(raw).unwrap();
        assert_eq!(secret.data.get("foo").map(String::as_str), Some("bar"));
        assert_eq!(secret.metadata.version, 1);
        assert_eq!(secret.metadata.deletion_time, None);
        assert!(!secret.is_deleted());
    }

    #[test]
    fn deleted_version_has_null_data() {
        let raw = json!({
            "data": null,
            "metadata": {
                "created_time": "2018-03-22T02:24:06.945319214Z",
                "deletion_time": "2018-03-22T02:30:00Z",
                "destroyed": false,
                "version": 1
            }
        });
        let secret: SecretVersion = serde_json::from_value(raw).unwrap();
        assert!(secret.data.is_empty());
        assert!(secret.is_deleted());
    }

    #[test]
    fn secret_version_json_roundtrip() {
        let mut original = sample_version();
        let encoded = serde_json::to_value(&original).unwrap();
        assert_eq!(encoded["metadata"]["deletion_time"], json!(""));
        let decoded: SecretVersion = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, original);

        original.metadata.deletion_time = Some("2024-01-02T03:04:05.123456789Z".parse().unwrap());
        let decoded: SecretVersion =
            serde_json::from_value(serde_json::to_value(&original).unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn engine_config_parses_go_durations() {
        let cfg: EngineConfig = serde_json::from_value(json!({
            "max_versions": 5,
            "cas_required": true,
            "delete_version_after": "3h25m19s"
        }))
        .unwrap();
        assert_eq!(cfg.max_versions, 5);
        assert!(cfg.cas_required);
        assert_eq!(cfg.delete_version_after, Duration::from_secs(12319));

        let encoded = serde_json::to_value(&cfg).unwrap();
        assert_eq!(encoded["delete_version_after"], json!("3h25m19s"));
    }

    #[test]
    fn write_options_omit_missing_cas() {
        let body = serde_json::to_value(WriteOptions::default()).unwrap();
        assert_eq!(body, json!({}));
        let body = serde_json::to_value(WriteOptions::cas(0)).unwrap();
        assert_eq!(body, json!({ "cas": 0 }));
    }

    #[test]
    fn metadata_versions_are_numbered_from_keys() {
        let meta: SecretMetadata = serde_json::from_value(json!({
            "cas_required": false,
            "created_time": "2018-03-22T02:24:06.945319214Z",
            "current_version": 3,
            "delete_version_after": "0s",
            "max_versions": 0,
            "oldest_version": 1,
            "updated_time": "2018-03-22T02:36:43.986212308Z",
            "versions": {
                "1": {
                    "created_time": "2018-03-22T02:24:06.945319214Z",
                    "deletion_time": "",
                    "destroyed": false
                },
                "3": {
                    "created_time": "2018-03-22T02:36:43.986212308Z",
                    "deletion_time": "",
                    "destroyed": true
                }
            }
        }))
        .unwrap();
        assert_eq!(meta.current_version, 3);
        assert_eq!(meta.versions.len(), 2);
        assert_eq!(meta.versions[&1].version, 1);
        assert!(meta.versions[&3].destroyed);
        assert_eq!(meta.versions[&3].version, 3);
    }
}
