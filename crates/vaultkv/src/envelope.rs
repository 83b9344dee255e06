//! The uniform response wrapper and payload projection.
//!
//! Decoding happens in two explicit steps. [`decode`] parses the wrapper and
//! keeps `data` as an untyped [`serde_json::Value`]; [`project`] re-decodes
//! that value into whatever record the calling operation expects. New record
//! types never require a change here.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::KvError;

/// Outer JSON object wrapping every response that has a body.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Envelope {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub request_id: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub lease_id: String,
    #[serde(default)]
    pub renewable: bool,
    /// Lease duration in seconds.
    #[serde(default)]
    pub lease_duration: u64,
    /// Endpoint-specific payload.
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub wrap_info: Option<Value>,
    #[serde(default)]
    pub warnings: Option<Value>,
    #[serde(default)]
    pub auth: Option<Value>,
}

impl Envelope {
    /// Project `data` into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`KvError::MissingData`] when `data` is absent or `null`, and
    /// [`KvError::Projection`] when it does not fit `T`.
    pub fn into_data<T: DeserializeOwned>(self, endpoint: &str) -> Result<T, KvError> {
        match self.data {
            None | Some(Value::Null) => Err(KvError::MissingData {
                endpoint: endpoint.to_owned(),
            }),
            Some(data) => project(data),
        }
    }

    /// Warning strings attached by the server, if any.
    pub fn warning_messages(&self) -> Vec<&str> {
        match &self.warnings {
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }
}

/// Parse raw response bytes into an [`Envelope`].
///
/// # Errors
///
/// Returns [`KvError::Decode`] if the bytes are not a JSON object of the
/// envelope's shape.
pub fn decode(endpoint: &str, bytes: &[u8]) -> Result<Envelope, KvError> {
    serde_json::from_slice(bytes).map_err(|source| KvError::Decode {
        endpoint: endpoint.to_owned(),
        source,
    })
}

/// Re-decode an untyped payload into `T`.
///
/// # Errors
///
/// Returns [`KvError::Projection`] naming `T` when a required field is
/// missing or has the wrong type.
pub fn project<T: DeserializeOwned>(data: Value) -> Result<T, KvError> {
    serde_json::from_value(data).map_err(|source| KvError::Projection {
        target: std::any::type_name::<T>(),
        source,
    })
}

/// Error bodies look like `{"errors": ["..."]}`. Anything else yields no
/// messages.
pub(crate) fn server_errors(bytes: &[u8]) -> Vec<String> {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        errors: Vec<String>,
    }

    serde_json::from_slice::<ErrorBody>(bytes)
        .map(|body| body.errors)
        .unwrap_or_default()
}

fn null_as_empty<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
