//! Error types for `vaultkv`.
//!
//! Every failure is returned to the caller as a [`KvError`] that can be
//! branched on by kind. Status failures keep the classified
//! [`StatusKind`] so a sealed vault, a denied token and a missing path stay
//! distinguishable. Error values never include the client token.

use crate::status::StatusKind;

/// Errors raised by a [`Transport`](crate::transport::Transport) before a
/// status code was received.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {reason}")]
    Build { reason: String },

    /// The request did not complete within the configured timeout.
    #[error("request to '{url}' timed out")]
    Timeout { url: String },

    /// Network, DNS, TLS or body read failure.
    #[error("request to '{url}' failed: {source}")]
    Network {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

/// All errors that can occur when talking to a KV v2 mount.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum KvError {
    /// The request never produced a status code.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a non-success status.
    #[error("{endpoint}: {kind}{}", format_server_errors(.errors))]
    Status {
        /// Classified status.
        kind: StatusKind,
        /// Endpoint path relative to `/v1/`.
        endpoint: String,
        /// Messages from the server's `errors` array, if it sent any.
        errors: Vec<String>,
    },

    /// The response body was not a well-formed envelope.
    #[error("{endpoint}: malformed response envelope: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope's `data` did not match the requested record type.
    #[error("response data does not match {target}: {source}")]
    Projection {
        target: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// A response body was expected but the server returned none.
    #[error("{endpoint}: expected response data, got none")]
    MissingData { endpoint: String },

    /// The request body could not be serialized.
    #[error("{endpoint}: failed to encode request body: {source}")]
    Encode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    /// The operation is not available through this client yet.
    #[error("operation '{operation}' is not supported")]
    Unsupported { operation: &'static str },
}

impl KvError {
    /// The classified status, if this is a status failure.
    pub fn status_kind(&self) -> Option<StatusKind> {
        match self {
            Self::Status { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Whether the server reported the path as missing (or hidden).
    pub fn is_not_found(&self) -> bool {
        matches!(self.status_kind(), Some(StatusKind::InvalidPathOrNoPermission))
    }
}

fn format_server_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        String::new()
    } else {
        format!(" ({})", errors.join("; "))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_error_display_includes_server_messages() {
        let err = KvError::Status {
            kind: StatusKind::InvalidRequest,
            endpoint: "secret/data/foo".to_owned(),
            errors: vec!["check-and-set parameter required for this call".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("secret/data/foo: "), "{msg}");
        assert!(msg.ends_with("(check-and-set parameter required for this call)"), "{msg}");
    }

    #[test]
    fn status_error_display_without_server_messages() {
        let err = KvError::Status {
            kind: StatusKind::Sealed,
            endpoint: "secret/config".to_owned(),
            errors: Vec::new(),
        };
        assert!(!err.to_string().contains('('));
    }

    #[test]
    fn status_kind_accessors() {
        let err = KvError::Status {
            kind: StatusKind::InvalidPathOrNoPermission,
            endpoint: "secret/data/missing".to_owned(),
            errors: Vec::new(),
        };
        assert_eq!(err.status_kind(), Some(StatusKind::InvalidPathOrNoPermission));
        assert!(err.is_not_found());

        let err = KvError::Unsupported {
            operation: "update_metadata",
        };
        assert_eq!(err.status_kind(), None);
        assert!(!err.is_not_found());
    }
}
