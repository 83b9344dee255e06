//! Client configuration.
//!
//! Loads the server address and token from the environment with the same
//! variable names the `vault` CLI uses.

use std::time::Duration;

use tracing::warn;

use crate::duration::parse_duration;

/// Address used when none is configured.
pub const DEFAULT_ADDRESS: &str = "http://127.0.0.1:8200";

/// Connection settings for a [`Client`](crate::Client).
#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server base address, e.g. `https://vault.internal:8200`.
    pub address: String,
    /// Client token sent with every request.
    pub token: String,
    /// Per-request timeout applied by the HTTP transport.
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_ADDRESS.to_owned(),
            token: String::new(),
            timeout: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables.
    ///
    /// - `VAULT_ADDR`: server address (default: `http://127.0.0.1:8200`)
    /// - `VAULT_TOKEN`: client token (default: empty)
    /// - `VAULT_CLIENT_TIMEOUT`: request timeout, e.g. `30s` or `30`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let address = lookup("VAULT_ADDR")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_owned());

        let token = lookup("VAULT_TOKEN").unwrap_or_default();

        let timeout = lookup("VAULT_CLIENT_TIMEOUT").and_then(|raw| match parse_duration(&raw) {
            Ok(d) if !d.is_zero() => Some(d),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "ignoring VAULT_CLIENT_TIMEOUT");
                None
            }
        });

        Self {
            address,
            token,
            timeout,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("address", &self.address)
            .field("token", &if self.token.is_empty() { "<unset>" } else { "<redacted>" })
            .field("timeout", &self.timeout)
            .finish()
    }
}
