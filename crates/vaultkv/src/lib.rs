//! Client library for the KV version 2 secrets engine.
//!
//! A [`Client`] holds the server address, a token and a [`Transport`].
//! [`Client::kv2`] returns a [`KvV2`] handle bound to the `secret` mount;
//! [`KvV2::with_mount_path`] derives handles for other mounts. Every call
//! is one HTTP round trip whose status is classified, whose JSON envelope
//! is decoded, and whose `data` payload is projected into a typed result.
//!
//! [`MemoryKv`] is an in-process engine that speaks the same wire format,
//! for tests and offline use.
//!
//! ```
//! # use std::collections::HashMap;
//! # use std::sync::Arc;
//! # use vaultkv::{Client, MemoryKv, WriteOptions};
//! # #[tokio::main]
//! # async fn main() -> Result<(), vaultkv::KvError> {
//! let client = Client::new(Arc::new(MemoryKv::new()), "http://127.0.0.1:8200", "root");
//! let kv = client.kv2();
//!
//! let data = HashMap::from([("password".to_owned(), "hunter2".to_owned())]);
//! kv.create_or_update_secret("app/db", &data, &WriteOptions::default()).await?;
//!
//! let secret = kv.read_secret_version("app/db", 0).await?;
//! assert_eq!(secret.data["password"], "hunter2");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod duration;
pub mod envelope;
pub mod error;
pub mod kv2;
pub mod memory;
pub mod status;
pub mod transport;
pub mod types;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_ADDRESS};
pub use duration::{DurationError, format_duration, parse_duration};
pub use envelope::Envelope;
pub use error::{KvError, TransportError};
pub use kv2::{DEFAULT_MOUNT_PATH, KvV2};
pub use memory::MemoryKv;
pub use status::{Outcome, StatusKind, classify};
pub use transport::{HttpTransport, RawResponse, Transport, TransportRequest};
pub use types::{EngineConfig, SecretMetadata, SecretVersion, VersionMetadata, WriteOptions};
