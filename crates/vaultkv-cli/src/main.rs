//! `vaultkv`: command-line client for a KV v2 secrets engine mount.
//!
//! A thin front end over the `vaultkv` library. Every command performs one
//! request and prints the result as pretty JSON on stdout.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use vaultkv::{Client, ClientConfig, EngineConfig, KvV2, WriteOptions, parse_duration};

// ── CLI structure ────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "vaultkv",
    version,
    about = "vaultkv CLI: read and write versioned secrets in a KV v2 mount",
    long_about = None,
    after_help = "Environment variables:\n  \
         VAULT_ADDR            Server address (default: http://127.0.0.1:8200)\n  \
         VAULT_TOKEN           Authentication token\n  \
         VAULT_CLIENT_TIMEOUT  Request timeout, e.g. 30s\n  \
         VAULTKV_LOG           Log filter (default: warn)\n\n\
         Examples:\n  \
         vaultkv put myapp/config db_host=10.0.0.1 db_port=5432\n  \
         vaultkv get myapp/config --version 2\n  \
         vaultkv delete myapp/config --versions 1,2"
)]
struct Cli {
    /// Server address.
    #[arg(long, env = "VAULT_ADDR", default_value = vaultkv::DEFAULT_ADDRESS)]
    address: String,

    /// Authentication token.
    #[arg(long, env = "VAULT_TOKEN", default_value = "", hide_env_values = true)]
    token: String,

    /// Mount path of the KV v2 engine.
    #[arg(long, default_value = vaultkv::DEFAULT_MOUNT_PATH)]
    mount: String,

    /// Per-request timeout, e.g. `30s` or `1m`.
    #[arg(long, env = "VAULT_CLIENT_TIMEOUT", value_parser = parse_duration)]
    timeout: Option<Duration>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read a secret. Reads the latest version unless --version is given.
    Get {
        /// Secret path (e.g., "myapp/config").
        path: String,
        /// Version to read; 0 means latest.
        #[arg(long, default_value = "0")]
        version: u64,
    },
    /// Write a new version of a secret (key=value pairs).
    Put {
        /// Secret path.
        path: String,
        /// Key-value pairs in key=value format.
        #[arg(required = true)]
        data: Vec<String>,
        /// Only write if the current version equals this (0: key must not exist).
        #[arg(long)]
        cas: Option<u64>,
    },
    /// Soft-delete the latest version, or the listed versions.
    Delete {
        /// Secret path.
        path: String,
        /// Comma-separated version numbers.
        #[arg(long, value_delimiter = ',')]
        versions: Vec<u64>,
    },
    /// Restore soft-deleted versions.
    Undelete {
        /// Secret path.
        path: String,
        /// Comma-separated version numbers.
        #[arg(long, value_delimiter = ',', required = true)]
        versions: Vec<u64>,
    },
    /// Permanently destroy the data of the listed versions.
    Destroy {
        /// Secret path.
        path: String,
        /// Comma-separated version numbers.
        #[arg(long, value_delimiter = ',', required = true)]
        versions: Vec<u64>,
    },
    /// List keys under a path. Directories end in "/".
    List {
        /// Path prefix (default: mount root).
        #[arg(default_value = "")]
        path: String,
    },
    /// Show the metadata and version history of a secret.
    Metadata {
        /// Secret path.
        path: String,
    },
    /// Engine configuration operations.
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the engine configuration.
    Read,
    /// Replace the engine configuration.
    Write {
        /// Versions kept per secret (0: engine default).
        #[arg(long, default_value = "0")]
        max_versions: u32,
        /// Require check-and-set on every write.
        #[arg(long)]
        cas_required: bool,
        /// Soft-delete versions older than this, e.g. `720h` (0s: never).
        #[arg(long, default_value = "0s", value_parser = parse_duration)]
        delete_version_after: Duration,
    },
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_env("VAULTKV_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ClientConfig {
        address: cli.address,
        token: cli.token,
        timeout: cli.timeout.filter(|d| !d.is_zero()),
    };
    let client = Client::from_config(&config).context("failed to build HTTP client")?;
    let kv = client.kv2().with_mount_path(&cli.mount);

    match cli.command {
        Commands::Get { path, version } => {
            let secret = kv
                .read_secret_version(&path, version)
                .await
                .with_context(|| format!("failed to read {path}"))?;
            print_json(&secret)
        }
        Commands::Put { path, data, cas } => {
            let data = parse_kv_pairs(&data)?;
            let options = WriteOptions { cas };
            let written = kv
                .create_or_update_secret(&path, &data, &options)
                .await
                .with_context(|| format!("failed to write {path}"))?;
            match written {
                Some(meta) => print_json(&meta),
                None => Ok(()),
            }
        }
        Commands::Delete { path, versions } => {
            let result = if versions.is_empty() {
                kv.delete_latest_secret_version(&path).await
            } else {
                kv.delete_secret_versions(&path, &versions).await
            };
            result.with_context(|| format!("failed to delete {path}"))
        }
        Commands::Undelete { path, versions } => kv
            .undelete_secret_versions(&path, &versions)
            .await
            .with_context(|| format!("failed to undelete {path}")),
        Commands::Destroy { path, versions } => kv
            .destroy_secret_versions(&path, &versions)
            .await
            .with_context(|| format!("failed to destroy {path}")),
        Commands::List { path } => {
            let keys = kv
                .list_secrets(&path)
                .await
                .with_context(|| format!("failed to list {}", display_path(&path)))?;
            print_json(&keys)
        }
        Commands::Metadata { path } => {
            let meta = kv
                .read_secret_metadata(&path)
                .await
                .with_context(|| format!("failed to read metadata for {path}"))?;
            print_json(&meta)
        }
        Commands::Config { action } => cmd_config(&kv, action).await,
    }
}

async fn cmd_config(kv: &KvV2, action: ConfigCommands) -> Result<()> {
    match action {
        ConfigCommands::Read => {
            let config = kv
                .read_config()
                .await
                .context("failed to read engine configuration")?;
            print_json(&config)
        }
        ConfigCommands::Write {
            max_versions,
            cas_required,
            delete_version_after,
        } => {
            let config = EngineConfig {
                max_versions,
                cas_required,
                delete_version_after,
            };
            kv.configure(&config)
                .await
                .context("failed to write engine configuration")
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn parse_kv_pairs(pairs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    for pair in pairs {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("invalid key=value pair: '{pair}'");
        };
        if key.is_empty() {
            bail!("empty key in pair: '{pair}'");
        }
        map.insert(key.to_owned(), value.to_owned());
    }
    Ok(map)
}

fn display_path(path: &str) -> &str {
    if path.is_empty() { "/" } else { path }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let s = serde_json::to_string_pretty(value).context("failed to format JSON")?;
    println!("{s}");
    Ok(())
}
