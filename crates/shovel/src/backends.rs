//! 🔌 Backends: where the bytes leave the building.
//!
//! 🎭 One capability, two costumes. Every backend can do exactly one thing:
//! take a fully rendered `_bulk` NDJSON payload and tell us, per document, how it went.
//! - `LocalOpenSearch`: plain HTTP, no auth (or basic auth if you insist). For docker, localstack, CI.
//! - `AwsOpenSearch`: HTTPS on 443, every request SigV4-signed with whatever credentials the
//!   AWS environment coughs up. For the managed cluster that pays the bills.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `BackendHandle` enum that dispatches. Callers depend on
//!   the trait, never on which costume is being worn.
//! - `select_backend` is the casting director: port 443 gets the suit, everyone else gets jeans.
//! - Selection does zero network I/O against the cluster. If the cluster is down, you find out
//!   on the first bulk request, not before.
//! - Backends do not retry. Backends do not count. They send, they parse, they classify errors.
//!   Retrying and counting is the sink's job. 🦆

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use serde_json::value::RawValue;
use thiserror::Error;

use crate::error::ShovelError;

pub(crate) mod aws;
pub(crate) mod opensearch;

pub use aws::AwsOpenSearch;
pub use opensearch::LocalOpenSearch;

/// 🔒 The port that means "this is the real, managed, authenticated cluster".
pub const SECURE_PORT: u16 = 443;

// ============================================================
// 🔧 BackendConfig: where is the cluster and how do we talk to it
// ============================================================

/// 🔧 Connection parameters. Lives next to the backends that use it, so nobody has to go
/// on a scavenger hunt at 2am to find where `port` is defined.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct BackendConfig {
    /// 📡 Hostname of the cluster. No scheme, no port. Just the name.
    pub host: String,
    /// 🔌 443 = AWS-signed HTTPS. Anything else = plain local HTTP.
    #[serde(default = "default_port")]
    pub port: u16,
    /// 🌎 SigV4 region. Falls back to the AWS environment (`AWS_REGION`, `AWS_DEFAULT_REGION`, profile).
    #[serde(default)]
    pub region: Option<String>,
    /// ✍️ SigV4 service name. `es` for managed domains, `aoss` for serverless.
    #[serde(default = "default_service")]
    pub service: String,
    /// 🔒 Basic auth for the local path, for clusters running the security plugin.
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// ⏰ Per-request timeout. Bulk requests can be meaty.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    SECURE_PORT
}

fn default_service() -> String {
    "es".to_string()
}

// ⏰ 120 seconds. If a bulk request of 200 events takes longer than that, it is not coming back.
fn default_request_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl BackendConfig {
    /// 🏗️ Minimal config for a host and port, everything else defaulted.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            region: None,
            service: default_service(),
            username: None,
            password: None,
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }

    pub fn is_secure(&self) -> bool {
        self.port == SECURE_PORT
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

// ============================================================
// 📬 BulkReply: what `_bulk` says back
// ============================================================

/// 📬 The parsed `_bulk` response. `items` line up with the submitted documents by position.
#[derive(Debug, Deserialize, Default)]
pub struct BulkReply {
    #[serde(default)]
    pub errors: bool,
    #[serde(default, deserialize_with = "unwrap_actions")]
    pub items: Vec<BulkItem>,
}

/// 📄 One document's fate.
#[derive(Debug, Deserialize, Default)]
pub struct BulkItem {
    #[serde(rename = "_id", default)]
    pub id: Option<String>,
    /// 🔢 0 when the cluster sent an item we could not make sense of (counted failed)
    #[serde(default)]
    pub status: u16,
    /// 💀 Kept raw. We log it, we do not interrogate it.
    #[serde(default)]
    pub error: Option<Box<RawValue>>,
}

impl BulkItem {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 🐢 The cluster asked this one document to come back later.
    pub fn is_throttled(&self) -> bool {
        self.status == 429
    }
}

// -- 📦 each item is `{"index": {...}}` (or `create`/`update`/`delete`), we only want the inside
fn unwrap_actions<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<BulkItem>, D::Error> {
    let raw: Vec<HashMap<String, BulkItem>> = Vec::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|action| action.into_values().next().unwrap_or_default())
        .collect())
}

// ============================================================
// 💀 BackendError: how a bulk request can go wrong
// ============================================================

/// 💀 Things a backend can report instead of a `BulkReply`.
#[derive(Error, Debug)]
pub enum BackendError {
    /// 🐢 429 / 502 / 503 / 504. The cluster is alive but busy. Try again later.
    #[error("📡 cluster is throttling or unavailable (HTTP {status}): {body}")]
    Unavailable { status: u16, body: String },

    /// ⏰ We waited the whole request timeout and got nothing.
    #[error("⏰ bulk request timed out")]
    Timeout(#[source] reqwest::Error),

    /// 🚫 Any other non-2xx. Retrying the same request will get the same answer.
    #[error("🚫 cluster rejected the bulk request (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    /// 📡 Connection refused, DNS failure, TLS tantrum. The cluster is not there.
    #[error("📡 could not reach the cluster")]
    Transport(#[source] reqwest::Error),

    /// 🔒 No credentials, or the signer choked on them.
    #[error("🔒 could not sign the bulk request: {0}")]
    Signing(String),

    /// 🧩 2xx, but the body was not a `_bulk` response.
    #[error("🧩 bulk response was not the JSON we were promised")]
    MalformedReply(#[source] serde_json::Error),
}

impl BackendError {
    /// 🔄 Worth another attempt after a nap?
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout(_))
    }
}

// ============================================================
// 🎭 The trait and the enum
// ============================================================

/// 🕳️ A destination for `_bulk` payloads.
///
/// # Contract 📜
/// - `submit_bulk` POSTs one fully rendered NDJSON payload (trailing `\n` included) and
///   returns the parsed reply, or a classified error. One attempt. No retries.
/// - Implementations are shared by reference across concurrent submitters, so `&self` only.
#[async_trait]
pub trait BulkBackend: std::fmt::Debug + Send + Sync {
    async fn submit_bulk(&self, payload: String) -> Result<BulkReply, BackendError>;

    /// 📡 Base URL, for logs.
    fn endpoint(&self) -> &str;
}

/// 🎭 The already-configured connection to the cluster, chosen once per run.
#[derive(Debug)]
pub enum BackendHandle {
    Aws(AwsOpenSearch),
    Local(LocalOpenSearch),
}

impl BackendHandle {
    pub fn kind(&self) -> &'static str {
        match self {
            BackendHandle::Aws(_) => "aws-sigv4",
            BackendHandle::Local(_) => "local",
        }
    }
}

#[async_trait]
impl BulkBackend for BackendHandle {
    async fn submit_bulk(&self, payload: String) -> Result<BulkReply, BackendError> {
        match self {
            BackendHandle::Aws(backend) => backend.submit_bulk(payload).await,
            BackendHandle::Local(backend) => backend.submit_bulk(payload).await,
        }
    }

    fn endpoint(&self) -> &str {
        match self {
            BackendHandle::Aws(backend) => backend.endpoint(),
            BackendHandle::Local(backend) => backend.endpoint(),
        }
    }
}

/// 🎬 Casting call: port 443 gets the authenticated AWS client, everything else gets local.
///
/// Reads AWS region/credential configuration for the secure path, but never talks to the
/// cluster. Connection problems show up on first use.
pub async fn select_backend(config: &BackendConfig) -> Result<BackendHandle, ShovelError> {
    if config.host.trim().is_empty() {
        return Err(ShovelError::config("backend host is empty"));
    }
    if config.is_secure() {
        Ok(BackendHandle::Aws(AwsOpenSearch::from_environment(config).await?))
    } else {
        Ok(BackendHandle::Local(LocalOpenSearch::new(config)?))
    }
}
