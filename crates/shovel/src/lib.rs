//! 🪏 shovel: dig compressed JSON-lines logs out of the archive and into an OpenSearch index.
//!
//! 🧠 Knowledge graph:
//! ```text
//! files ─▶ walker ─▶ decompress ─▶ batcher ─▶ enrich ─▶ sink ─▶ backend ─▶ _bulk
//!                                   (200)     (id, @timestamp) (retries) (local | aws-sigv4)
//! ```
//! - `run` is the front door: validate, pick the backend once, hand everything to the `Supervisor`.
//! - Per-file trouble is counted, not fatal. The run only fails at the end, and only by count.

pub mod app_config;
pub mod backends;
pub mod batcher;
pub mod common;
pub mod decompress;
pub mod enrich;
pub mod error;
pub mod sink;
pub mod supervisors;
pub mod walker;

mod progress;

pub use app_config::{AppConfig, BackendOverrides, ConfigOverrides, RuntimeConfig, load_config};
pub use backends::{BackendConfig, BackendHandle, BulkBackend, select_backend};
pub use common::{BulkResult, RunSummary};
pub use error::ShovelError;
pub use sink::{BulkSink, RetryPolicy};
pub use supervisors::Supervisor;
pub use walker::discover_files;

use tracing::info;

/// 🚀 Shovel everything `config.files` points at into `config.index`.
///
/// 💀 `ShovelError::Config` before any file is touched if the config is unusable.
/// `ShovelError::FailedFiles` at the end if any file failed. Otherwise the summary.
pub async fn run(config: AppConfig) -> Result<RunSummary, ShovelError> {
    config.validate()?;
    let backend = select_backend(&config.backend).await?;
    info!("🔌 using the {} backend at {}", backend.kind(), backend.endpoint());
    Supervisor::new(config, backend).run().await
}
