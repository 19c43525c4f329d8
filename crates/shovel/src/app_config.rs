//! 🔧 App Configuration: where the shovel learns which pile, which truck, and how hard to dig.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." (every developer at 3am) 🦆
//!
//! 🧠 Knowledge graph (lowest priority first, later layers win):
//! 1. serde defaults on the structs below
//! 2. environment: `SHOVEL_` prefix, `__` for nesting (`SHOVEL_BACKEND__HOST=localhost`)
//! 3. an optional TOML file, only if someone actually passed one
//! 4. CLI flags, via `ConfigOverrides`. The flags you typed beat the file you forgot about.
//!
//! 💀 Anything missing or nonsense comes back as `ShovelError::Config`, before a single
//! file is opened or a single packet leaves the machine.

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backends::BackendConfig;
use crate::batcher::DEFAULT_BATCH_SIZE;
use crate::error::ShovelError;
use crate::sink::RetryPolicy;

const ENV_PREFIX: &str = "SHOVEL_";

/// 📦 One struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    /// 🏷️ Target index. Every document of the run lands here.
    pub index: String,
    /// 📂 A directory, or a comma-separated list of files.
    pub files: String,
    pub backend: BackendConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎛️ How the shovel digs. Nobody needs to touch these. Somebody will anyway.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// 📦 Events per bulk request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 🔁 Resends per batch after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 🧵 Files in flight at once. 1 = one after the other, like the old days.
    #[serde(default = "default_file_parallelism")]
    pub file_parallelism: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_retries() -> u32 {
    5
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

// -- ⏰ ten minutes. if the cluster needs longer than that to calm down, so do we.
fn default_max_backoff_ms() -> u64 {
    600_000
}

fn default_file_parallelism() -> usize {
    1
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            file_parallelism: default_file_parallelism(),
        }
    }
}

impl RuntimeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff: Duration::from_millis(self.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl AppConfig {
    /// 🏗️ The minimum viable shovel: where from, where to, which index. Defaults for the rest.
    pub fn new(
        backend: BackendConfig,
        index: impl Into<String>,
        files: impl Into<String>,
    ) -> Self {
        Self {
            index: index.into(),
            files: files.into(),
            backend,
            runtime: RuntimeConfig::default(),
        }
    }

    /// ⚖️ Reject configs that would fail later in a more confusing way.
    pub fn validate(&self) -> Result<(), ShovelError> {
        if self.backend.host.trim().is_empty() {
            return Err(ShovelError::config("backend host is required (`--host`)"));
        }
        if self.index.trim().is_empty() {
            return Err(ShovelError::config("target index is required (`--index`)"));
        }
        if self.files.trim().is_empty() {
            return Err(ShovelError::config("no input given (`--files`)"));
        }
        if self.runtime.batch_size == 0 {
            return Err(ShovelError::config("runtime.batch_size must be at least 1"));
        }
        if self.runtime.file_parallelism == 0 {
            return Err(ShovelError::config("runtime.file_parallelism must be at least 1"));
        }
        Ok(())
    }
}

/// 🎛️ What the command line wants to overrule. `None` = "no opinion, ask the next layer".
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<String>,
    pub backend: BackendOverrides,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct BackendOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// 🚀 Layer env, file and flags into an `AppConfig`, then validate it.
///
/// 📐 No file given means env + flags only. We do not go looking for a `shovel.toml` uninvited.
pub fn load_config(
    config_file: Option<&Path>,
    overrides: ConfigOverrides,
) -> Result<AppConfig, ShovelError> {
    match config_file {
        Some(path) => info!("🔧 loading configuration from {} + {ENV_PREFIX}* + flags", path.display()),
        None => info!("🔧 loading configuration from {ENV_PREFIX}* + flags"),
    }

    let mut figment = Figment::new().merge(Env::prefixed(ENV_PREFIX).split("__"));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Serialized::defaults(overrides));

    let config: AppConfig = figment
        .extract()
        .map_err(|err| ShovelError::config(err.to_string()))?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn toml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    fn flags(host: &str, index: &str, files: &str) -> ConfigOverrides {
        ConfigOverrides {
            index: Some(index.into()),
            files: Some(files.into()),
            backend: BackendOverrides {
                host: Some(host.into()),
                ..Default::default()
            },
        }
    }

    #[test]
    fn the_one_where_flags_alone_are_enough() {
        let config = load_config(None, flags("localhost", "logs", "/data")).unwrap();
        assert_eq!(config.backend.host, "localhost");
        assert_eq!(config.backend.port, 443, "no --port means the managed cluster");
        assert_eq!(config.index, "logs");
        assert_eq!(config.runtime, RuntimeConfig::default());
        assert_eq!(config.runtime.batch_size, 200);
    }

    #[test]
    fn the_one_where_the_file_fills_in_and_the_flags_win() {
        let file = toml_file(
            r#"
            index = "from-file"
            files = "/from/file"

            [backend]
            host = "file-host"
            port = 9200
            username = "admin"

            [runtime]
            batch_size = 50
            file_parallelism = 4
            "#,
        );
        let overrides = ConfigOverrides {
            index: Some("from-flags".into()),
            ..Default::default()
        };

        let config = load_config(Some(file.path()), overrides).unwrap();
        assert_eq!(config.index, "from-flags");
        assert_eq!(config.files, "/from/file");
        assert_eq!(config.backend.host, "file-host");
        assert_eq!(config.backend.port, 9200);
        assert_eq!(config.backend.username.as_deref(), Some("admin"));
        assert_eq!(config.runtime.batch_size, 50);
        assert_eq!(config.runtime.file_parallelism, 4);
        assert_eq!(config.runtime.max_retries, 5, "unset knobs keep their defaults");
    }

    #[test]
    fn the_one_where_a_missing_host_is_a_config_error_not_a_crash() {
        let overrides = ConfigOverrides {
            index: Some("logs".into()),
            files: Some("/data".into()),
            ..Default::default()
        };
        let err = load_config(None, overrides).unwrap_err();
        assert!(err.is_config(), "{err}");
    }

    #[test]
    fn the_one_where_blank_values_do_not_sneak_past_validation() {
        let err = load_config(None, flags("localhost", "  ", "/data")).unwrap_err();
        assert!(err.is_config());

        let mut config = AppConfig::new(BackendConfig::new("h", 9200), "logs", "a.gz");
        assert!(config.validate().is_ok());
        config.runtime.batch_size = 0;
        assert!(config.validate().unwrap_err().is_config());
        config.runtime.batch_size = 1;
        config.runtime.file_parallelism = 0;
        assert!(config.validate().unwrap_err().is_config());
    }

    #[test]
    fn the_one_where_runtime_knobs_become_a_retry_policy() {
        let policy = RuntimeConfig {
            max_retries: 2,
            initial_backoff_ms: 10,
            max_backoff_ms: 40,
            ..Default::default()
        }
        .retry_policy();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.initial_backoff, Duration::from_millis(10));
        assert_eq!(policy.backoff(10), Duration::from_millis(40));
        assert_eq!(RuntimeConfig::default().retry_policy(), RetryPolicy::default());
    }
}
