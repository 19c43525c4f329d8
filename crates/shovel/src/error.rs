//! 💀 Errors: the many ways a shovel can hit a rock.
//!
//! 🧠 Knowledge graph:
//! - `ShovelError`: everything the pipeline can raise. Some variants are per-file
//!   (the supervisor catches them, counts one failed file, and keeps digging).
//!   Some are run-level (config, directory listing) and end the run before it starts.
//! - `BackendError` lives in `backends` because it speaks HTTP, not files.
//! - Malformed events are NOT here. They are values, not errors. They get counted,
//!   not raised. See `enrich::MalformedEvent`. 🦆

use std::path::PathBuf;

use thiserror::Error;

use crate::backends::BackendError;

/// 💀 Everything that can go sideways while shoveling.
#[derive(Error, Debug)]
pub enum ShovelError {
    /// 🔧 A required parameter is missing or nonsense. Raised before any file is touched.
    #[error("💀 Configuration error: {0}")]
    Config(String),

    /// 📂 The directory exists but refused to tell us what is inside it.
    #[error("💀 Could not list files in '{path}'")]
    Walk {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 📂 The file is missing, unreadable, or otherwise playing hard to get.
    #[error("💀 Could not read '{path}'")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 🗜️ Magic bytes matched neither gzip nor zstd.
    #[error("💀 Unsupported compression format (first bytes: {prefix})")]
    UnsupportedFormat { prefix: String },

    /// 🗜️ The magic bytes promised a format; the rest of the file broke that promise.
    #[error("💀 Decompression failed mid-stream")]
    Decompression {
        #[source]
        source: std::io::Error,
    },

    /// 📡 The backend said something we cannot retry our way out of.
    #[error("💀 Bulk submission failed")]
    Submission {
        #[source]
        source: BackendError,
    },

    /// 📊 The run finished, but not every file made it.
    #[error("💀 {failed} of {total} file(s) failed to be indexed")]
    FailedFiles { failed: usize, total: usize },
}

impl ShovelError {
    /// 🔧 Shorthand for config errors, because `ShovelError::Config(format!(..))` gets old.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// ⚖️ Was this the user's fault before we touched a single file?
    /// The CLI uses this to pick an exit code that is not "some files failed".
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// 🔧 What a human should try next, when we have a decent guess.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Submission { source } => match source {
                BackendError::Transport(_) => Some(
                    "the cluster isn't reachable. Double-check --host and --port. \
                     If it runs in Docker, `docker ps` will tell you whether it is up. ☕",
                ),
                BackendError::Signing(_) => Some(
                    "port 443 means SigV4 signing. Make sure AWS credentials are in reach \
                     (AWS_PROFILE, AWS_ACCESS_KEY_ID, SSO login) and that the session has not expired.",
                ),
                BackendError::Rejected { status: 401 | 403, .. } => Some(
                    "the cluster knows who you are and said no anyway. Check the domain access policy \
                     or the role mapping for the identity you are signing as.",
                ),
                _ => None,
            },
            Self::UnsupportedFormat { .. } => {
                Some("only gzip and zstd files are read. Plain .json or .log files need compressing first.")
            }
            Self::FailedFiles { .. } => {
                Some("each failed file was logged with its reason above. RUST_LOG=shovel=debug shows every batch.")
            }
            _ => None,
        }
    }
}
