//! 🚀 shovel: the front door, the bouncer, the maitre d' of the shovel crate.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Parses flags, sets up logging, layers the config, and lets the library do
//! the heavy lifting. Like a manager. 🦆
//!
//! 🚦 Exit codes: 0 everything indexed, 1 some files failed (or the run blew up),
//! 2 the config was unusable before we touched a single file.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use shovel::{BackendOverrides, ConfigOverrides, ShovelError};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// -- 🔇 the HTTP and AWS stacks are chatty. we only want to hear from them when it's bad.
const DEFAULT_LOG_FILTER: &str = "info,hyper=error,hyper_util=error,reqwest=error,aws_config=error,aws_smithy_runtime=error,aws_sigv4=error";

/// 🪏 Load gzip/zstd JSON-lines files into an OpenSearch index.
#[derive(Debug, Parser)]
#[command(name = "shovel", version, about)]
struct Args {
    /// 📡 Cluster hostname, no scheme and no port
    #[arg(long)]
    host: Option<String>,

    /// 🔌 Cluster port. 443 means AWS-managed and SigV4-signed [default: 443]
    #[arg(long)]
    port: Option<u16>,

    /// 🏷️ Target index
    #[arg(long)]
    index: Option<String>,

    /// 📂 A directory, or a comma-separated list of files
    #[arg(long)]
    files: Option<String>,

    /// 🎬 What to do with the files
    #[arg(long, value_enum, default_value_t = Action::Index)]
    action: Action,

    /// 🌎 AWS region for request signing (falls back to the AWS environment)
    #[arg(long)]
    region: Option<String>,

    /// 🔧 Optional TOML config file. Flags win over the file, the file wins over SHOVEL_* env vars.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// 📥 Index every event into the target index
    Index,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            index: self.index.clone(),
            files: self.files.clone(),
            backend: BackendOverrides {
                host: self.host.clone(),
                port: self.port,
                region: self.region.clone(),
            },
        }
    }
}

/// 🚀 main(): where it all begins. The "I pressed enter and held my breath" moment.
#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    match shovel_it(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::from(exit_status_for(&err))
        }
    }
}

async fn shovel_it(args: Args) -> anyhow::Result<()> {
    let config = shovel::load_config(args.config.as_deref(), args.overrides())
        .context("💀 couldn't assemble a usable configuration. Check the flags, the SHOVEL_* env vars, and the config file if you passed one")?;

    let summary = match args.action {
        Action::Index => shovel::run(config).await.context("💀 the run did not go cleanly")?,
    };
    info!(
        "✅ all {} file(s) indexed, {} document(s)",
        summary.files_seen, summary.documents.succeeded
    );
    Ok(())
}

/// 🧅 Peel the onion of sadness, one layer at a time, then say what to try next if we know.
fn report(err: &anyhow::Error) {
    error!("💀 error: {err}");
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {cause}");
    }
    if let Some(hint) = hint_for(err) {
        error!("🔧 hint: {hint}");
    }
}

/// 🔎 The first layer of the chain that is one of ours and has advice to give.
fn hint_for(err: &anyhow::Error) -> Option<&'static str> {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<ShovelError>())
        .find_map(ShovelError::hint)
}

/// 🚦 2 when the config was the problem, 1 for everything else.
fn exit_status_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<ShovelError>() {
        Some(shovel_error) if shovel_error.is_config() => 2,
        _ => 1,
    }
}
