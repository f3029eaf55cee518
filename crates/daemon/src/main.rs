// notetallyd: scheduled todo aggregation daemon.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use notetally_common::types::ProviderKind;
use notetally_daemon::config::AppConfig;
use notetally_daemon::logging::{self, LogFormat};
use tracing::Instrument;

#[derive(Debug, Parser)]
#[command(name = "notetallyd", version, about = "Collects prioritized todos into one note")]
struct Args {
    /// Path to the YAML or TOML config file.
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Notes backend: s3 | web_clipper.
    #[arg(long, default_value = "s3")]
    provider: ProviderKind,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load_from(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;

    logging::init(args.log_format, config.is_debug);

    notetally_daemon::runtime::run(config, args.provider)
        .instrument(logging::service_span())
        .await
        .context("notetally daemon terminated unexpectedly")
}
