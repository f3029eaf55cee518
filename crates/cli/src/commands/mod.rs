// CLI subcommand dispatch.

use std::future::Future;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use notetally_common::types::ProviderKind;
use notetally_daemon::config::AppConfig;
use notetally_daemon::lock::ListLock;
use notetally_daemon::store::S3ObjectStore;

pub mod check;
pub mod locks;
pub mod once;
pub mod unlock;

#[derive(Subcommand)]
pub enum Command {
    /// Run a single aggregation cycle and print the outcome
    Once(once::OnceArgs),
    /// List current lock holders on the object store
    Locks(locks::LocksArgs),
    /// Delete a stuck lock marker
    Unlock(unlock::UnlockArgs),
    /// Load and validate configuration, then probe the backend
    Check(check::CheckArgs),
}

pub fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Once(args) => once::run(args),
        Command::Locks(args) => locks::run(args),
        Command::Unlock(args) => unlock::run(args),
        Command::Check(args) => check::run(args),
    }
}

/// `--config` flag shared by every subcommand.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Path to the YAML or TOML config file.
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,
}

impl ConfigArgs {
    pub fn load(&self) -> anyhow::Result<AppConfig> {
        AppConfig::load_from(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))
    }
}

/// Drive `future` on a fresh current-thread runtime.
pub(crate) fn block_on<F: Future>(future: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    Ok(runtime.block_on(future))
}

/// Lock over the configured S3 sync target.
pub(crate) async fn object_store_lock(config: &AppConfig) -> anyhow::Result<ListLock<S3ObjectStore>> {
    config.validate_backend(ProviderKind::ObjectStore)?;
    let store = S3ObjectStore::connect(&config.s3.settings()).await;
    Ok(ListLock::new(store, config.lock_config()))
}
