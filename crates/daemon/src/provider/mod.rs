// Note storage providers.
//
// The engine only talks to `NoteProvider`. Two backends implement it: the
// S3 sync target (real locking through `ListLock`) and the notes web
// clipper HTTP API (locking is a no-op, the service serializes writes).

pub mod object_store;
pub mod web_clipper;

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use notetally_common::note::{Note, NoteError};
use notetally_common::types::ProviderKind;

use crate::config::AppConfig;
use crate::lock::{LockError, LockGrant};
use crate::store::{S3ObjectStore, StoreError};

pub use object_store::ObjectStoreProvider;
pub use web_clipper::{WebClipperClient, WebClipperProvider};

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("note `{name}` not found")]
    NotFound { name: String },

    #[error("failed to write note `{name}`: {message}")]
    Write { name: String, message: String },

    #[error("{operation} failed: {message}")]
    Transport { operation: &'static str, message: String },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Note(#[from] NoteError),
}

impl ProviderError {
    pub(crate) fn from_store(name: &str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => Self::NotFound { name: name.to_string() },
            StoreError::Transport { operation, message } => Self::Transport { operation, message },
        }
    }
}

// ── Provider contract ───────────────────────────────────────────────

/// Capability contract of a notes backend.
///
/// All methods return `Send` futures so the engine can run on a
/// multi-threaded tokio runtime.
pub trait NoteProvider: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    /// Every note name in the namespace. Pagination is internal.
    fn list_names(&self) -> impl Future<Output = Result<Vec<String>, ProviderError>> + Send;

    fn get(&self, name: &str) -> impl Future<Output = Result<Note, ProviderError>> + Send;

    /// Write `note` back. Safe to retry.
    fn put(&self, note: &Note) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Wait until no lock marker at all is present, for at most `budget`.
    fn await_lock_release(
        &self,
        budget: Duration,
    ) -> impl Future<Output = Result<(), ProviderError>> + Send;

    fn acquire_lock(
        &self,
        holder: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<LockGrant, ProviderError>> + Send;

    fn release_lock(&self, holder: &str) -> impl Future<Output = Result<(), ProviderError>> + Send;

    /// Holders of the lock markers currently present.
    fn lock_holders(&self) -> impl Future<Output = Result<Vec<String>, ProviderError>> + Send;
}

// ── Configured backend ──────────────────────────────────────────────

/// The backend selected on the command line.
pub enum Backend {
    ObjectStore(ObjectStoreProvider<S3ObjectStore>),
    WebClipper(WebClipperProvider),
}

impl Backend {
    pub async fn connect(kind: ProviderKind, config: &AppConfig) -> Result<Self> {
        match kind {
            ProviderKind::ObjectStore => {
                let store = S3ObjectStore::connect(&config.s3.settings()).await;
                Ok(Self::ObjectStore(ObjectStoreProvider::new(store, config.lock_config())))
            }
            ProviderKind::WebClipper => {
                let client = WebClipperClient::new(
                    &config.web_clipper.host,
                    &config.web_clipper.token,
                    config.timeouts.call(),
                )
                .context("failed to build web clipper client")?;
                Ok(Self::WebClipper(WebClipperProvider::new(client)))
            }
        }
    }
}

impl NoteProvider for Backend {
    fn kind(&self) -> ProviderKind {
        match self {
            Self::ObjectStore(p) => p.kind(),
            Self::WebClipper(p) => p.kind(),
        }
    }

    async fn list_names(&self) -> Result<Vec<String>, ProviderError> {
        match self {
            Self::ObjectStore(p) => p.list_names().await,
            Self::WebClipper(p) => p.list_names().await,
        }
    }

    async fn get(&self, name: &str) -> Result<Note, ProviderError> {
        match self {
            Self::ObjectStore(p) => p.get(name).await,
            Self::WebClipper(p) => p.get(name).await,
        }
    }

    async fn put(&self, note: &Note) -> Result<(), ProviderError> {
        match self {
            Self::ObjectStore(p) => p.put(note).await,
            Self::WebClipper(p) => p.put(note).await,
        }
    }

    async fn await_lock_release(&self, budget: Duration) -> Result<(), ProviderError> {
        match self {
            Self::ObjectStore(p) => p.await_lock_release(budget).await,
            Self::WebClipper(p) => p.await_lock_release(budget).await,
        }
    }

    async fn acquire_lock(&self, holder: &str, timeout: Duration) -> Result<LockGrant, ProviderError> {
        match self {
            Self::ObjectStore(p) => p.acquire_lock(holder, timeout).await,
            Self::WebClipper(p) => p.acquire_lock(holder, timeout).await,
        }
    }

    async fn release_lock(&self, holder: &str) -> Result<(), ProviderError> {
        match self {
            Self::ObjectStore(p) => p.release_lock(holder).await,
            Self::WebClipper(p) => p.release_lock(holder).await,
        }
    }

    async fn lock_holders(&self) -> Result<Vec<String>, ProviderError> {
        match self {
            Self::ObjectStore(p) => p.lock_holders().await,
            Self::WebClipper(p) => p.lock_holders().await,
        }
    }
}
