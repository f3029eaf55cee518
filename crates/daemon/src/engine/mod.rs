// Todo aggregation cycle.
//
// One cycle: wait for foreign locks to clear, take the lock, scan every
// note, collect marked checklist lines from the children of the configured
// folder, order them by priority and rewrite the target note when the
// merged block changed. The lock is released on every path.
//
// Each provider call is bounded by the per-call timeout and the remaining
// cycle budget, and aborts as soon as shutdown is signalled. The two lock
// waits poll for longer than one call: they get their own budget, clamped
// to the remaining cycle time, and the lock bounds each of its storage
// calls itself. The release runs under its own timeout and ignores
// shutdown.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use notetally_common::note::{Note, NoteError};
use notetally_common::todo::{extract_entries, generated_trailer, merge_entries, render_entries};
use notetally_common::types::{note_file_name, NOTE_SUFFIX};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::hash::{content_changed, ContentHash};
use crate::lock::{deadline_after, LockError};
use crate::provider::{NoteProvider, ProviderError};

// ── Configuration & state ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Lock holder id of this instance.
    pub holder: String,
    /// Id of the target note (`<note_id>.md`).
    pub note_id: String,
    pub parent_id: String,
    /// Budget for foreign locks to clear before acquiring.
    pub release_wait: Duration,
    pub lock_timeout: Duration,
    pub call_timeout: Duration,
    pub cycle_timeout: Duration,
    pub release_timeout: Duration,
}

/// State carried across cycles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationState {
    /// Hash of the last merged block that was written successfully.
    pub last_hash: Option<ContentHash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The target note was rewritten.
    Written { entries: usize, hash: ContentHash },
    /// The merged block matched the last write; nothing was written.
    Unchanged { entries: usize },
}

impl CycleOutcome {
    pub fn entries(&self) -> usize {
        match self {
            Self::Written { entries, .. } | Self::Unchanged { entries } => *entries,
        }
    }

    pub fn was_written(&self) -> bool {
        matches!(self, Self::Written { .. })
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("lock busy: {0}")]
    LockTimeout(#[source] LockError),

    #[error("note `{name}` not found")]
    NotFound { name: String },

    #[error("target note `{name}` is missing metadata field `{field}`")]
    MissingMetadataField { name: String, field: &'static str },

    #[error("unreadable note: {0}")]
    InvalidNote(#[source] NoteError),

    #[error("failed to write note `{name}`: {message}")]
    Write { name: String, message: String },

    #[error("{operation} failed: {message}")]
    Transport { operation: &'static str, message: String },

    #[error("target note `{name}` is not among the listed notes")]
    TargetMissing { name: String },

    #[error("{operation} exceeded its deadline")]
    DeadlineExceeded { operation: &'static str },

    #[error("cycle cancelled by shutdown")]
    Cancelled,
}

impl CycleError {
    /// A note does not follow the payload convention.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::MissingMetadataField { .. } | Self::InvalidNote(_))
    }

    /// The next scheduled cycle may well succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::LockTimeout(_)
                | Self::Write { .. }
                | Self::Transport { .. }
                | Self::DeadlineExceeded { .. }
        )
    }
}

impl From<ProviderError> for CycleError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotFound { name } => Self::NotFound { name },
            ProviderError::Write { name, message } => Self::Write { name, message },
            ProviderError::Transport { operation, message } => Self::Transport { operation, message },
            ProviderError::Lock(err @ LockError::Timeout { .. }) => Self::LockTimeout(err),
            ProviderError::Lock(err) => Self::Transport { operation: "lock", message: err.to_string() },
            ProviderError::Note(err) => Self::InvalidNote(err),
        }
    }
}

// ── Call guard ──────────────────────────────────────────────────────

/// Bounds provider calls by `min(call_timeout, time left in the cycle)`
/// and races them against the shutdown signal.
struct CallGuard<'a> {
    cancel: &'a watch::Receiver<bool>,
    deadline: Instant,
    call_timeout: Duration,
}

impl CallGuard<'_> {
    async fn run<T, F>(&self, operation: &'static str, call: F) -> Result<T, CycleError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        let budget = self.call_timeout.min(self.remaining());
        self.until_shutdown(async {
            match tokio::time::timeout(budget, call).await {
                Ok(result) => result.map_err(CycleError::from),
                Err(_) => Err(CycleError::DeadlineExceeded { operation }),
            }
        })
        .await
    }

    /// Lock budget clamped to the time left in the cycle.
    fn lock_budget(&self, budget: Duration) -> Duration {
        budget.min(self.remaining())
    }

    /// Race a lock wait against shutdown only. The wait enforces its own
    /// budget (see `lock_budget`) and per-call timeouts.
    async fn run_lock<T, F>(&self, call: F) -> Result<T, CycleError>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.until_shutdown(async { call.await.map_err(CycleError::from) }).await
    }

    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    async fn until_shutdown<T>(
        &self,
        work: impl Future<Output = Result<T, CycleError>>,
    ) -> Result<T, CycleError> {
        if *self.cancel.borrow() {
            return Err(CycleError::Cancelled);
        }

        let mut cancel = self.cancel.clone();
        tokio::select! {
            result = work => result,
            Ok(_) = cancel.wait_for(|stop| *stop) => Err(CycleError::Cancelled),
        }
    }
}

// ── Engine ──────────────────────────────────────────────────────────

pub struct TodoEngine<P: NoteProvider> {
    provider: P,
    config: EngineConfig,
    state: AggregationState,
}

impl<P: NoteProvider> TodoEngine<P> {
    pub fn new(provider: P, config: EngineConfig) -> Self {
        Self { provider, config, state: AggregationState::default() }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> &AggregationState {
        &self.state
    }

    /// Run one full cycle. The lock is released whatever the outcome.
    pub async fn run_cycle(
        &mut self,
        cancel: &watch::Receiver<bool>,
    ) -> Result<CycleOutcome, CycleError> {
        let guard = CallGuard {
            cancel,
            deadline: deadline_after(Instant::now(), self.config.cycle_timeout),
            call_timeout: self.config.call_timeout,
        };

        let result = self.locked_cycle(&guard).await;
        self.release().await;
        result
    }

    async fn locked_cycle(&mut self, guard: &CallGuard<'_>) -> Result<CycleOutcome, CycleError> {
        let holder = self.config.holder.as_str();

        let release_wait = guard.lock_budget(self.config.release_wait);
        guard.run_lock(self.provider.await_lock_release(release_wait)).await?;
        let lock_timeout = guard.lock_budget(self.config.lock_timeout);
        let grant = guard.run_lock(self.provider.acquire_lock(holder, lock_timeout)).await?;
        debug!(holder, attempts = grant.attempts, elapsed = ?grant.elapsed, "lock held");

        let (mut target, candidates) = self.scan(guard).await?;

        let target_id = target.note_id().to_string();
        let mut entries = Vec::new();
        for note in candidates.iter().filter(|note| note.note_id() != target_id) {
            entries.extend(extract_entries(&note.header, &note.body));
        }
        let merged = merge_entries(entries);
        let block = render_entries(&merged);
        debug!(candidates = candidates.len(), entries = merged.len(), "todo entries merged");

        let Some(hash) = content_changed(self.state.last_hash.as_deref(), block.as_bytes()) else {
            debug!("merged todo block unchanged, skipping write");
            return Ok(CycleOutcome::Unchanged { entries: merged.len() });
        };

        let body = format!("{block}{}", generated_trailer(Utc::now()));
        target.set_body(body).map_err(|err| match err {
            NoteError::MissingMetadataField(field) => {
                CycleError::MissingMetadataField { name: target.name.clone(), field }
            }
            other => CycleError::InvalidNote(other),
        })?;

        guard.run("writing target note", self.provider.put(&target)).await?;
        self.state.last_hash = Some(hash.clone());
        info!(note = %target.name, entries = merged.len(), "target note updated");

        Ok(CycleOutcome::Written { entries: merged.len(), hash })
    }

    /// Fetch every `.md` note; return the target and the children of the
    /// configured folder.
    async fn scan(&self, guard: &CallGuard<'_>) -> Result<(Note, Vec<Note>), CycleError> {
        let names = guard.run("listing notes", self.provider.list_names()).await?;
        let target_name = note_file_name(&self.config.note_id);

        let mut target = None;
        let mut candidates = Vec::new();
        for name in names.iter().filter(|name| name.ends_with(NOTE_SUFFIX)) {
            let note = guard.run("fetching note", self.provider.get(name)).await?;
            if *name == target_name {
                target = Some(note);
            } else if note.is_child_of(&self.config.parent_id) {
                candidates.push(note);
            }
        }

        let target = target.ok_or(CycleError::TargetMissing { name: target_name })?;
        Ok((target, candidates))
    }

    async fn release(&self) {
        let holder = self.config.holder.as_str();
        let release = self.provider.release_lock(holder);
        match tokio::time::timeout(self.config.release_timeout, release).await {
            Ok(Ok(())) => debug!(holder, "lock released"),
            Ok(Err(err)) => warn!(holder, error = %err, "failed to release lock"),
            Err(_) => {
                warn!(holder, timeout = ?self.config.release_timeout, "lock release timed out")
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
