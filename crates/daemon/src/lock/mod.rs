// Exclusive lock over a list/put/delete object store.
//
// The store offers no compare-and-swap, so ownership is established by
// writing a marker and re-listing until ours is the only one present.
// Markers live under `locks/` and use the sync target's exclusive-lock
// record format, so other sync clients honour them too.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::store::{list_all, ObjectStore, StoreError};

pub const LOCK_PREFIX: &str = "locks/";
const MARKER_SUFFIX: &str = ".json";
const EXCLUSIVE_LOCK_TYPE: u8 = 2;
const DAEMON_CLIENT_TYPE: u8 = 1;
/// Stand-in for "no deadline" when a budget does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

// ── Marker records ──────────────────────────────────────────────────

/// Body of a lock marker object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    #[serde(rename = "type")]
    pub lock_type: u8,
    #[serde(rename = "clientType")]
    pub client_type: u8,
    #[serde(rename = "clientId")]
    pub client_id: String,
}

impl LockMarker {
    pub fn exclusive(holder: &str) -> Self {
        Self {
            lock_type: EXCLUSIVE_LOCK_TYPE,
            client_type: DAEMON_CLIENT_TYPE,
            client_id: holder.to_string(),
        }
    }
}

/// Object key of `holder`'s exclusive marker: `locks/2_1_<holder>.json`.
pub fn marker_key(holder: &str) -> String {
    format!("{LOCK_PREFIX}{EXCLUSIVE_LOCK_TYPE}_{DAEMON_CLIENT_TYPE}_{holder}{MARKER_SUFFIX}")
}

/// Holder id encoded in a marker key, if the key follows the
/// `<type>_<clientType>_<holder>.json` layout.
pub fn holder_from_key(key: &str) -> Option<&str> {
    let stem = key.strip_prefix(LOCK_PREFIX)?.strip_suffix(MARKER_SUFFIX)?;
    let mut parts = stem.splitn(3, '_');
    let (_, _, holder) = (parts.next()?, parts.next()?, parts.next()?);
    (!holder.is_empty()).then_some(holder)
}

fn holders_of(keys: &[String]) -> Vec<String> {
    keys.iter().map(|key| holder_from_key(key).unwrap_or(key.as_str()).to_string()).collect()
}

// ── State machine ───────────────────────────────────────────────────

/// Where an acquire attempt stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockPhase {
    /// No marker of ours is believed to be in the store.
    Probing,
    /// Our marker was written; waiting for a listing that confirms it.
    MarkerWritten,
    Acquired,
}

/// What one listing of the lock namespace says about `holder`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockObservation {
    Vacant,
    /// Exactly one marker is present and it is ours.
    HeldBySelf,
    Contended { holders: Vec<String> },
}

/// Classify a listing of marker keys from `holder`'s point of view.
pub fn observe(holder: &str, marker_keys: &[String]) -> LockObservation {
    match marker_keys {
        [] => LockObservation::Vacant,
        [only] if holder_from_key(only) == Some(holder) => LockObservation::HeldBySelf,
        keys => LockObservation::Contended { holders: holders_of(keys) },
    }
}

/// `start + budget`, saturating to a far-future instant on overflow.
pub fn deadline_after(start: Instant, budget: Duration) -> Instant {
    start
        .checked_add(budget)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}

fn advance(phase: &mut LockPhase, next: LockPhase, holder: &str) {
    if *phase != next {
        trace!(holder, from = ?*phase, to = ?next, "lock phase");
        *phase = next;
    }
}

// ── Configuration ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockConfig {
    /// Delay between listings while probing or confirming.
    pub poll_interval: Duration,
    /// Base delay after observing contention.
    pub backoff_interval: Duration,
    /// Upper bound of the random delay added to `backoff_interval`.
    pub backoff_jitter: Duration,
    /// Delay between listings while waiting for the namespace to clear.
    pub release_poll: Duration,
    /// Upper bound of each list, put or delete issued by the lock.
    pub call_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(250),
            backoff_interval: Duration::from_secs(1),
            backoff_jitter: Duration::from_millis(500),
            release_poll: Duration::from_secs(1),
            call_timeout: Duration::from_secs(60),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("lock not obtained after {waited:?} (held by: {})", .holders.join(", "))]
    Timeout { waited: Duration, holders: Vec<String>, marker_written: bool },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode lock marker: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Proof of a successful acquire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockGrant {
    pub holder: String,
    /// Number of listings it took.
    pub attempts: u32,
    pub elapsed: Duration,
}

// ── Lock ────────────────────────────────────────────────────────────

pub struct ListLock<S: ObjectStore> {
    store: S,
    config: LockConfig,
}

impl<S: ObjectStore> ListLock<S> {
    pub fn new(store: S, config: LockConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Poll until `holder` owns the lock or `timeout` elapses.
    ///
    /// On timeout a marker written by this call may still be in the store;
    /// callers run `release` regardless of the outcome.
    pub async fn acquire(&self, holder: &str, timeout: Duration) -> Result<LockGrant, LockError> {
        let started = Instant::now();
        let deadline = deadline_after(started, timeout);
        let mut phase = LockPhase::Probing;
        let mut attempts = 0u32;
        let mut foreign_holders = Vec::new();

        loop {
            attempts += 1;
            let markers = self.list_markers().await?;

            let wait = match observe(holder, &markers) {
                LockObservation::HeldBySelf => {
                    let elapsed = started.elapsed();
                    advance(&mut phase, LockPhase::Acquired, holder);
                    debug!(holder, attempts, ?elapsed, "lock acquired");
                    return Ok(LockGrant { holder: holder.to_string(), attempts, elapsed });
                }
                LockObservation::Vacant => {
                    self.write_marker(holder).await?;
                    advance(&mut phase, LockPhase::MarkerWritten, holder);
                    self.config.poll_interval
                }
                LockObservation::Contended { holders } => {
                    if holders.iter().any(|h| h == holder) {
                        self.delete_marker(holder).await?;
                        advance(&mut phase, LockPhase::Probing, holder);
                        debug!(holder, ?holders, "lock contended, marker withdrawn");
                    }
                    foreign_holders = holders.into_iter().filter(|h| h != holder).collect();
                    self.config.backoff_interval + self.jitter()
                }
            };

            let now = Instant::now();
            if now >= deadline {
                let waited = now - started;
                info!(holder, ?waited, holders = ?foreign_holders, "lock acquire timed out");
                return Err(LockError::Timeout {
                    waited,
                    holders: foreign_holders,
                    marker_written: phase == LockPhase::MarkerWritten,
                });
            }
            tokio::time::sleep(wait.min(deadline - now)).await;
        }
    }

    /// Delete `holder`'s marker. Succeeds when no marker exists.
    pub async fn release(&self, holder: &str) -> Result<(), LockError> {
        self.delete_marker(holder).await?;
        debug!(holder, "lock released");
        Ok(())
    }

    /// Poll until no marker at all is present, for at most `budget`.
    pub async fn wait_for_release(&self, budget: Duration) -> Result<(), LockError> {
        let started = Instant::now();
        loop {
            let markers = self.list_markers().await?;
            if markers.is_empty() {
                return Ok(());
            }

            let waited = started.elapsed();
            if waited >= budget {
                return Err(LockError::Timeout {
                    waited,
                    holders: holders_of(&markers),
                    marker_written: false,
                });
            }
            debug!(markers = markers.len(), "waiting for foreign locks to clear");
            tokio::time::sleep(self.config.release_poll.min(budget - waited)).await;
        }
    }

    /// Holders of every marker currently listed.
    pub async fn holders(&self) -> Result<Vec<String>, LockError> {
        let markers = self.list_markers().await?;
        Ok(holders_of(&markers))
    }

    async fn list_markers(&self) -> Result<Vec<String>, LockError> {
        self.bounded("list", list_all(&self.store, Some(LOCK_PREFIX))).await
    }

    async fn write_marker(&self, holder: &str) -> Result<(), LockError> {
        let body = serde_json::to_vec(&LockMarker::exclusive(holder))?;
        self.bounded("put", self.store.put(&marker_key(holder), body)).await
    }

    async fn delete_marker(&self, holder: &str) -> Result<(), LockError> {
        self.bounded("delete", self.store.delete(&marker_key(holder))).await
    }

    /// Run one store call under `call_timeout`.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, LockError> {
        match tokio::time::timeout(self.config.call_timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(StoreError::Transport {
                operation,
                message: format!("timed out after {:?}", self.config.call_timeout),
            }
            .into()),
        }
    }

    fn jitter(&self) -> Duration {
        let max = self.config.backoff_jitter.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

// ── Tests ───────────────────────────────────────────────────────────
