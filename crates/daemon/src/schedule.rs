// Cron-driven cycle loop.
//
// Cycles run inline, one at a time. The next fire time is computed after
// each cycle from the current time, so ticks that pass while a cycle is
// running are skipped instead of queued.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::{CycleError, CycleOutcome, TodoEngine};
use crate::provider::NoteProvider;

pub struct CycleScheduler<P: NoteProvider> {
    engine: TodoEngine<P>,
    schedule: Schedule,
}

impl<P: NoteProvider> CycleScheduler<P> {
    pub fn new(engine: TodoEngine<P>, schedule: Schedule) -> Self {
        Self { engine, schedule }
    }

    pub fn engine(&self) -> &TodoEngine<P> {
        &self.engine
    }

    /// Delay from `now` until the next fire time, or `None` when the
    /// schedule has no upcoming fire time.
    pub fn next_delay(&self, now: DateTime<Utc>) -> Option<Duration> {
        let next = self.schedule.after(&now).next()?;
        Some((next - now).to_std().unwrap_or(Duration::ZERO))
    }

    /// Run cycles on schedule until `shutdown` flips. A cycle in flight
    /// when shutdown arrives aborts its remaining calls and releases its
    /// lock before this returns. Returns the engine for inspection.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> TodoEngine<P> {
        info!(schedule = %self.schedule, "scheduler started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let Some(delay) = self.next_delay(Utc::now()) else {
                warn!(schedule = %self.schedule, "schedule has no upcoming fire time");
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => {
                    debug!("scheduler shutting down");
                    break;
                }
            }

            let _ = self.run_job(&shutdown).await;
        }
        info!("scheduler stopped");
        self.engine
    }

    /// One logged cycle, tagged with a fresh job id.
    pub async fn run_job(
        &mut self,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<CycleOutcome, CycleError> {
        let job_id = Uuid::new_v4();
        let started = Instant::now();
        info!(%job_id, "cycle started");

        let result = self.engine.run_cycle(shutdown).await;
        let elapsed = started.elapsed();
        match &result {
            Ok(outcome) => info!(
                %job_id,
                ?elapsed,
                entries = outcome.entries(),
                written = outcome.was_written(),
                "cycle finished"
            ),
            Err(err) => error!(
                %job_id,
                ?elapsed,
                error = %err,
                retryable = err.is_retryable(),
                "cycle failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use chrono::TimeZone;

    use super::*;
    use crate::engine::EngineConfig;
    use crate::lock::LockConfig;
    use crate::provider::ObjectStoreProvider;
    use crate::store::MemoryObjectStore;

    const TARGET: &str = "Todo\n\n\n\nid: target\nparent_id: root\nupdated_time: 2024-01-01T00:00:00.000Z\nuser_updated_time: 2024-01-01T00:00:00.000Z";

    fn engine(store: &MemoryObjectStore) -> TodoEngine<ObjectStoreProvider<MemoryObjectStore>> {
        let config = EngineConfig {
            holder: "me".into(),
            note_id: "target".into(),
            parent_id: "inbox".into(),
            release_wait: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(5),
            call_timeout: Duration::from_secs(5),
            cycle_timeout: Duration::from_secs(30),
            release_timeout: Duration::from_secs(5),
        };
        TodoEngine::new(ObjectStoreProvider::new(store.clone(), LockConfig::default()), config)
    }

    fn scheduler(store: &MemoryObjectStore, expression: &str) -> CycleScheduler<ObjectStoreProvider<MemoryObjectStore>> {
        CycleScheduler::new(engine(store), Schedule::from_str(expression).unwrap())
    }

    #[test]
    fn next_delay_targets_the_next_minute_boundary() {
        let store = MemoryObjectStore::new();
        let scheduler = scheduler(&store, "0 * * * * *");
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 8, 30, 45).single().unwrap();
        assert_eq!(scheduler.next_delay(now), Some(Duration::from_secs(15)));
    }

    #[test]
    fn next_delay_skips_the_current_instant() {
        let store = MemoryObjectStore::new();
        let scheduler = scheduler(&store, "0 * * * * *");
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 8, 31, 0).single().unwrap();
        assert_eq!(scheduler.next_delay(now), Some(Duration::from_secs(60)));
    }

    #[test]
    fn next_delay_none_for_exhausted_schedule() {
        let store = MemoryObjectStore::new();
        let scheduler = scheduler(&store, "0 0 0 1 1 * 2020");
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).single().unwrap();
        assert_eq!(scheduler.next_delay(now), None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_executes_cycles_until_shutdown() {
        let store = MemoryObjectStore::new();
        store.insert("target.md", TARGET);
        store.insert("a.md", "A\n\n- [ ] !!urgent\n\nid: a\nparent_id: inbox");

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler(&store, "* * * * * *").run(rx));

        tokio::time::sleep(Duration::from_secs(3)).await;
        tx.send(true).unwrap();
        let engine = task.await.unwrap();

        assert!(engine.state().last_hash.is_some());
        let written = String::from_utf8(store.read("target.md").unwrap()).unwrap();
        assert!(written.contains("- [ ] **urgent** (A)\n"));
        assert!(!store.keys().iter().any(|key| key.starts_with("locks/")));
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_while_waiting_for_the_next_tick() {
        let store = MemoryObjectStore::new();
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(scheduler(&store, "0 0 0 1 1 *").run(rx));

        tokio::time::sleep(Duration::from_millis(10)).await;
        tx.send(true).unwrap();
        let engine = task.await.unwrap();
        assert!(engine.state().last_hash.is_none());
    }

    #[tokio::test]
    async fn failed_job_is_reported_and_loop_survives() {
        let store = MemoryObjectStore::new();
        let (_tx, rx) = watch::channel(false);
        let mut scheduler = scheduler(&store, "0 * * * * *");

        let err = scheduler.run_job(&rx).await.unwrap_err();
        assert!(matches!(err, CycleError::TargetMissing { .. }));
        let err = scheduler.run_job(&rx).await.unwrap_err();
        assert!(matches!(err, CycleError::TargetMissing { .. }));
    }
}
