//! Event dispatch with admission control.
//!
//! Validation happens before anything else, so a rejected event causes no
//! filesystem or network activity. Accepted events wait for the lock of
//! their repository, then for a global run slot, then run the pipeline.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tracing::debug;

use crate::domain::{InboundEvent, Result};
use crate::obs::emit_event_rejected;
use crate::pipeline::{Pipeline, RunReport};

/// Default number of pipeline runs allowed at once.
pub const DEFAULT_MAX_CONCURRENT_RUNS: usize = 4;

/// Entry point for inbound events.
pub struct Dispatcher {
    pipeline: Arc<Pipeline>,
    slots: Arc<Semaphore>,
    repo_locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<Pipeline>, max_concurrent_runs: usize) -> Self {
        Dispatcher {
            pipeline,
            slots: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Validate `event` and run the pipeline for it.
    ///
    /// Runs for the same repository are serialized; the first error of any
    /// stage is returned unmodified.
    pub async fn dispatch(&self, event: &InboundEvent) -> Result<RunReport> {
        let trigger = event.validate().inspect_err(|e| emit_event_rejected(e))?;

        let lease = self.lease(trigger.slug());
        let _repo_guard = lease.lock.lock().await;
        // The semaphore is never closed, so acquiring only waits.
        let _slot = self.slots.acquire().await.ok();
        debug!(repository = %lease.slug, "run admitted");

        self.pipeline.run(&trigger).await
    }

    fn lease(&self, slug: String) -> RepoLease<'_> {
        let lock = self
            .locked_repos()
            .entry(slug.clone())
            .or_default()
            .clone();
        RepoLease {
            dispatcher: self,
            slug,
            lock,
        }
    }

    fn locked_repos(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.repo_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Claim on the lock of one repository. The map entry is dropped together
/// with the last lease, so the map only holds repositories with runs in
/// flight.
struct RepoLease<'a> {
    dispatcher: &'a Dispatcher,
    slug: String,
    lock: Arc<AsyncMutex<()>>,
}

impl Drop for RepoLease<'_> {
    fn drop(&mut self) {
        let mut locks = self.dispatcher.locked_repos();
        let last = locks
            .get(&self.slug)
            .is_some_and(|held| Arc::ptr_eq(held, &self.lock) && Arc::strong_count(held) == 2);
        if last {
            locks.remove(&self.slug);
        }
    }
}
