//! In-process registry of deferred release publishes.
//!
//! Jobs are plain tokio tasks that sleep until the release's `scheduled_at`
//! and then publish it on the blocking pool. Nothing here is persisted: the
//! registry is rebuilt from the database with [`Scheduler::sync_from_database`]
//! at startup and emptied with [`Scheduler::shutdown`] at teardown. Two
//! processes serving the same database will both fire.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::db::{ReleaseDb, ReleaseQuery};
use crate::error::{CadenceError, Result};
use crate::types::ReleaseId;

/// What a fired job calls.
pub trait Publisher: Send + Sync {
    fn publish_release(&self, release_id: ReleaseId) -> Result<()>;
}

struct ScheduledJob {
    run_at: DateTime<Utc>,
    token: u64,
    handle: AbortHandle,
}

type Jobs = Arc<Mutex<HashMap<ReleaseId, ScheduledJob>>>;

pub struct Scheduler {
    db: Arc<ReleaseDb>,
    jobs: Jobs,
    next_token: AtomicU64,
    runtime: Option<Handle>,
    publisher: Weak<dyn Publisher>,
}

fn lock(jobs: &Jobs) -> MutexGuard<'_, HashMap<ReleaseId, ScheduledJob>> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Scheduler {
    /// Jobs are spawned on the runtime current at construction. Without one
    /// the scheduler is detached: `set` still validates but registers nothing,
    /// and the release is picked up by the next `sync_from_database`.
    pub fn new(db: Arc<ReleaseDb>, publisher: Weak<dyn Publisher>) -> Self {
        Self {
            db,
            jobs: Arc::new(Mutex::new(HashMap::new())),
            next_token: AtomicU64::new(1),
            runtime: Handle::try_current().ok(),
            publisher,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.runtime.is_some()
    }

    /// Register (or replace) the job publishing `release_id` at `run_at`.
    ///
    /// Fails with `NotFound` when the release is missing or already released.
    pub fn set(&self, release_id: ReleaseId, run_at: DateTime<Utc>) -> Result<()> {
        let release = self.db.read(|tx| tx.release(release_id))?;
        if !release.is_some_and(|r| r.is_pending()) {
            return Err(CadenceError::release_not_found(release_id));
        }
        let Some(runtime) = &self.runtime else {
            tracing::debug!(release_id, %run_at, "scheduler detached; job not registered");
            return Ok(());
        };

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let delay = (run_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        let jobs = Arc::clone(&self.jobs);
        let publisher = self.publisher.clone();

        let mut registry = lock(&self.jobs);
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;

            // Unregister before publishing: a firing job can no longer be cancelled.
            {
                let mut registry = lock(&jobs);
                if registry.get(&release_id).map(|j| j.token) != Some(token) {
                    return;
                }
                registry.remove(&release_id);
            }

            let Some(publisher) = publisher.upgrade() else {
                return;
            };
            tracing::info!(release_id, "scheduled publish firing");
            match tokio::task::spawn_blocking(move || publisher.publish_release(release_id)).await {
                Ok(Ok(())) => tracing::info!(release_id, "scheduled publish succeeded"),
                // The release status already records the failure
                Ok(Err(e)) => tracing::warn!(release_id, error = %e, "scheduled publish failed"),
                Err(e) => tracing::error!(release_id, error = %e, "scheduled publish panicked"),
            }
        });

        let job = ScheduledJob {
            run_at,
            token,
            handle: task.abort_handle(),
        };
        if let Some(old) = registry.insert(release_id, job) {
            old.handle.abort();
            tracing::debug!(release_id, previous = %old.run_at, "replaced scheduled job");
        }
        tracing::info!(release_id, %run_at, "release scheduled");
        Ok(())
    }

    /// Cancel the job for `release_id`. Returns whether one was registered.
    pub fn cancel(&self, release_id: ReleaseId) -> bool {
        match lock(&self.jobs).remove(&release_id) {
            Some(job) => {
                job.handle.abort();
                tracing::info!(release_id, "scheduled publish cancelled");
                true
            }
            None => false,
        }
    }

    /// Registered jobs: release id to fire time.
    pub fn jobs(&self) -> BTreeMap<ReleaseId, DateTime<Utc>> {
        lock(&self.jobs)
            .iter()
            .map(|(id, job)| (*id, job.run_at))
            .collect()
    }

    /// Register every pending release scheduled at or after now. Returns how
    /// many jobs were registered.
    pub fn sync_from_database(&self) -> Result<usize> {
        let now = Utc::now();
        let due: Vec<_> = self.db.read(|tx| {
            Ok(tx
                .pending_releases()?
                .into_iter()
                .filter_map(|r| r.scheduled_at.filter(|at| *at >= now).map(|at| (r.id, at)))
                .collect())
        })?;
        if !self.is_attached() {
            return Ok(0);
        }
        for (id, at) in &due {
            self.set(*id, *at)?;
        }
        tracing::info!(count = due.len(), "scheduler synced from database");
        Ok(due.len())
    }

    /// Cancel every outstanding job. Returns how many were cancelled.
    pub fn shutdown(&self) -> usize {
        let drained: Vec<_> = lock(&self.jobs).drain().collect();
        for (_, job) in &drained {
            job.handle.abort();
        }
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "scheduler shut down");
        }
        drained.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
