//! In-memory job store and lifecycle engine.
//!
//! All job state lives in a [`parking_lot::RwLock`]'d map; reads never block
//! each other and writes are short-lived. Every mutation goes through
//! [`JobStore::update`], which enforces the state machine: queued jobs can
//! start or fail, processing jobs can complete or fail, terminal jobs never
//! change again. Illegal transitions are rejected; regressive progress is
//! dropped silently because late ffmpeg updates can race completion.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use soundpress_core::{Error, Job, JobId, JobState, Result};

/// Aggregate counts over the store, reported by the health endpoint.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct JobStats {
    pub total: usize,
    pub queued: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

/// A single state-machine transition applied via [`JobStore::update`].
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// Queued -> Processing.
    Start,
    /// Progress report while processing. Values that do not advance the
    /// current percentage are ignored.
    Progress(u8),
    /// Processing -> Completed. Sets progress to 100.
    Complete {
        output_path: PathBuf,
        output_bytes: u64,
    },
    /// Queued/Processing -> Failed.
    Fail(String),
}

/// Thread-safe in-memory job store.
#[derive(Debug, Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new job. Rejects duplicate IDs.
    pub fn insert(&self, job: Job) -> Result<()> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.id) {
            return Err(Error::Conflict(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id, job);
        Ok(())
    }

    /// Fetch a snapshot of a job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.read().get(&id).cloned()
    }

    /// Apply a lifecycle transition and return the updated job.
    pub fn update(&self, id: JobId, update: JobUpdate) -> Result<Job> {
        let mut jobs = self.jobs.write();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::not_found("job", id))?;

        match update {
            JobUpdate::Start => {
                if !job.state.can_transition_to(JobState::Processing) {
                    return Err(illegal(job, JobState::Processing));
                }
                job.state = JobState::Processing;
            }
            JobUpdate::Progress(pct) => {
                // Late progress from a finished encode is expected noise.
                if job.state != JobState::Processing {
                    return Ok(job.clone());
                }
                if pct > job.progress {
                    job.progress = pct.min(100);
                } else {
                    return Ok(job.clone());
                }
            }
            JobUpdate::Complete {
                output_path,
                output_bytes,
            } => {
                if !job.state.can_transition_to(JobState::Completed) {
                    return Err(illegal(job, JobState::Completed));
                }
                job.state = JobState::Completed;
                job.progress = 100;
                job.output_path = Some(output_path);
                job.output_bytes = Some(output_bytes);
                job.finished_at = Some(Utc::now());
            }
            JobUpdate::Fail(message) => {
                if !job.state.can_transition_to(JobState::Failed) {
                    return Err(illegal(job, JobState::Failed));
                }
                job.state = JobState::Failed;
                job.error = Some(message);
                job.finished_at = Some(Utc::now());
            }
        }

        job.updated_at = Utc::now();
        Ok(job.clone())
    }

    /// Fail a job, logging instead of propagating when the transition is
    /// illegal. Used by the orchestrator, which has nowhere to report errors.
    pub fn fail_quietly(&self, id: JobId, message: impl Into<String>) {
        let message = message.into();
        if let Err(e) = self.update(id, JobUpdate::Fail(message)) {
            tracing::warn!(job_id = %id, error = %e, "could not mark job failed");
        }
    }

    /// Remove a job, returning it if it existed. The caller is responsible
    /// for the job's files.
    pub fn remove(&self, id: JobId) -> Option<Job> {
        self.jobs.write().remove(&id)
    }

    /// Aggregate counts across all jobs.
    pub fn stats(&self) -> JobStats {
        let jobs = self.jobs.read();
        let mut stats = JobStats {
            total: jobs.len(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.state {
                JobState::Queued => stats.queued += 1,
                JobState::Processing => stats.processing += 1,
                JobState::Completed => stats.completed += 1,
                JobState::Failed => stats.failed += 1,
            }
        }
        stats
    }

    /// Remove terminal jobs whose retention window has elapsed, deleting
    /// their files best-effort. Returns the number of jobs reclaimed.
    pub fn reclaim(&self, retention: Duration) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::zero());

        let expired: Vec<JobId> = {
            let jobs = self.jobs.read();
            jobs.values()
                .filter(|j| {
                    j.state.is_terminal()
                        && j.finished_at.map(|t| t < cutoff).unwrap_or(false)
                })
                .map(|j| j.id)
                .collect()
        };

        let mut removed = Vec::with_capacity(expired.len());
        {
            let mut jobs = self.jobs.write();
            for id in expired {
                if let Some(job) = jobs.remove(&id) {
                    removed.push(job);
                }
            }
        }

        // File deletion happens outside the lock.
        for job in &removed {
            delete_job_files(job);
            tracing::info!(job_id = %job.id, state = %job.state, "reclaimed expired job");
        }

        removed.len()
    }

    /// Spawn the periodic reclamation sweep. Runs until `cancel` fires.
    pub fn spawn_reclaim_task(
        self: &Arc<Self>,
        interval: Duration,
        retention: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            tracing::info!(
                interval_secs = interval.as_secs(),
                retention_secs = retention.as_secs(),
                "reclaim task started"
            );
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let reclaimed = store.reclaim(retention);
                        if reclaimed > 0 {
                            tracing::info!(count = reclaimed, "reclaim sweep removed jobs");
                        }
                    }
                    _ = cancel.cancelled() => {
                        tracing::info!("reclaim task stopped");
                        break;
                    }
                }
            }
        })
    }
}

/// Best-effort removal of a job's input and output files.
pub fn delete_job_files(job: &Job) {
    if let Err(e) = std::fs::remove_file(&job.input_path) {
        tracing::debug!(job_id = %job.id, error = %e, "input file not removed");
    }
    if let Some(ref output) = job.output_path {
        if let Err(e) = std::fs::remove_file(output) {
            tracing::debug!(job_id = %job.id, error = %e, "output file not removed");
        }
    }
}

fn illegal(job: &Job, next: JobState) -> Error {
    tracing::warn!(
        job_id = %job.id,
        from = %job.state,
        to = %next,
        "illegal job state transition rejected"
    );
    Error::Conflict(format!(
        "job {} cannot move from {} to {}",
        job.id, job.state, next
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job() -> Job {
        Job::new(
            JobId::new(),
            "medium",
            "track.wav",
            PathBuf::from("/tmp/does-not-exist-in"),
            100,
        )
    }

    #[test]
    fn insert_and_get() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();

        let fetched = store.get(id).unwrap();
        assert_eq!(fetched.state, JobState::Queued);
        assert!(store.get(JobId::new()).is_none());
    }

    #[test]
    fn duplicate_insert_is_conflict() {
        let store = JobStore::new();
        let job = queued_job();
        store.insert(job.clone()).unwrap();
        assert!(store.insert(job).is_err());
    }

    #[test]
    fn full_lifecycle_to_completed() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();

        store.update(id, JobUpdate::Start).unwrap();
        store.update(id, JobUpdate::Progress(40)).unwrap();
        let job = store
            .update(
                id,
                JobUpdate::Complete {
                    output_path: PathBuf::from("/tmp/out.mp3"),
                    output_bytes: 42,
                },
            )
            .unwrap();

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.output_bytes, Some(42));
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn queued_job_can_fail_directly() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();

        let job = store.update(id, JobUpdate::Fail("input vanished".into())).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("input vanished"));
    }

    #[test]
    fn completed_job_rejects_further_transitions() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();
        store.update(id, JobUpdate::Start).unwrap();
        store
            .update(
                id,
                JobUpdate::Complete {
                    output_path: PathBuf::from("/tmp/out.mp3"),
                    output_bytes: 1,
                },
            )
            .unwrap();

        assert!(store.update(id, JobUpdate::Start).is_err());
        assert!(store.update(id, JobUpdate::Fail("late".into())).is_err());
    }

    #[test]
    fn regressive_progress_is_dropped() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();
        store.update(id, JobUpdate::Start).unwrap();

        store.update(id, JobUpdate::Progress(60)).unwrap();
        let job = store.update(id, JobUpdate::Progress(30)).unwrap();
        assert_eq!(job.progress, 60);
    }

    #[test]
    fn progress_on_terminal_job_is_ignored() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();
        store.update(id, JobUpdate::Start).unwrap();
        store
            .update(
                id,
                JobUpdate::Complete {
                    output_path: PathBuf::from("/tmp/out.mp3"),
                    output_bytes: 1,
                },
            )
            .unwrap();

        let job = store.update(id, JobUpdate::Progress(50)).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn progress_before_start_is_ignored() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();

        let job = store.update(id, JobUpdate::Progress(50)).unwrap();
        assert_eq!(job.progress, 0);
        assert_eq!(job.state, JobState::Queued);
    }

    #[test]
    fn update_unknown_job_is_not_found() {
        let store = JobStore::new();
        let result = store.update(JobId::new(), JobUpdate::Start);
        assert!(matches!(
            result,
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn stats_count_by_state() {
        let store = JobStore::new();

        let a = queued_job();
        let b = queued_job();
        let c = queued_job();
        let (ida, idb) = (a.id, b.id);
        store.insert(a).unwrap();
        store.insert(b).unwrap();
        store.insert(c).unwrap();

        store.update(ida, JobUpdate::Start).unwrap();
        store.update(idb, JobUpdate::Fail("boom".into())).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.completed, 0);
    }

    #[test]
    fn reclaim_removes_only_expired_terminal_jobs() {
        let store = JobStore::new();

        // Terminal and old.
        let mut old = queued_job();
        old.state = JobState::Failed;
        old.finished_at = Some(Utc::now() - chrono::Duration::hours(2));
        let old_id = old.id;
        store.insert(old).unwrap();

        // Terminal but fresh.
        let mut fresh = queued_job();
        fresh.state = JobState::Completed;
        fresh.finished_at = Some(Utc::now());
        let fresh_id = fresh.id;
        store.insert(fresh).unwrap();

        // Still running.
        let mut running = queued_job();
        running.state = JobState::Processing;
        let running_id = running.id;
        store.insert(running).unwrap();

        let reclaimed = store.reclaim(Duration::from_secs(3600));
        assert_eq!(reclaimed, 1);
        assert!(store.get(old_id).is_none());
        assert!(store.get(fresh_id).is_some());
        assert!(store.get(running_id).is_some());
    }

    #[test]
    fn reclaim_deletes_files() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.wav");
        let output = dir.path().join("out.mp3");
        std::fs::write(&input, b"in").unwrap();
        std::fs::write(&output, b"out").unwrap();

        let store = JobStore::new();
        let mut job = Job::new(JobId::new(), "low", "in.wav", input.clone(), 2);
        job.state = JobState::Completed;
        job.output_path = Some(output.clone());
        job.finished_at = Some(Utc::now() - chrono::Duration::hours(2));
        store.insert(job).unwrap();

        assert_eq!(store.reclaim(Duration::from_secs(60)), 1);
        assert!(!input.exists());
        assert!(!output.exists());
    }

    #[test]
    fn remove_is_idempotent() {
        let store = JobStore::new();
        let job = queued_job();
        let id = job.id;
        store.insert(job).unwrap();

        assert!(store.remove(id).is_some());
        assert!(store.remove(id).is_none());
    }
}
