//! Job Dispatcher - queue, worker pool, per-artifact exclusion
//!
//! Every trigger funnels into `submit`. The job table holds the current
//! attempt per artifact key; a key is only enqueued when a new attempt is
//! created, and a worker only runs a job it moved from Queued to Running under
//! the table lock. Two attempts for the same key therefore never run at once.
//!
//! Failed attempts are terminal. Submitting the artifact again creates the
//! next attempt; submitting a succeeded artifact returns the prior result.
//!
//! Finished entries keep a `JobSummary` only; the alerts of a job are read
//! back from the alert log.

mod job;


use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::logic::artifact::{CaptureArtifact, JobKey};
use crate::logic::error::{ErrorKind, PipelineError, PipelineResult};
use crate::logic::pipeline::{JobOutcome, Pipeline};

pub use job::{JobError, JobSnapshot, JobState, JobSummary};
use job::{JobEntry, JobResult};

/// How long shutdown waits for aborted jobs to unwind
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ============================================================================
// PUBLIC TYPES
// ============================================================================

/// What `submit` did with an artifact
#[derive(Debug, Clone)]
pub enum Submission {
    /// New attempt enqueued
    Queued(JobSnapshot),
    /// Same key already queued or running
    InProgress(JobSnapshot),
    /// Same key already succeeded; nothing re-run
    AlreadySucceeded(JobSnapshot),
}

impl Submission {
    pub fn snapshot(&self) -> &JobSnapshot {
        match self {
            Submission::Queued(s) | Submission::InProgress(s) | Submission::AlreadySucceeded(s) => s,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Submission::Queued(_) => "queued",
            Submission::InProgress(_) => "in_progress",
            Submission::AlreadySucceeded(_) => "completed",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum WaitError {
    #[error("unknown job")]
    UnknownJob,

    #[error("timed out waiting for job")]
    Timeout,

    #[error("job failed: {}", .0.message)]
    Failed(JobError),

    #[error("job was cancelled")]
    Cancelled,
}

// ============================================================================
// DISPATCHER
// ============================================================================

pub struct Dispatcher {
    inner: Arc<Inner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

struct Inner {
    pipeline: Arc<Pipeline>,
    jobs: Mutex<HashMap<JobKey, JobEntry>>,
    queue: mpsc::UnboundedSender<JobKey>,
    /// Set by `shutdown`, read under the `jobs` lock
    closing: AtomicBool,
}

type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<JobKey>>>;

impl Dispatcher {
    /// Spawn `workers` worker tasks on the current runtime
    pub fn start(pipeline: Arc<Pipeline>, workers: usize) -> Arc<Self> {
        let (queue, receiver) = mpsc::unbounded_channel();
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let inner = Arc::new(Inner {
            pipeline,
            jobs: Mutex::new(HashMap::new()),
            queue,
            closing: AtomicBool::new(false),
        });

        let count = workers.max(1);
        let handles = (0..count)
            .map(|id| tokio::spawn(worker_loop(id, inner.clone(), receiver.clone())))
            .collect();

        log::info!("Dispatcher started with {} worker(s)", count);
        Arc::new(Self {
            inner,
            workers: Mutex::new(handles),
        })
    }

    pub fn submit(&self, artifact: CaptureArtifact) -> PipelineResult<Submission> {
        let key = artifact.job_key();
        let mut jobs = self.inner.jobs.lock();
        if self.inner.closing.load(Ordering::SeqCst) {
            return Err(PipelineError::Cancelled("dispatcher is shutting down".to_string()));
        }

        let attempt = match jobs.get(&key) {
            Some(entry) => match entry.state {
                JobState::Queued | JobState::Running => {
                    log::info!("Job {} for {} already in progress", key.short(), artifact.name);
                    return Ok(Submission::InProgress(entry.snapshot()));
                }
                JobState::Succeeded => {
                    log::info!("Job {} for {} already succeeded", key.short(), artifact.name);
                    return Ok(Submission::AlreadySucceeded(entry.snapshot()));
                }
                JobState::Failed => entry.attempt + 1,
            },
            None => 1,
        };

        let output_dir = self.job_output_dir(&artifact, &key, attempt);
        let name = artifact.name.clone();
        let origin = artifact.origin;
        let mut entry = JobEntry::new(key.clone(), artifact, attempt, output_dir);

        if self.inner.queue.send(key.clone()).is_err() {
            let err = PipelineError::Internal("dispatcher is shut down".to_string());
            entry.finish(Err((&err).into()));
            jobs.insert(key, entry);
            return Err(err);
        }

        let snapshot = entry.snapshot();
        jobs.insert(key.clone(), entry);
        log::info!(
            "Job {} queued: {} ({:?}, attempt {})",
            key.short(),
            name,
            origin,
            attempt
        );
        Ok(Submission::Queued(snapshot))
    }

    pub fn status(&self, key: &JobKey) -> Option<JobSnapshot> {
        self.inner.jobs.lock().get(key).map(JobEntry::snapshot)
    }

    /// All known jobs, most recently submitted first
    pub fn jobs(&self) -> Vec<JobSnapshot> {
        let mut snapshots: Vec<JobSnapshot> = self.inner.jobs.lock().values().map(JobEntry::snapshot).collect();
        snapshots.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        snapshots
    }

    /// Wait for the current attempt of `key` to end
    pub async fn wait(&self, key: &JobKey, timeout: Duration) -> Result<JobSummary, WaitError> {
        let mut done = {
            let jobs = self.inner.jobs.lock();
            jobs.get(key).ok_or(WaitError::UnknownJob)?.done.subscribe()
        };

        let result: Option<JobResult> = tokio::time::timeout(timeout, done.wait_for(|r| r.is_some()))
            .await
            .map_err(|_| WaitError::Timeout)?
            .map_err(|_| WaitError::Cancelled)?
            .clone();

        match result {
            Some(Ok(summary)) => Ok(summary),
            Some(Err(error)) if error.kind == ErrorKind::Cancelled => Err(WaitError::Cancelled),
            Some(Err(error)) => Err(WaitError::Failed(error)),
            None => Err(WaitError::Cancelled),
        }
    }

    /// Reject new work, cancel queued and running jobs, then stop the workers
    ///
    /// Waiters of cancelled jobs get `WaitError::Cancelled`. Returns once the
    /// aborted jobs have unwound and their extractor containers are removed.
    pub async fn shutdown(&self) {
        let running: Vec<watch::Receiver<Option<JobResult>>> = {
            let mut jobs = self.inner.jobs.lock();
            self.inner.closing.store(true, Ordering::SeqCst);

            let mut running = Vec::new();
            for entry in jobs.values_mut() {
                match entry.state {
                    JobState::Queued => {
                        log::warn!("Cancelling queued job {} ({})", entry.key.short(), entry.artifact.name);
                        entry.finish(Err((&cancelled()).into()));
                    }
                    JobState::Running => {
                        log::warn!("Aborting running job {} ({})", entry.key.short(), entry.artifact.name);
                        // Not yet attached: `attach` aborts it on sight
                        if let Some(task) = &entry.task {
                            task.abort();
                        }
                        running.push(entry.done.subscribe());
                    }
                    JobState::Succeeded | JobState::Failed => {}
                }
            }
            running
        };

        // Workers record the cancellation once the aborted task has unwound
        for mut done in running {
            if tokio::time::timeout(SHUTDOWN_GRACE, done.wait_for(|r| r.is_some()))
                .await
                .is_err()
            {
                log::warn!("A cancelled job did not stop within {:?}", SHUTDOWN_GRACE);
            }
        }

        let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in workers {
            handle.abort();
        }

        self.inner.pipeline.extractor().wait_for_cleanup().await;
        log::info!("Dispatcher stopped");
    }

    fn job_output_dir(&self, artifact: &CaptureArtifact, key: &JobKey, attempt: u32) -> PathBuf {
        self.inner
            .pipeline
            .config()
            .output_dir
            .join(format!("{}_{}_{}", artifact.stem(), key.short(), attempt))
    }
}

// ============================================================================
// WORKERS
// ============================================================================

async fn worker_loop(id: usize, inner: Arc<Inner>, receiver: SharedReceiver) {
    log::debug!("Worker {} started", id);

    loop {
        let next = receiver.lock().await.recv().await;
        let Some(key) = next else { break };

        let Some((artifact, output_dir)) = inner.claim(&key) else {
            log::debug!("Worker {}: job {} not claimable, skipping", id, key.short());
            continue;
        };

        // Own task so a panic fails the job instead of the worker
        let pipeline = inner.pipeline.clone();
        let job_key = key.clone();
        let task = tokio::spawn(async move { pipeline.run(&artifact, &job_key, &output_dir).await });
        inner.attach(&key, &task);

        let result: JobResult = match task.await {
            Ok(Ok(outcome)) => Ok(JobSummary::from(&outcome)),
            Ok(Err(err)) => Err((&err).into()),
            Err(join_err) if join_err.is_panic() => Err((&PipelineError::Internal("job panicked".to_string())).into()),
            Err(_) => Err((&cancelled()).into()),
        };
        inner.complete(&key, result);
    }

    log::debug!("Worker {} stopped", id);
}

fn cancelled() -> PipelineError {
    PipelineError::Cancelled("dispatcher shut down".to_string())
}

impl Inner {
    /// Exclusive Queued → Running transition
    fn claim(&self, key: &JobKey) -> Option<(CaptureArtifact, PathBuf)> {
        let mut jobs = self.jobs.lock();
        let entry = jobs.get_mut(key)?;
        if entry.state != JobState::Queued {
            return None;
        }
        entry.state = JobState::Running;
        entry.started_at = Some(chrono::Utc::now());
        log::info!("Job {} running (attempt {})", key.short(), entry.attempt);
        Some((entry.artifact.clone(), entry.output_dir.clone()))
    }

    fn attach(&self, key: &JobKey, task: &JoinHandle<PipelineResult<JobOutcome>>) {
        let mut jobs = self.jobs.lock();
        if self.closing.load(Ordering::SeqCst) {
            task.abort();
            return;
        }
        if let Some(entry) = jobs.get_mut(key) {
            entry.task = Some(task.abort_handle());
        }
    }

    fn complete(&self, key: &JobKey, result: JobResult) {
        let mut jobs = self.jobs.lock();
        let Some(entry) = jobs.get_mut(key) else { return };

        match &result {
            Ok(summary) => log::info!(
                "Job {} succeeded: {} table(s), {} flows, {} alert(s) ({} new)",
                key.short(),
                summary.flow_tables.len(),
                summary.flows_scored,
                summary.alert_count,
                summary.alerts_appended
            ),
            Err(error) => log::error!("Job {} failed [{}]: {}", key.short(), error.kind, error.message),
        }
        entry.finish(result);
    }
}
