//! Fixed-size worker pool for offline jobs with bounded job and result queues.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossfire::mpmc;
use crossfire::{MAsyncRx, MAsyncTx, TrySendError};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Barrier, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

use crate::shutdown::{Shutdown, ShutdownTrigger};

/// A unit of work. `task` runs on tokio's blocking pool.
pub struct Job<T> {
    pub id: u64,
    pub task: Box<dyn FnOnce() -> T + Send>,
}

impl<T> Job<T> {
    pub fn new(id: u64, task: impl FnOnce() -> T + Send + 'static) -> Self {
        Self {
            id,
            task: Box::new(task),
        }
    }
}

impl<T> std::fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job").field("id", &self.id).finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome<T> {
    Completed(T),
    /// The job panicked; carries the panic message when it was a string.
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobResult<T> {
    pub job_id: u64,
    pub outcome: JobOutcome<T>,
}

impl<T> JobResult<T> {
    pub fn completed(&self) -> Option<&T> {
        match &self.outcome {
            JobOutcome::Completed(value) => Some(value),
            JobOutcome::Failed(_) => None,
        }
    }
}

pub type ResultReceiver<T> = MAsyncRx<JobResult<T>>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool has not been started")]
    NotStarted,
    #[error("worker pool is shut down")]
    ShutDown,
}

struct Fence {
    barrier: Arc<Barrier>,
    done: oneshot::Sender<()>,
}

enum Work<T> {
    Run(Job<T>),
    Fence(Fence),
}

/// `workers` tasks pulling from one bounded job queue.
pub struct WorkerPool<T: Send + Unpin + 'static> {
    workers: usize,
    job_tx: Mutex<Option<MAsyncTx<Work<T>>>>,
    job_rx: Mutex<Option<MAsyncRx<Work<T>>>>,
    result_tx: Mutex<Option<MAsyncTx<JobResult<T>>>>,
    result_rx: ResultReceiver<T>,
    trigger: ShutdownTrigger,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: AtomicBool,
    dropped: Arc<AtomicU64>,
    // One barrier round at a time.
    fence_round: tokio::sync::Mutex<()>,
}

impl<T: Send + Unpin + 'static> WorkerPool<T> {
    #[must_use]
    pub fn new(workers: usize, job_buffer: usize, result_buffer: usize) -> Self {
        let (job_tx, job_rx) = mpmc::bounded_async(job_buffer.max(1));
        let (result_tx, result_rx) = mpmc::bounded_async(result_buffer.max(1));
        Self {
            workers: workers.max(1),
            job_tx: Mutex::new(Some(job_tx)),
            job_rx: Mutex::new(Some(job_rx)),
            result_tx: Mutex::new(Some(result_tx)),
            result_rx,
            trigger: ShutdownTrigger::new(),
            handles: Mutex::new(Vec::new()),
            started: AtomicBool::new(false),
            dropped: Arc::default(),
            fence_round: tokio::sync::Mutex::new(()),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawn the workers on the current runtime. Returns `false` when already
    /// started or shut down.
    pub fn start(&self) -> bool {
        let Some(jobs) = self.job_rx.lock().take() else {
            return false;
        };
        let Some(results) = self.result_tx.lock().clone() else {
            return false;
        };
        let mut handles = self.handles.lock();
        for index in 0..self.workers {
            handles.push(tokio::spawn(run_worker(
                index,
                jobs.clone(),
                results.clone(),
                Arc::clone(&self.dropped),
                self.trigger.subscribe(),
            )));
        }
        self.started.store(true, Ordering::Release);
        info!(workers = self.workers, "worker pool started");
        true
    }

    /// Queue a job without waiting. `false` when the pool is not running or
    /// the queue is full.
    pub fn submit(&self, job: Job<T>) -> bool {
        if !self.started.load(Ordering::Acquire) || self.trigger.is_triggered() {
            return false;
        }
        let guard = self.job_tx.lock();
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.try_send(Work::Run(job)) {
            Ok(()) => true,
            Err(TrySendError::Full(Work::Run(job))) => {
                debug!(job_id = job.id, "job queue full; rejecting job");
                false
            }
            Err(_) => false,
        }
    }

    /// Another handle on the shared result queue.
    pub fn results(&self) -> ResultReceiver<T> {
        self.result_rx.clone()
    }

    /// Results discarded because the result queue was full.
    pub fn dropped_results(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Resolve once every job submitted before this call has finished.
    ///
    /// One fence per worker is queued behind the pending jobs; each worker
    /// holds its fence at a shared barrier, so no worker can take two fences
    /// and every earlier job has run to completion when the barrier opens.
    pub async fn wait_for_completion(&self) -> Result<(), PoolError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(PoolError::NotStarted);
        }
        let _round = self.fence_round.lock().await;
        let sender = self.job_tx.lock().clone().ok_or(PoolError::ShutDown)?;
        let mut shutdown = self.trigger.subscribe();
        let barrier = Arc::new(Barrier::new(self.workers));

        let mut pending = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let (done, wait) = oneshot::channel();
            let fence = Work::Fence(Fence {
                barrier: Arc::clone(&barrier),
                done,
            });
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(PoolError::ShutDown),
                sent = sender.send(fence) => {
                    if sent.is_err() {
                        return Err(PoolError::ShutDown);
                    }
                }
            }
            pending.push(wait);
        }
        drop(sender);

        for wait in pending {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => return Err(PoolError::ShutDown),
                released = wait => released.map_err(|_| PoolError::ShutDown)?,
            }
        }
        Ok(())
    }

    /// Cancel the workers, close the job queue and wait for every worker to
    /// exit. Idempotent.
    pub async fn shutdown(&self) {
        self.trigger.trigger();
        self.job_tx.lock().take();
        self.job_rx.lock().take();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "worker task failed");
            }
        }
        self.result_tx.lock().take();
    }
}

async fn run_worker<T: Send + Unpin + 'static>(
    index: usize,
    jobs: MAsyncRx<Work<T>>,
    results: MAsyncTx<JobResult<T>>,
    dropped: Arc<AtomicU64>,
    mut shutdown: Shutdown,
) {
    loop {
        let work = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            received = jobs.recv() => match received {
                Ok(work) => work,
                Err(_) => break,
            },
        };
        match work {
            Work::Fence(fence) => {
                tokio::select! {
                    biased;
                    () = shutdown.cancelled() => break,
                    _ = fence.barrier.wait() => {
                        let _ = fence.done.send(());
                    }
                }
            }
            Work::Run(job) => {
                let job_id = job.id;
                let outcome = match tokio::task::spawn_blocking(job.task).await {
                    Ok(value) => JobOutcome::Completed(value),
                    Err(err) => {
                        let reason = failure_reason(err);
                        warn!(worker = index, job_id, %reason, "job failed");
                        JobOutcome::Failed(reason)
                    }
                };
                if results.try_send(JobResult { job_id, outcome }).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(worker = index, job_id, "result queue full; dropping result");
                }
            }
        }
    }
    debug!(worker = index, "worker stopped");
}

fn failure_reason(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "job panicked".to_owned()
    }
}
