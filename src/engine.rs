//! Parallel clone/pull execution
//!
//! A fixed pool of workers drains one shared job queue and reports each result
//! on one outcome channel. Every submitted job produces exactly one
//! [`ExecutionOutcome`], including jobs that never started because the stop
//! signal was raised.

use futures::stream::{FuturesUnordered, StreamExt};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

use crate::error::ExecutionError;
use crate::git::GitOps;

/// Worker count used when none is requested
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobAction {
    Clone { url: String, branch: Option<String> },
    Pull,
}

/// One clone or pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionJob {
    /// `owner/repo` for clones, the directory name for pulls
    pub name: String,
    pub target: PathBuf,
    pub action: JobAction,
    pub ssh_key: Option<PathBuf>,
}

impl ExecutionJob {
    pub fn clone_repo(
        name: impl Into<String>,
        url: impl Into<String>,
        target: PathBuf,
        branch: Option<String>,
        ssh_key: Option<PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            target,
            action: JobAction::Clone {
                url: url.into(),
                branch,
            },
            ssh_key,
        }
    }

    pub fn pull(name: impl Into<String>, target: PathBuf, ssh_key: Option<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target,
            action: JobAction::Pull,
            ssh_key,
        }
    }
}

#[derive(Debug)]
pub struct ExecutionOutcome {
    pub name: String,
    pub success: bool,
    pub error: Option<ExecutionError>,
}

impl ExecutionOutcome {
    fn from_result(name: String, result: Result<(), ExecutionError>) -> Self {
        match result {
            Ok(()) => Self {
                name,
                success: true,
                error: None,
            },
            Err(e) => Self {
                name,
                success: false,
                error: Some(e),
            },
        }
    }
}

/// Cooperative stop flag: in-flight jobs finish, queued ones are cancelled
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// `min(requested, jobs)`, with [`DEFAULT_WORKERS`] standing in for zero
pub fn effective_workers(requested: usize, jobs: usize) -> usize {
    let requested = if requested == 0 {
        DEFAULT_WORKERS
    } else {
        requested
    };
    requested.min(jobs)
}

pub struct ExecutionEngine {
    git: Arc<dyn GitOps>,
    stop: StopSignal,
}

impl ExecutionEngine {
    pub fn new(git: Arc<dyn GitOps>, stop: StopSignal) -> Self {
        Self { git, stop }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    /// Run `jobs` on up to `workers` concurrent workers
    ///
    /// `on_progress(completed, total)` is called once per finished job. The
    /// returned outcomes are in completion order.
    pub async fn execute<F>(
        &self,
        jobs: Vec<ExecutionJob>,
        workers: usize,
        mut on_progress: F,
    ) -> Vec<ExecutionOutcome>
    where
        F: FnMut(usize, usize),
    {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = effective_workers(workers, total);
        info!("Running {} jobs on {} workers", total, workers);

        let (job_tx, job_rx) = mpsc::channel(total);
        for job in jobs {
            // Capacity equals the job count, so this never waits
            if job_tx.send(job).await.is_err() {
                break;
            }
        }
        drop(job_tx);

        let queue = Arc::new(Mutex::new(job_rx));
        let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();

        let pool: FuturesUnordered<_> = (0..workers)
            .map(|id| self.worker(id, Arc::clone(&queue), outcome_tx.clone()))
            .collect();
        drop(outcome_tx);

        let drive = pool.collect::<Vec<()>>();
        let gather = async {
            let mut outcomes = Vec::with_capacity(total);
            while let Some(outcome) = outcome_rx.recv().await {
                outcomes.push(outcome);
                on_progress(outcomes.len(), total);
            }
            outcomes
        };

        let (_, outcomes) = tokio::join!(drive, gather);
        outcomes
    }

    async fn worker(
        &self,
        id: usize,
        queue: Arc<Mutex<mpsc::Receiver<ExecutionJob>>>,
        outcomes: mpsc::UnboundedSender<ExecutionOutcome>,
    ) {
        loop {
            let next = queue.lock().await.recv().await;
            let Some(job) = next else { break };

            let outcome = if self.stop.is_raised() {
                debug!("Worker {} cancelling {}", id, job.name);
                ExecutionOutcome::from_result(job.name, Err(ExecutionError::Cancelled))
            } else {
                debug!("Worker {} running {}", id, job.name);
                let result = self.run(&job).await;
                if let Err(e) = &result {
                    debug!("Worker {} finished {} with error: {}", id, job.name, e);
                }
                ExecutionOutcome::from_result(job.name, result)
            };

            if outcomes.send(outcome).is_err() {
                break;
            }
        }
    }

    async fn run(&self, job: &ExecutionJob) -> Result<(), ExecutionError> {
        let key = job.ssh_key.as_deref();
        match &job.action {
            JobAction::Clone { url, branch } => {
                self.git
                    .clone_repo(url, &job.target, branch.as_deref(), key)
                    .await
            }
            JobAction::Pull => self.git.pull(&job.target, key).await,
        }
    }
}
