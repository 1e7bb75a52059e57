//! Background recompute worker
//!
//! Foreground operations mark values stale and enqueue the project; the
//! worker drains stale entries in dependency order. Each entry is committed
//! under the project's write lock on its own, so readers in between see a
//! mix of fresh and stale values, never a half-written one.
//!
//! Cancellation is by sequence number: cancelling a project drops every run
//! requested before the cancel, including one in progress.

use crate::error::EngineError;
use crate::recompute::{pending, recompute_entry, RecomputeReport};
use crate::store::ProjectStore;
use cardprop_model::ProjectId;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Work for the recompute worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeTask {
    /// Bring every stale entry of a project up to date
    RunOnce {
        /// Target project
        project: ProjectId,
        /// Request sequence number
        seq: u64,
    },
    /// Stop after the current task
    Shutdown,
}

/// Counters of a worker's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Runs completed
    pub runs: usize,
    /// Runs dropped by cancellation
    pub cancelled: usize,
    /// Entries evaluated
    pub evaluated: usize,
    /// Entry failures
    pub failures: usize,
}

#[derive(Debug, Default)]
struct Sequencer {
    next: AtomicU64,
    cancelled: DashMap<ProjectId, u64>,
}

impl Sequencer {
    fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_cancelled(&self, project: ProjectId, seq: u64) -> bool {
        self.cancelled.get(&project).is_some_and(|mark| seq <= *mark)
    }
}

/// Sending side: enqueue and cancel recompute runs
#[derive(Debug, Clone)]
pub struct RecomputeQueue {
    sender: mpsc::Sender<RecomputeTask>,
    sequencer: Arc<Sequencer>,
}

impl RecomputeQueue {
    /// Request a run; returns its sequence number
    pub async fn enqueue(&self, project: ProjectId) -> Result<u64, EngineError> {
        let seq = self.sequencer.next();
        self.sender
            .send(RecomputeTask::RunOnce { project, seq })
            .await
            .map_err(|_| EngineError::WorkerStopped)?;
        debug!(project = %project, seq, "recompute enqueued");
        Ok(seq)
    }

    /// Drop every run of `project` requested so far
    pub fn cancel(&self, project: ProjectId) -> u64 {
        let seq = self.sequencer.next();
        self.sequencer.cancelled.insert(project, seq);
        debug!(project = %project, seq, "recompute cancelled");
        seq
    }

    /// Ask the worker to stop
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        self.sender
            .send(RecomputeTask::Shutdown)
            .await
            .map_err(|_| EngineError::WorkerStopped)
    }
}

/// Receiving side: owns the loop
#[derive(Debug)]
pub struct RecomputeWorker {
    store: Arc<ProjectStore>,
    receiver: mpsc::Receiver<RecomputeTask>,
    sequencer: Arc<Sequencer>,
    stats: WorkerStats,
}

/// Create a connected queue and worker
#[must_use]
pub fn recompute_channel(store: Arc<ProjectStore>, capacity: usize) -> (RecomputeQueue, RecomputeWorker) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let sequencer = Arc::new(Sequencer::default());
    (
        RecomputeQueue {
            sender,
            sequencer: Arc::clone(&sequencer),
        },
        RecomputeWorker {
            store,
            receiver,
            sequencer,
            stats: WorkerStats::default(),
        },
    )
}

impl RecomputeWorker {
    /// Process tasks until shutdown or until every queue handle is dropped
    pub async fn run(mut self) -> WorkerStats {
        while let Some(task) = self.receiver.recv().await {
            match task {
                RecomputeTask::Shutdown => break,
                RecomputeTask::RunOnce { project, seq } => {
                    if self.sequencer.is_cancelled(project, seq) {
                        self.stats.cancelled += 1;
                        continue;
                    }
                    match self.run_project(project, seq).await {
                        Ok(Some(report)) => {
                            self.stats.runs += 1;
                            self.stats.evaluated += report.evaluated;
                            self.stats.failures += report.failures.len();
                        }
                        Ok(None) => self.stats.cancelled += 1,
                        Err(err) => warn!(project = %project, error = %err, "recompute run failed"),
                    }
                }
            }
        }
        info!(runs = self.stats.runs, cancelled = self.stats.cancelled, "recompute worker stopped");
        self.stats
    }

    /// One run; `None` if it was cancelled midway
    async fn run_project(&self, project: ProjectId, seq: u64) -> Result<Option<RecomputeReport>, EngineError> {
        let shared = self.store.get(project)?;
        let yield_every = shared.read().config.recompute_yield_every.max(1);
        let mut report = RecomputeReport::default();

        loop {
            let work = pending(&shared.read());
            let mut progressed = false;
            for (done, (property, card)) in work.iter().enumerate() {
                if self.sequencer.is_cancelled(project, seq) {
                    return Ok(None);
                }
                let outcome = recompute_entry(&mut shared.write(), *property, *card);
                match outcome {
                    Ok(true) => {
                        report.evaluated += 1;
                        progressed = true;
                    }
                    Ok(false) => {}
                    Err(failure) => report.failures.push(failure),
                }
                if (done + 1) % yield_every == 0 {
                    tokio::task::yield_now().await;
                }
            }
            // entries that only fail make no progress; leave them stale
            if work.is_empty() || !progressed {
                break;
            }
        }
        debug!(
            project = %project,
            evaluated = report.evaluated,
            failures = report.failures.len(),
            "recompute run finished"
        );
        Ok(Some(report))
    }
}
