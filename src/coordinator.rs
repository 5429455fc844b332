use std::collections::HashSet;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::client::{DEFAULT_TIMEOUT, MetadataClient};
use crate::domain::{HttpMethod, Task};
use crate::error::FetchFailure;
use crate::queue::WorkQueue;
use crate::store::{OccurrenceTable, ResultStore};
use crate::worker::{FailedTask, FailureLog, FetchWorker, WorkerSummary};

pub const DEFAULT_WORKER_COUNT: usize = 200;
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    pub method: HttpMethod,
    pub worker_count: usize,
    pub timeout: Duration,
    /// `None` disables the progress monitor.
    pub monitor_interval: Option<Duration>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            method: HttpMethod::Get,
            worker_count: DEFAULT_WORKER_COUNT,
            timeout: DEFAULT_TIMEOUT,
            monitor_interval: Some(DEFAULT_MONITOR_INTERVAL),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub remaining: usize,
    pub total: usize,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink: Send + Sync {
    fn event(&self, event: ProgressEvent);
}

/// Reports progress through `tracing`.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        tracing::info!(
            remaining = event.remaining,
            total = event.total,
            elapsed = ?event.elapsed,
            "{}",
            event.message
        );
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub method: HttpMethod,
    pub workers: usize,
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedTask>,
    /// Tasks dropped because an earlier task had the same id.
    pub duplicates: Vec<Task>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

/// Everything one run produced. Owned by the caller; nothing is shared
/// between runs.
#[derive(Debug)]
pub struct Batch {
    results: ResultStore,
    occurrences: OccurrenceTable,
    report: BatchReport,
}

impl Batch {
    pub fn results(&self) -> &ResultStore {
        &self.results
    }

    pub fn occurrences(&self) -> &OccurrenceTable {
        &self.occurrences
    }

    pub fn report(&self) -> &BatchReport {
        &self.report
    }
}

pub struct Coordinator<C: MetadataClient> {
    client: C,
    settings: FetchSettings,
    progress: Box<dyn ProgressSink>,
}

impl<C: MetadataClient> Coordinator<C> {
    pub fn new(client: C, settings: FetchSettings) -> Self {
        Self {
            client,
            settings,
            progress: Box::new(LogProgress),
        }
    }

    pub fn with_progress(mut self, progress: impl ProgressSink + 'static) -> Self {
        self.progress = Box::new(progress);
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub fn run_batch(&self, tasks: Vec<Task>) -> Batch {
        self.run(tasks, self.settings.method, self.settings.worker_count)
    }

    /// Fetches every task with `worker_count` threads and returns once each
    /// one has succeeded or failed. Individual failures end up in the report,
    /// never as an error.
    ///
    /// Task ids must be unique. Later tasks repeating an id are not fetched
    /// and are listed in `BatchReport::duplicates`.
    pub fn run(&self, tasks: Vec<Task>, method: HttpMethod, worker_count: usize) -> Batch {
        let started_at = Utc::now();
        let started = Instant::now();
        let (tasks, duplicates) = dedupe(tasks);
        let submitted = tasks.len();
        let queue = WorkQueue::seeded(tasks);
        let results = ResultStore::new();
        let occurrences = OccurrenceTable::new();
        let failures = FailureLog::new();
        let workers = worker_count.max(1).min(submitted);

        tracing::info!(tasks = submitted, workers, method = %method, "starting batch");

        thread::scope(|scope| {
            let monitor = self
                .settings
                .monitor_interval
                .filter(|_| submitted > 0)
                .map(|interval| {
                    let queue = &queue;
                    let progress = self.progress.as_ref();
                    scope.spawn(move || watch(queue, interval, started, progress))
                });

            let worker = |index| FetchWorker {
                index,
                method,
                client: &self.client,
                queue: &queue,
                results: &results,
                occurrences: &occurrences,
                failures: &failures,
            };

            let mut handles = Vec::with_capacity(workers);
            for index in 0..workers {
                let worker = worker(index);
                let spawned = thread::Builder::new()
                    .name(format!("fetch-worker-{index}"))
                    .spawn_scoped(scope, move || worker.run());
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        tracing::error!(error = %err, spawned = index, "unable to spawn more workers");
                        break;
                    }
                }
            }

            for (index, handle) in handles.into_iter().enumerate() {
                match handle.join() {
                    Ok(summary) => log_summary(index, summary),
                    Err(_) => tracing::error!(worker = index, "fetch worker panicked"),
                }
            }

            // Workers that panicked or never started leave tasks behind.
            // Each pass claims at least one task, so this ends.
            let mut index = workers;
            while queue.pending() > 0 {
                tracing::warn!(
                    worker = index,
                    pending = queue.pending(),
                    "draining leftover tasks on the calling thread"
                );
                match panic::catch_unwind(AssertUnwindSafe(|| worker(index).run())) {
                    Ok(summary) => log_summary(index, summary),
                    Err(_) => tracing::error!(worker = index, "fetch worker panicked"),
                }
                index += 1;
            }

            queue.await_all_done();

            if let Some(monitor) = monitor {
                if monitor.join().is_err() {
                    tracing::error!("progress monitor panicked");
                }
            }
        });

        let mut failed = failures.into_sorted();
        failed.extend(queue.take_abandoned().into_iter().map(|task| FailedTask {
            id: task.id,
            url: task.url,
            reason: FetchFailure::Panicked,
        }));
        failed.sort_by_key(|task| task.id);

        let report = BatchReport {
            method,
            workers,
            submitted,
            succeeded: results.len(),
            failed,
            duplicates,
            started_at,
            finished_at: Utc::now(),
        };
        tracing::info!(
            submitted,
            succeeded = report.succeeded,
            failed = report.failure_count(),
            duplicates = report.duplicates.len(),
            elapsed = ?started.elapsed(),
            "batch finished"
        );

        Batch {
            results,
            occurrences,
            report,
        }
    }
}

/// Keeps the first task for each id.
fn dedupe(tasks: Vec<Task>) -> (Vec<Task>, Vec<Task>) {
    let mut seen = HashSet::with_capacity(tasks.len());
    let (unique, duplicates): (Vec<Task>, Vec<Task>) =
        tasks.into_iter().partition(|task| seen.insert(task.id));
    for task in &duplicates {
        tracing::warn!(task_id = %task.id, url = %task.url, "duplicate task id, skipping");
    }
    (unique, duplicates)
}

fn log_summary(index: usize, summary: WorkerSummary) {
    tracing::debug!(
        worker = index,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "fetch worker finished"
    );
}

/// Emits a progress event every `interval` until the queue reports all done.
fn watch(queue: &WorkQueue, interval: Duration, started: Instant, progress: &dyn ProgressSink) {
    while !queue.await_all_done_timeout(interval) {
        let remaining = queue.unfinished();
        progress.event(ProgressEvent {
            message: format!("remaining tasks: {remaining}"),
            remaining,
            total: queue.enqueued(),
            elapsed: Some(started.elapsed()),
        });
    }
}
