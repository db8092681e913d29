//! Bounded pool of blocking workers running tile tasks.

use super::task::{self, PartialTileResult, TileTask};
use crate::compositing::Toolbox;
use futures::stream::{self, StreamExt};
use indicatif::ProgressBar;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::{debug, error, warn};

/// Number of workers for `jobs` tasks.
///
/// Bounded by the configured maximum, the job count and the core count. One
/// core is left free when the pool would otherwise take all of them.
pub fn pool_size(max_workers: Option<usize>, jobs: usize, cores: usize) -> usize {
    let mut size = jobs;
    if let Some(max) = max_workers {
        size = size.min(max);
    }
    size = size.min(cores);
    if size == cores && cores > 1 {
        size -= 1;
    }
    size.max(1)
}

/// Run `work` on every item using at most `workers` blocking threads.
///
/// Results come back in item order. A panicking item yields its `JoinError`
/// without disturbing the others.
pub(crate) async fn run_blocking<T, R, F>(
    items: Vec<T>,
    workers: usize,
    work: F,
) -> Vec<Result<R, JoinError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let mut results: Vec<(usize, Result<R, JoinError>)> = stream::iter(items.into_iter().enumerate())
        .map(|(idx, item)| {
            let work = Arc::clone(&work);
            async move {
                let result = tokio::task::spawn_blocking(move || work(item)).await;
                (idx, result)
            }
        })
        .buffer_unordered(workers.max(1))
        .collect()
        .await;
    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Results of one batch of tile tasks
#[derive(Debug, Default)]
pub struct TileBatch {
    /// One result per task, in task order
    pub results: Vec<PartialTileResult>,
    /// Tasks whose worker failed or panicked
    pub failed: usize,
    pub workers: usize,
}

impl TileBatch {
    pub fn rendered(&self) -> usize {
        self.results.iter().filter(|r| r.path().is_some()).count()
    }
}

/// Runs tile tasks on a bounded set of blocking workers
pub struct TileWorkerPool {
    toolbox: Arc<Toolbox>,
    max_workers: Option<usize>,
    cores: usize,
    progress: Option<ProgressBar>,
}

impl TileWorkerPool {
    pub fn new(toolbox: Arc<Toolbox>) -> Self {
        Self {
            toolbox,
            max_workers: None,
            cores: num_cpus::get(),
            progress: None,
        }
    }

    pub fn with_max_workers(mut self, max_workers: Option<usize>) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    /// Advance `progress` by one per finished tile
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn size_for(&self, jobs: usize) -> usize {
        pool_size(self.max_workers, jobs, self.cores)
    }

    /// Run every task and wait for all of them
    pub async fn run(&self, tasks: Vec<TileTask>) -> TileBatch {
        let workers = self.size_for(tasks.len());
        debug!("Running {} tile tasks on {} workers", tasks.len(), workers);

        let mut ids = Vec::with_capacity(tasks.len());
        let mut payloads = Vec::with_capacity(tasks.len());
        for task in &tasks {
            ids.push(task.tile_id().to_string());
            payloads.push(task.encode());
        }

        let toolbox = Arc::clone(&self.toolbox);
        let progress = self.progress.clone();
        let outcomes = run_blocking(payloads, workers, move |payload| {
            let result = payload.and_then(|payload| task::execute(&toolbox, &payload));
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            result
        })
        .await;

        let mut batch = TileBatch {
            results: Vec::with_capacity(ids.len()),
            failed: 0,
            workers,
        };
        for (tile_id, outcome) in ids.into_iter().zip(outcomes) {
            let result = match outcome {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => {
                    warn!("Tile {} failed, leaving it out of the composite: {}", tile_id, e);
                    batch.failed += 1;
                    PartialTileResult::Empty { tile_id }
                }
                Err(e) => {
                    error!("Worker for tile {} did not complete: {}", tile_id, e);
                    batch.failed += 1;
                    PartialTileResult::Empty { tile_id }
                }
            };
            batch.results.push(result);
        }
        batch
    }
}
