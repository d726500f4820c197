use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::app::RunContext;
use crate::fetcher::{FetchResult, PageFetcher};

pub const DEFAULT_WORKERS: usize = 10;

/// Success/failure tally for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Bounded fetch scheduler: a fixed pool of worker tasks drains the URL
/// queue, so at most `workers` fetches are in flight at any moment.
///
/// Results travel over a channel and are handed to the caller's callback
/// in completion order, on the consumer side, so extraction stays
/// single-threaded. A failed fetch is delivered with its error set and
/// never aborts the batch. Cancellation is checked before each new fetch
/// starts; fetches already in flight finish and are still delivered.
///
/// With `workers == 1` the single worker pops, fetches and delivers one
/// URL at a time, which makes the degenerate case strictly sequential in
/// input order with per-item results identical to the concurrent path.
pub struct FetchScheduler {
    workers: usize,
}

impl FetchScheduler {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub async fn run<F>(
        &self,
        urls: Vec<String>,
        fetcher: Arc<dyn PageFetcher>,
        ctx: &RunContext,
        mut on_result: F,
    ) -> BatchSummary
    where
        F: FnMut(FetchResult),
    {
        let queue = Arc::new(Mutex::new(VecDeque::from(urls)));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for _ in 0..self.workers {
            let queue = queue.clone();
            let fetcher = fetcher.clone();
            let ctx = ctx.clone();
            let tx = tx.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if ctx.is_cancelled() {
                        break;
                    }
                    let url = queue.lock().await.pop_front();
                    let Some(url) = url else { break };

                    let result = match fetcher.fetch(&url).await {
                        Ok(body) => FetchResult::ok(url, body),
                        Err(err) => FetchResult::failed(url, err),
                    };
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(tx);

        let mut summary = BatchSummary::default();
        while let Some(result) = rx.recv().await {
            if result.is_ok() {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
            on_result(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!("Fetch worker task failed: {}", e);
            }
        }

        summary
    }
}

/// The same bounded worker-pool shape generalized to a CPU-bound mapping
/// step (snapshot parsing). Items are mapped on blocking worker threads;
/// results reach `on_result` in completion order on the caller's task.
pub async fn map_bounded<T, R, F, C>(
    items: Vec<T>,
    workers: usize,
    ctx: &RunContext,
    map: F,
    mut on_result: C,
) where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
    C: FnMut(R),
{
    let workers = workers.max(1);
    let queue = Arc::new(std::sync::Mutex::new(VecDeque::from(items)));
    let map = Arc::new(map);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let mut handles = Vec::new();
    for _ in 0..workers {
        let queue = queue.clone();
        let map = map.clone();
        let ctx = ctx.clone();
        let tx = tx.clone();

        handles.push(tokio::task::spawn_blocking(move || loop {
            if ctx.is_cancelled() {
                break;
            }
            let item = queue.lock().expect("parse queue lock poisoned").pop_front();
            let Some(item) = item else { break };

            if tx.send(map(item)).is_err() {
                break;
            }
        }));
    }
    drop(tx);

    while let Some(result) = rx.recv().await {
        on_result(result);
    }

    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!("Parse worker thread failed: {}", e);
        }
    }
}
