use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::adapter::{EngineAdapter, SearchOutcome};
use crate::error::EngineError;

pub const DEFAULT_WORKERS: usize = 2;
pub const QUEUE_CAPACITY: usize = 100;
const DEFAULT_SEARCH_MS: u64 = 1000;
const RESULT_DEADLINE: Duration = Duration::from_secs(5);

/// A single search request served by a pool worker.
pub struct EngineTask {
    pub fen: String,
    pub skill_level: Option<u8>,
    pub search_time_ms: Option<u64>,
    /// Single-slot result sink. If the receiver is gone by the time the
    /// worker finishes, the result is dropped silently.
    pub result: oneshot::Sender<Result<SearchOutcome, EngineError>>,
}

/// Fixed-size worker set, each owning a private [`EngineAdapter`], fed by
/// a bounded task channel. Search is CPU-heavy and blocking inside the
/// subprocess; the pool gives concurrent games parallelism while capping
/// the subprocess count.
pub struct EnginePool {
    tx: StdMutex<Option<mpsc::Sender<EngineTask>>>,
    workers: StdMutex<Vec<JoinHandle<()>>>,
}

impl EnginePool {
    /// Spawn `workers` engine subprocesses and start their worker loops.
    /// Any spawn failure aborts construction.
    pub async fn start(
        path: impl AsRef<Path>,
        workers: usize,
        queue_capacity: usize,
    ) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let mut adapters = Vec::with_capacity(workers);
        for _ in 0..workers {
            adapters.push(EngineAdapter::spawn(path).await?);
        }

        let (tx, rx) = mpsc::channel::<EngineTask>(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let handles = adapters
            .into_iter()
            .enumerate()
            .map(|(id, adapter)| tokio::spawn(run_worker(id, adapter, Arc::clone(&rx))))
            .collect();

        Ok(EnginePool {
            tx: StdMutex::new(Some(tx)),
            workers: StdMutex::new(handles),
        })
    }

    /// Non-blocking submission. Returns [`EngineError::QueueFull`] when
    /// the channel is saturated and [`EngineError::ShuttingDown`] once
    /// [`shutdown`](Self::shutdown) has closed it.
    pub fn submit(&self, task: EngineTask) -> Result<(), EngineError> {
        let guard = self.tx.lock().expect("pool sender lock");
        let tx = guard.as_ref().ok_or(EngineError::ShuttingDown)?;
        tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EngineError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => EngineError::ShuttingDown,
        })
    }

    /// Submit with a 5s total deadline watchdog. The callback always runs
    /// exactly once: with the engine's result, or with a synthesized
    /// timeout error when the deadline expires first.
    pub fn submit_with_deadline<F>(
        &self,
        fen: String,
        skill_level: Option<u8>,
        search_time_ms: Option<u64>,
        callback: F,
    ) -> Result<(), EngineError>
    where
        F: FnOnce(Result<SearchOutcome, EngineError>) + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(EngineTask {
            fen,
            skill_level,
            search_time_ms,
            result: tx,
        })?;
        tokio::spawn(async move {
            let result = match timeout(RESULT_DEADLINE, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(EngineError::ShuttingDown),
                Err(_) => Err(EngineError::Timeout("pool result")),
            };
            callback(result);
        });
        Ok(())
    }

    /// Stop accepting tasks, close the channel, and wait for workers to
    /// drain and close their adapters within `deadline`.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), EngineError> {
        self.tx.lock().expect("pool sender lock").take();
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock().expect("pool worker lock"));
        let drain = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        timeout(deadline, drain)
            .await
            .map_err(|_| EngineError::ShutdownTimeout)
    }
}

async fn run_worker(
    id: usize,
    mut adapter: EngineAdapter,
    rx: Arc<Mutex<mpsc::Receiver<EngineTask>>>,
) {
    loop {
        // The receiver lock is held only while idle-waiting; it is
        // released before the search runs, so workers execute in parallel.
        let task = { rx.lock().await.recv().await };
        let Some(task) = task else { break };

        let result = serve(&mut adapter, &task).await;
        let failed = result.is_err();
        if task.result.send(result).is_err() {
            tracing::debug!(worker = id, "caller gave up, dropping search result");
        }

        // A failed request leaves the adapter in an unknown protocol
        // state; replace the subprocess before taking the next task.
        if failed {
            tracing::warn!(worker = id, "engine request failed, respawning adapter");
            let path = adapter.path().to_path_buf();
            adapter.close().await;
            match EngineAdapter::spawn(&path).await {
                Ok(fresh) => adapter = fresh,
                Err(e) => {
                    tracing::error!(worker = id, error = %e, "respawn failed, worker exiting");
                    return;
                }
            }
        }
    }
    adapter.close().await;
    tracing::debug!(worker = id, "engine worker stopped");
}

async fn serve(
    adapter: &mut EngineAdapter,
    task: &EngineTask,
) -> Result<SearchOutcome, EngineError> {
    if let Some(level) = task.skill_level {
        adapter.set_skill_level(level).await?;
    }
    adapter.set_position(Some(&task.fen), &[]).await?;
    adapter
        .search(task.search_time_ms.unwrap_or(DEFAULT_SEARCH_MS))
        .await
}
