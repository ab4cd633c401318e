use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::client::Connection;
use crate::domain::{ConnectionError, SpindleError};
use crate::ports::ObjectStore;
use crate::runtime::Runtime;

/// Worker group handle.
/// - 各ワーカーは自分専用の `Connection` を持つ（1 接続 1 呼び出し）
/// - `shutdown_and_join()` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Open `n` connections to the scheduler at `path` and start a worker on
    /// each. Fails without starting anything if any connection fails.
    pub async fn connect(
        n: usize,
        path: impl AsRef<Path>,
        store: Arc<dyn ObjectStore>,
        runtime: Arc<Runtime>,
    ) -> Result<Self, ConnectionError> {
        let mut conns = Vec::with_capacity(n);
        for _ in 0..n {
            conns.push(Connection::connect(path.as_ref(), Arc::clone(&store)).await?);
        }
        Ok(Self::spawn(conns, runtime))
    }

    /// Start one worker per connection.
    pub fn spawn(conns: Vec<Connection>, runtime: Arc<Runtime>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(conns.len());
        for (worker_id, conn) in conns.into_iter().enumerate() {
            let rt = Arc::clone(&runtime);
            let rx = shutdown_rx.clone();
            joins.push(tokio::spawn(worker_loop(worker_id, conn, rt, rx)));
        }

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// A running handler finishes first; only waiting workers stop at once.
    pub fn request_shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    mut conn: Connection,
    runtime: Arc<Runtime>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // get_task は無期限に待つので shutdown と競合させる
        let received = tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            received = conn.get_task() => received,
        };

        let task = match received {
            Ok(task) => task,
            Err(SpindleError::PinAcquisition(e)) => {
                tracing::warn!(worker = worker_id, error = %e, "received task could not be pinned");
                continue;
            }
            Err(e) if e.is_closed() => {
                tracing::info!(worker = worker_id, "scheduler connection closed");
                return;
            }
            Err(e) => {
                tracing::warn!(worker = worker_id, error = %e, "get_task failed");
                return;
            }
        };

        let task_id = task.task_id();
        match runtime.execute(&task).await {
            Ok(()) => tracing::debug!(worker = worker_id, task = %task_id, "task finished"),
            Err(e) => tracing::warn!(worker = worker_id, task = %task_id, error = %e, "task failed"),
        }
        // pins are released before the scheduler hears about it
        drop(task);

        if let Err(e) = conn.task_done(task_id).await {
            tracing::warn!(worker = worker_id, task = %task_id, error = %e, "task_done failed");
            return;
        }
    }

    if let Err(e) = conn.disconnect().await {
        tracing::debug!(worker = worker_id, error = %e, "disconnect failed");
    }
}
