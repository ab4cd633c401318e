//! Client connector.
//!
//! A `Connection` owns one Unix stream to the scheduler plus the pin table
//! for every task built or received through it. Calls take `&mut self`, so
//! there is never more than one outstanding call per connection; use one
//! connection per concurrent caller.
//!
//! `get_task` is the only call that can wait indefinitely. A `CloseHandle`
//! taken before the call can cancel it from another task. Closing shuts the
//! stream down, so the scheduler forgets this connection as a waiting worker.
//! A task the scheduler handed over at the same instant is not redelivered.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tokio::sync::watch;

use crate::domain::errors::{ConnectionError, PinError, SpindleError};
use crate::domain::{FunctionId, TaskArg, TaskId, TaskSpec};
use crate::pins::PinTable;
use crate::ports::{IdGenerator, ObjectStore, SystemClock, UlidGenerator};
use crate::wire::{DEFAULT_MAX_FRAME_SIZE, Message, recv_message, send_message};

/// Cancels the owning connection from elsewhere.
#[derive(Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Close the connection. A pending `get_task` shuts the stream down and
    /// fails with `ConnectionError::Closed`; every later call does the same.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

pub struct Connection {
    path: PathBuf,
    stream: UnixStream,
    pins: Arc<PinTable>,
    ids: Arc<dyn IdGenerator>,
    max_frame_size: usize,
    close_tx: Arc<watch::Sender<bool>>,
    close_rx: watch::Receiver<bool>,
    /// GetTask sent, ExecuteTask not yet read.
    awaiting_task: bool,
    stream_shut: bool,
}

impl Connection {
    /// Connect to the scheduler listening on `path`.
    pub async fn connect(
        path: impl AsRef<Path>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ConnectionError> {
        let path = path.as_ref().to_path_buf();
        tracing::debug!(path = %path.display(), "connecting to scheduler");
        let stream = UnixStream::connect(&path)
            .await
            .map_err(|source| ConnectionError::Connect {
                path: path.clone(),
                source,
            })?;
        tracing::info!(path = %path.display(), "connected to scheduler");

        let (close_tx, close_rx) = watch::channel(false);
        Ok(Self {
            path,
            stream,
            pins: Arc::new(PinTable::new(store)),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            close_tx: Arc::new(close_tx),
            close_rx,
            awaiting_task: false,
            stream_shut: false,
        })
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// This connection's pin table.
    pub fn pins(&self) -> &Arc<PinTable> {
        &self.pins
    }

    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            tx: Arc::clone(&self.close_tx),
        }
    }

    fn is_closed(&self) -> bool {
        *self.close_rx.borrow()
    }

    async fn ensure_open(&mut self) -> Result<(), ConnectionError> {
        if self.is_closed() {
            self.shut_down().await;
            return Err(ConnectionError::Closed);
        }
        Ok(())
    }

    fn mark_closed(&self) {
        self.close_tx.send_replace(true);
    }

    /// Mark closed and end our side of the stream; the scheduler reads EOF.
    async fn close_stream(&mut self) {
        self.mark_closed();
        self.shut_down().await;
    }

    async fn shut_down(&mut self) {
        if self.stream_shut {
            return;
        }
        self.stream_shut = true;
        if let Err(e) = self.stream.shutdown().await {
            tracing::debug!(path = %self.path.display(), error = %e, "stream shutdown failed");
        }
    }

    /// Build a task whose references are pinned in this connection's table.
    pub fn build_task(
        &self,
        function_id: FunctionId,
        args: Vec<TaskArg>,
        num_returns: u32,
    ) -> Result<TaskSpec, PinError> {
        TaskSpec::build(function_id, args, num_returns, &self.pins, self.ids.as_ref())
    }

    /// Write `task` to the scheduler.
    ///
    /// Returns once the frame is written; there is no acknowledgement. The
    /// caller keeps `task` (and its pins); the scheduler pins its own copy.
    pub async fn submit(&mut self, task: &TaskSpec) -> Result<(), ConnectionError> {
        self.ensure_open().await?;
        let msg = Message::SubmitTask(task.to_wire());
        tracing::debug!(task = %task.task_id(), args = task.num_args(), "submitting task");
        self.send(&msg).await
    }

    /// Ask for the next task and wait until the scheduler hands one over.
    ///
    /// If this future is dropped before it completes, the request stays
    /// registered with the scheduler and the next `get_task` waits for its
    /// reply instead of asking again.
    pub async fn get_task(&mut self) -> Result<TaskSpec, SpindleError> {
        self.ensure_open().await?;
        if !self.awaiting_task {
            self.send(&Message::GetTask).await?;
            self.awaiting_task = true;
        }

        let max = self.max_frame_size;
        let close_rx = &mut self.close_rx;
        let received = tokio::select! {
            msg = recv_message(&mut self.stream, max) => Some(msg),
            _ = async move { let _ = close_rx.wait_for(|closed| *closed).await; } => None,
        };
        let Some(msg) = received else {
            tracing::debug!(path = %self.path.display(), "get_task cancelled by close");
            self.shut_down().await;
            return Err(ConnectionError::Closed.into());
        };

        let bytes = match msg {
            Ok(Some(Message::ExecuteTask(bytes))) => {
                self.awaiting_task = false;
                bytes
            }
            Ok(Some(other)) => {
                self.close_stream().await;
                return Err(ConnectionError::Protocol(format!(
                    "expected ExecuteTask, got {:?}",
                    other.kind()
                ))
                .into());
            }
            Ok(None) => {
                self.close_stream().await;
                return Err(ConnectionError::Closed.into());
            }
            Err(e) => {
                // no resync after a bad frame
                self.close_stream().await;
                return Err(e);
            }
        };

        let task = match TaskSpec::from_wire(&bytes, &self.pins) {
            Ok(task) => task,
            Err(e @ SpindleError::Decode(_)) => {
                self.close_stream().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(task = %task.task_id(), "received task");
        Ok(task)
    }

    /// Tell the scheduler a task finished.
    pub async fn task_done(&mut self, task_id: TaskId) -> Result<(), ConnectionError> {
        self.ensure_open().await?;
        self.send(&Message::TaskDone(task_id)).await
    }

    /// Say goodbye and close the stream.
    pub async fn disconnect(mut self) -> Result<(), ConnectionError> {
        if !self.is_closed() {
            self.send(&Message::Disconnect).await?;
            self.mark_closed();
        }
        self.shut_down().await;
        Ok(())
    }

    async fn send(&mut self, msg: &Message) -> Result<(), ConnectionError> {
        let res = send_message(&mut self.stream, msg, self.max_frame_size).await;
        if let Err(ConnectionError::Io(e)) = &res {
            tracing::warn!(path = %self.path.display(), error = %e, "write to scheduler failed");
            self.mark_closed();
        }
        res
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("path", &self.path)
            .field("closed", &self.is_closed())
            .field("pins", &self.pins)
            .finish()
    }
}
