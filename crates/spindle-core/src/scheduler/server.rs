//! Scheduler endpoint.
//!
//! One listener, one handler per accepted connection. Each handler runs a
//! read loop (client -> `Scheduler`) next to a write loop fed by an mpsc
//! channel (`Scheduler` -> client); the scheduler only ever holds senders.
//!
//! A rejected submission (bad record or unpinnable reference) closes the
//! connection that sent it.

use std::future::Future;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::Arc;

use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

use crate::config::SchedulerConfig;
use crate::domain::errors::{ConnectionError, SpindleError};
use crate::observability::SchedulerStats;
use crate::ports::{ObjectStore, TaskQueue};
use crate::scheduler::state::{ConnId, Scheduler};
use crate::wire::{Message, recv_message, send_message};

/// Shared view of a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    inner: Arc<Mutex<Scheduler>>,
}

impl SchedulerHandle {
    pub async fn stats(&self) -> SchedulerStats {
        self.inner.lock().await.stats()
    }
}

pub struct SchedulerServer {
    config: Arc<SchedulerConfig>,
    listener: UnixListener,
    scheduler: Arc<Mutex<Scheduler>>,
}

impl SchedulerServer {
    /// Bind `config.socket_path`. A stale socket file left by an earlier run
    /// is removed first.
    pub fn bind(config: SchedulerConfig, store: Arc<dyn ObjectStore>) -> Result<Self, SpindleError> {
        let scheduler = Scheduler::new(store);
        Self::bind_with(config, scheduler)
    }

    pub fn bind_with_queue(
        config: SchedulerConfig,
        store: Arc<dyn ObjectStore>,
        queue: Box<dyn TaskQueue>,
    ) -> Result<Self, SpindleError> {
        Self::bind_with(config, Scheduler::with_queue(store, queue))
    }

    fn bind_with(config: SchedulerConfig, scheduler: Scheduler) -> Result<Self, SpindleError> {
        config.validate()?;
        let path = config.socket_path.clone();
        remove_stale_socket(&path)?;

        let listener = UnixListener::bind(&path).map_err(|source| ConnectionError::Bind {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "scheduler listening");

        Ok(Self {
            config: Arc::new(config),
            listener,
            scheduler: Arc::new(Mutex::new(scheduler)),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.config.socket_path
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle {
            inner: Arc::clone(&self.scheduler),
        }
    }

    /// Accept connections until `shutdown` resolves, then drop every
    /// connection and remove the socket file.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), SpindleError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut next_conn: ConnId = 0;
        let mut conns = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("scheduler shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        next_conn += 1;
                        tracing::info!(conn = next_conn, "client connected");
                        conns.spawn(handle_connection(
                            next_conn,
                            stream,
                            Arc::clone(&self.scheduler),
                            Arc::clone(&self.config),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
                Some(_) = conns.join_next(), if !conns.is_empty() => {}
            }
        }

        conns.shutdown().await;
        drop(self.listener);
        if let Err(e) = std::fs::remove_file(&self.config.socket_path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.config.socket_path.display(), error = %e, "failed to remove socket");
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for SchedulerServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn remove_stale_socket(path: &Path) -> Result<(), ConnectionError> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed stale socket");
            Ok(())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ConnectionError::Bind {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn handle_connection(
    conn: ConnId,
    stream: UnixStream,
    scheduler: Arc<Mutex<Scheduler>>,
    config: Arc<SchedulerConfig>,
) {
    let (read_half, write_half) = stream.into_split();
    let (tx, rx) = mpsc::channel::<Message>(config.outbound_capacity);
    let max = config.max_frame_size;

    tokio::select! {
        _ = read_loop(conn, read_half, &scheduler, &tx, max) => {}
        _ = write_loop(conn, write_half, rx, max) => {}
    }

    scheduler.lock().await.disconnect(conn);
    tracing::info!(conn, "connection closed");
}

async fn read_loop(
    conn: ConnId,
    mut reader: OwnedReadHalf,
    scheduler: &Mutex<Scheduler>,
    tx: &mpsc::Sender<Message>,
    max: usize,
) {
    loop {
        let msg = match recv_message(&mut reader, max).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tracing::debug!(conn, "client closed connection");
                return;
            }
            Err(e) if e.is_closed() => {
                tracing::debug!(conn, "client connection reset");
                return;
            }
            Err(e) => {
                tracing::warn!(conn, error = %e, "bad frame from client, closing");
                return;
            }
        };

        let mut sched = scheduler.lock().await;
        match msg {
            Message::SubmitTask(record) => {
                // submit has no reply, so the close is what the client sees
                if let Err(e) = sched.submit(conn, &record) {
                    tracing::warn!(conn, error = %e, "task rejected, closing");
                    return;
                }
            }
            Message::GetTask => {
                if let Err(e) = sched.get_task(conn, tx.clone()) {
                    tracing::warn!(conn, error = %e, "protocol violation, closing");
                    return;
                }
            }
            Message::TaskDone(task_id) => sched.task_done(conn, task_id),
            Message::Disconnect => {
                tracing::debug!(conn, "client disconnected");
                return;
            }
            Message::ExecuteTask(_) => {
                tracing::warn!(conn, "client sent ExecuteTask, closing");
                return;
            }
        }
    }
}

async fn write_loop(
    conn: ConnId,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Message>,
    max: usize,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = send_message(&mut writer, &msg, max).await {
            match &e {
                ConnectionError::Io(io) if io.kind() == ErrorKind::BrokenPipe => {
                    tracing::debug!(conn, "client went away");
                }
                _ => tracing::warn!(conn, error = %e, "write to client failed"),
            }
            return;
        }
    }
}
