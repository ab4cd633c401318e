//! Scheduler state: task queue + waiting workers.
//!
//! Design:
//! - Pure state machine; no I/O and no `.await`. The server calls it under a
//!   lock and it hands messages to per-connection outbound channels with
//!   `try_send`, so the lock is never held across a socket write.
//! - Decoded tasks are pinned in the scheduler's own table and released when
//!   the task leaves (dispatched or dropped).
//! - Dispatch order: longest-waiting worker gets the queue head.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::domain::errors::{ConnectionError, SpindleError};
use crate::domain::{TaskId, TaskSpec};
use crate::impls::FifoTaskQueue;
use crate::observability::SchedulerStats;
use crate::pins::PinTable;
use crate::ports::{ObjectStore, TaskQueue};
use crate::wire::Message;

/// Scheduler-local connection number.
pub type ConnId = u64;

struct Waiter {
    conn: ConnId,
    tx: mpsc::Sender<Message>,
}

pub struct Scheduler {
    queue: Box<dyn TaskQueue>,
    waiting: VecDeque<Waiter>,
    pins: Arc<PinTable>,
    stats: SchedulerStats,
}

impl Scheduler {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_queue(store, Box::new(FifoTaskQueue::new()))
    }

    pub fn with_queue(store: Arc<dyn ObjectStore>, queue: Box<dyn TaskQueue>) -> Self {
        Self {
            queue,
            waiting: VecDeque::new(),
            pins: Arc::new(PinTable::new(store)),
            stats: SchedulerStats::default(),
        }
    }

    pub fn pins(&self) -> &Arc<PinTable> {
        &self.pins
    }

    /// Decode a submitted record into the queue.
    ///
    /// On error nothing is queued and no pins are held; the server closes the
    /// submitting connection.
    pub fn submit(&mut self, conn: ConnId, record: &[u8]) -> Result<TaskId, SpindleError> {
        let task = match TaskSpec::from_wire(record, &self.pins) {
            Ok(task) => task,
            Err(e) => {
                self.stats.rejected += 1;
                return Err(e);
            }
        };
        let task_id = task.task_id();
        tracing::debug!(conn, task = %task_id, args = task.num_args(), "task submitted");
        self.stats.submitted += 1;
        self.enqueue(task);
        Ok(task_id)
    }

    /// Enqueue an already-decoded task and hand out what can be handed out.
    pub fn enqueue(&mut self, task: TaskSpec) {
        self.queue.enqueue(task);
        self.dispatch();
    }

    /// Register `conn` as waiting for a task.
    pub fn get_task(&mut self, conn: ConnId, tx: mpsc::Sender<Message>) -> Result<(), ConnectionError> {
        if self.waiting.iter().any(|w| w.conn == conn) {
            return Err(ConnectionError::Protocol(format!(
                "connection {conn} already waiting for a task"
            )));
        }
        self.waiting.push_back(Waiter { conn, tx });
        tracing::debug!(conn, waiting = self.waiting.len(), "worker waiting");
        self.dispatch();
        Ok(())
    }

    pub fn task_done(&mut self, conn: ConnId, task_id: TaskId) {
        tracing::debug!(conn, task = %task_id, "task done");
        self.stats.completed += 1;
    }

    /// Forget everything tied to a closed connection.
    pub fn disconnect(&mut self, conn: ConnId) {
        self.waiting.retain(|w| w.conn != conn);
    }

    /// Next queued task, bypassing waiting workers.
    pub fn dequeue_next(&mut self) -> Option<TaskSpec> {
        self.queue.dequeue_next()
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            queued: self.queue.len(),
            waiting_workers: self.waiting.len(),
            pinned: self.pins.total(),
            ..self.stats.clone()
        }
    }

    fn dispatch(&mut self) {
        while !self.waiting.is_empty() {
            let Some(task) = self.queue.dequeue_next() else {
                return;
            };
            let Some(waiter) = self.waiting.pop_front() else {
                self.queue.requeue(task);
                return;
            };

            let msg = Message::ExecuteTask(task.to_wire());
            match waiter.tx.try_send(msg) {
                Ok(()) => {
                    tracing::debug!(conn = waiter.conn, task = %task.task_id(), "task dispatched");
                    self.stats.dispatched += 1;
                    // `task` drops here and releases the scheduler's pins
                }
                Err(e) => {
                    tracing::warn!(conn = waiter.conn, task = %task.task_id(), error = %e, "hand-off failed, requeueing");
                    self.queue.requeue(task);
                }
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::PinError;
    use crate::domain::{FunctionId, ObjectId, TaskArg};
    use crate::impls::InMemoryObjectStore;
    use crate::ports::{SystemClock, UlidGenerator};

    fn oid(b: u8) -> ObjectId {
        ObjectId::from_bytes([b; 20])
    }

    struct Env {
        store: Arc<InMemoryObjectStore>,
        client_pins: Arc<PinTable>,
        ids: UlidGenerator<SystemClock>,
        sched: Scheduler,
    }

    fn env() -> Env {
        let store = Arc::new(InMemoryObjectStore::with_objects([oid(1), oid(2)]));
        Env {
            client_pins: Arc::new(PinTable::new(store.clone())),
            sched: Scheduler::new(store.clone()),
            store,
            ids: UlidGenerator::new(SystemClock),
        }
    }

    fn record(env: &Env, args: Vec<TaskArg>) -> (TaskSpec, bytes::Bytes) {
        let task = TaskSpec::build(FunctionId::from_bytes([b'a'; 20]), args, 2, &env.client_pins, &env.ids)
            .unwrap();
        let bytes = task.to_wire();
        (task, bytes)
    }

    fn executed(msg: Option<Message>, pins: &Arc<PinTable>) -> TaskSpec {
        match msg {
            Some(Message::ExecuteTask(b)) => TaskSpec::from_wire(&b, pins).unwrap(),
            other => panic!("expected ExecuteTask, got {other:?}"),
        }
    }

    #[test]
    fn submit_without_worker_queues_and_pins() {
        let mut env = env();
        let (_task, bytes) = record(&env, vec![oid(1).into(), "x".into(), oid(2).into()]);
        env.sched.submit(1, &bytes).unwrap();

        let stats = env.sched.stats();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.submitted, 1);
        assert_eq!(stats.pinned, 2);
    }

    #[test]
    fn waiting_worker_gets_task_on_submit() {
        let mut env = env();
        let (tx, mut rx) = mpsc::channel(4);
        env.sched.get_task(7, tx).unwrap();
        assert_eq!(env.sched.stats().waiting_workers, 1);

        let (task, bytes) = record(&env, vec![oid(1).into(), "x".into()]);
        env.sched.submit(1, &bytes).unwrap();

        let got = executed(rx.try_recv().ok(), &env.client_pins);
        assert_eq!(got, task);
        let stats = env.sched.stats();
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.waiting_workers, 0);
        assert_eq!(stats.dispatched, 1);
        // scheduler copy released after hand-off
        assert_eq!(stats.pinned, 0);
    }

    #[test]
    fn get_task_with_queued_work_dispatches_immediately() {
        let mut env = env();
        let (a, a_bytes) = record(&env, vec!["a".into()]);
        let (b, b_bytes) = record(&env, vec!["b".into()]);
        env.sched.submit(1, &a_bytes).unwrap();
        env.sched.submit(1, &b_bytes).unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        env.sched.get_task(2, tx.clone()).unwrap();
        assert_eq!(executed(rx.try_recv().ok(), &env.client_pins), a);
        assert!(rx.try_recv().is_err());

        env.sched.get_task(2, tx).unwrap();
        assert_eq!(executed(rx.try_recv().ok(), &env.client_pins), b);
        assert_eq!(env.sched.stats().queued, 0);
    }

    #[test]
    fn one_task_goes_to_exactly_one_worker() {
        let mut env = env();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        env.sched.get_task(1, tx1).unwrap();
        env.sched.get_task(2, tx2).unwrap();

        let (_task, bytes) = record(&env, vec![]);
        env.sched.submit(3, &bytes).unwrap();

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());
        assert_eq!(env.sched.stats().waiting_workers, 1);
    }

    #[test]
    fn double_wait_is_a_protocol_error() {
        let mut env = env();
        let (tx, _rx) = mpsc::channel(4);
        env.sched.get_task(1, tx.clone()).unwrap();
        assert!(matches!(
            env.sched.get_task(1, tx),
            Err(ConnectionError::Protocol(_))
        ));
    }

    #[test]
    fn dead_worker_does_not_lose_the_task() {
        let mut env = env();
        let (dead_tx, dead_rx) = mpsc::channel(4);
        drop(dead_rx);
        let (tx, mut rx) = mpsc::channel(4);
        env.sched.get_task(1, dead_tx).unwrap();
        env.sched.get_task(2, tx).unwrap();

        let (task, bytes) = record(&env, vec![oid(2).into()]);
        env.sched.submit(3, &bytes).unwrap();
        assert_eq!(executed(rx.try_recv().ok(), &env.client_pins), task);
    }

    #[test]
    fn disconnect_removes_waiter() {
        let mut env = env();
        let (tx, _rx) = mpsc::channel(4);
        env.sched.get_task(5, tx).unwrap();
        env.sched.disconnect(5);
        assert_eq!(env.sched.stats().waiting_workers, 0);

        let (_task, bytes) = record(&env, vec![]);
        env.sched.submit(1, &bytes).unwrap();
        assert_eq!(env.sched.stats().queued, 1);
    }

    #[test]
    fn corrupt_record_is_rejected_without_pins() {
        let mut env = env();
        let (_task, bytes) = record(&env, vec![oid(1).into()]);
        let err = env.sched.submit(1, &bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, SpindleError::Decode(_)));
        let stats = env.sched.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.pinned, 0);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn unknown_object_is_rejected_without_pins() {
        let env = env();
        // scheduler side only knows oid(1)
        let mut sched = Scheduler::new(Arc::new(InMemoryObjectStore::with_objects([oid(1)])));
        let (_task, bytes) = record(&env, vec![oid(1).into(), oid(2).into()]);

        let err = sched.submit(1, &bytes).unwrap_err();
        assert!(matches!(
            err,
            SpindleError::PinAcquisition(PinError::MissingObject(id)) if id == oid(2)
        ));
        let stats = sched.stats();
        assert_eq!(stats.rejected, 1);
        assert_eq!(stats.submitted, 0);
        assert_eq!(stats.pinned, 0);
        assert_eq!(stats.queued, 0);
    }

    #[test]
    fn dequeue_next_releases_pins_on_drop() {
        let mut env = env();
        let (_task, bytes) = record(&env, vec![oid(1).into(), oid(1).into()]);
        env.sched.submit(1, &bytes).unwrap();
        assert_eq!(env.sched.pins().count(&oid(1)), 2);

        let task = env.sched.dequeue_next().unwrap();
        assert_eq!(task.pinned(), 2);
        drop(task);
        assert_eq!(env.sched.pins().total(), 0);
        // client copy still holds its own
        assert_eq!(env.store.pin_count(&oid(1)), 1);
    }

    #[test]
    fn task_done_is_counted() {
        let mut env = env();
        env.sched.task_done(1, TaskId::nil());
        assert_eq!(env.sched.stats().completed, 1);
    }
}
