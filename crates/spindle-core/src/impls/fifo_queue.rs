//! FifoTaskQueue - 到着順のタスクキュー

use std::collections::VecDeque;

use crate::domain::TaskSpec;
use crate::ports::TaskQueue;

#[derive(Debug, Default)]
pub struct FifoTaskQueue {
    tasks: VecDeque<TaskSpec>,
}

impl FifoTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskQueue for FifoTaskQueue {
    fn enqueue(&mut self, task: TaskSpec) {
        self.tasks.push_back(task);
    }

    fn dequeue_next(&mut self) -> Option<TaskSpec> {
        self.tasks.pop_front()
    }

    fn requeue(&mut self, task: TaskSpec) {
        self.tasks.push_front(task);
    }

    fn len(&self) -> usize {
        self.tasks.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::FunctionId;
    use crate::testing::unpinned_task;

    #[test]
    fn dequeues_in_arrival_order() {
        let mut q = FifoTaskQueue::new();
        let a = unpinned_task(FunctionId::from_bytes([1; 20]), vec![], 1);
        let b = unpinned_task(FunctionId::from_bytes([2; 20]), vec![], 1);
        let (a_id, b_id) = (a.task_id(), b.task_id());

        q.enqueue(a);
        q.enqueue(b);
        assert_eq!(q.len(), 2);
        assert_eq!(q.dequeue_next().map(|t| t.task_id()), Some(a_id));
        assert_eq!(q.dequeue_next().map(|t| t.task_id()), Some(b_id));
        assert!(q.dequeue_next().is_none());
        assert!(q.is_empty());
    }

    #[test]
    fn requeue_goes_to_the_front() {
        let mut q = FifoTaskQueue::new();
        let a = unpinned_task(FunctionId::from_bytes([1; 20]), vec![], 0);
        let b = unpinned_task(FunctionId::from_bytes([2; 20]), vec![], 0);
        let b_id = b.task_id();
        q.enqueue(a);
        q.requeue(b);
        assert_eq!(q.dequeue_next().map(|t| t.task_id()), Some(b_id));
    }
}
