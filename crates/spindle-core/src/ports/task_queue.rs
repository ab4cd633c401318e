//! TaskQueue port - scheduler 側のタスクキュー
//!
//! キューに入るのは decode 済みの `TaskSpec`（scheduler の PinTable で pin 済み）。
//! どれを次に出すかは実装の自由（配置ポリシーは scope 外）。

use crate::domain::TaskSpec;

pub trait TaskQueue: Send {
    fn enqueue(&mut self, task: TaskSpec);

    fn dequeue_next(&mut self) -> Option<TaskSpec>;

    /// Put back a task whose hand-off failed, ahead of everything else.
    fn requeue(&mut self, task: TaskSpec);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
