//! Ports - 抽象化レイヤー
//!
//! 外部の協調者（時刻、nonce、オブジェクトストア、scheduler のキュー）への
//! インターフェース。実装は `impls` にあります。

pub mod clock;
pub mod id_generator;
pub mod object_store;
pub mod task_queue;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::object_store::ObjectStore;
pub use self::task_queue::TaskQueue;
