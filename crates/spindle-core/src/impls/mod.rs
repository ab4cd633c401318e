//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryObjectStore**: 開発用のオブジェクトストア
//! - **FifoTaskQueue**: scheduler のデフォルトキュー（到着順）

pub mod fifo_queue;
pub mod inmem_store;

pub use self::fifo_queue::FifoTaskQueue;
pub use self::inmem_store::InMemoryObjectStore;
