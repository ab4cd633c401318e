//! Scheduler - タスクを受け取り、待っているワーカーへ配る
//!
//! - `state`: キューと待機ワーカーの状態機械（I/O なし）
//! - `server`: Unix ソケットの accept ループと接続ごとの read/write ループ

pub mod server;
pub mod state;

pub use self::server::{SchedulerHandle, SchedulerServer};
pub use self::state::{ConnId, Scheduler};
