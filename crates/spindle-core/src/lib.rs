//! spindle-core
//!
//! Task specifications and the client/scheduler protocol that moves them.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, TaskArg, TaskSpec, errors）
//! - **ports**: 抽象化レイヤー（Clock, IdGenerator, ObjectStore, TaskQueue）
//! - **impls**: 実装（InMemoryObjectStore, FifoTaskQueue）
//! - **pins**: 参照引数の pin 管理（PinTable, PinSet）
//! - **codec**: TaskSpec のバイト表現
//! - **wire**: フレーミングとメッセージ種別
//! - **client**: scheduler への接続（submit / get_task / task_done）
//! - **scheduler**: キュー・待機ワーカー・Unix ソケットサーバー
//! - **runtime / worker**: 受け取ったタスクの実行
//! - **config / observability**: 設定と統計

pub mod client;
pub mod codec;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod pins;
pub mod ports;
pub mod runtime;
pub mod scheduler;
pub mod wire;
pub mod worker;

pub use client::{CloseHandle, Connection};
pub use config::SchedulerConfig;
pub use domain::{
    ConnectionError, DecodeError, FunctionId, ObjectId, PinError, SpindleError, TaskArg, TaskId,
    TaskSpec,
};
pub use pins::{PinSet, PinTable};
pub use scheduler::{SchedulerHandle, SchedulerServer};
