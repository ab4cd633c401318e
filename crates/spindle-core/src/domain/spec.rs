//! TaskSpec - 1 つのタスクの不変な記述
//!
//! function id・順序付き引数・戻り値スロット数を持ちます。
//! 参照引数の pin は `PinSet` が所有し、`TaskSpec` が drop されたときに解放されます。
//!
//! # ID の導出
//! - `task_id   = nonce (16 bytes, ULID big-endian) ‖ function_id[0..4]`
//! - `return[i] = task_id[0..16] ‖ (i as u32, big-endian)`
//!
//! nonce が異なれば先頭 16 バイトが異なるので、別タスク同士の return id は
//! 構造的に衝突しません。同じ nonce・同じ入力からは同じ ID が得られます。

use std::sync::Arc;

use bytes::Bytes;
use ulid::Ulid;

use super::arg::TaskArg;
use super::errors::{PinError, SpindleError};
use super::ids::{FunctionId, ID_LEN, ObjectId, TaskId};
use crate::codec::{self, TaskParts};
use crate::pins::{PinSet, PinTable};
use crate::ports::IdGenerator;

const NONCE_LEN: usize = 16;

/// Derive the identity of a task from its function and nonce.
pub fn derive_task_id(function_id: &FunctionId, nonce: Ulid) -> TaskId {
    let mut bytes = [0u8; ID_LEN];
    bytes[..NONCE_LEN].copy_from_slice(&nonce.to_bytes());
    bytes[NONCE_LEN..].copy_from_slice(&function_id.as_bytes()[..ID_LEN - NONCE_LEN]);
    TaskId::from_bytes(bytes)
}

/// Derive the object id of return slot `index` of `task_id`.
pub fn derive_return_id(task_id: &TaskId, index: u32) -> ObjectId {
    let mut bytes = [0u8; ID_LEN];
    bytes[..NONCE_LEN].copy_from_slice(&task_id.as_bytes()[..NONCE_LEN]);
    bytes[NONCE_LEN..].copy_from_slice(&index.to_be_bytes());
    ObjectId::from_bytes(bytes)
}

/// An immutable, pinned task description.
///
/// Equality compares the data (`task_id`, `function_id`, `args`,
/// `num_returns`) and ignores which table holds the pins, so a decoded copy
/// compares equal to its original.
pub struct TaskSpec {
    task_id: TaskId,
    function_id: FunctionId,
    args: Vec<TaskArg>,
    num_returns: u32,
    pins: PinSet,
}

impl TaskSpec {
    pub fn builder(function_id: FunctionId) -> TaskSpecBuilder {
        TaskSpecBuilder::new(function_id)
    }

    /// One-shot constructor: pins every reference argument in `pins`.
    pub fn build(
        function_id: FunctionId,
        args: Vec<TaskArg>,
        num_returns: u32,
        pins: &Arc<PinTable>,
        ids: &dyn IdGenerator,
    ) -> Result<Self, PinError> {
        TaskSpecBuilder {
            function_id,
            args,
            num_returns,
            nonce: None,
        }
        .build(pins, ids)
    }

    /// Decode a wire record and pin its references in `pins`.
    pub fn from_wire(bytes: &[u8], pins: &Arc<PinTable>) -> Result<Self, SpindleError> {
        let parts = codec::decode(bytes)?;
        Ok(Self::from_parts(parts, pins)?)
    }

    pub fn to_wire(&self) -> Bytes {
        codec::encode(self)
    }

    pub(crate) fn from_parts(parts: TaskParts, pins: &Arc<PinTable>) -> Result<Self, PinError> {
        let pin_set = pins.acquire(parts.args.iter().filter_map(TaskArg::object_id))?;
        Ok(Self::with_pins(parts, pin_set))
    }

    pub(crate) fn with_pins(parts: TaskParts, pins: PinSet) -> Self {
        Self {
            task_id: parts.task_id,
            function_id: parts.function_id,
            args: parts.args,
            num_returns: parts.num_returns,
            pins,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn function_id(&self) -> FunctionId {
        self.function_id
    }

    pub fn args(&self) -> &[TaskArg] {
        &self.args
    }

    pub fn num_args(&self) -> usize {
        self.args.len()
    }

    pub fn num_returns(&self) -> u32 {
        self.num_returns
    }

    pub fn return_id(&self, index: u32) -> Option<ObjectId> {
        (index < self.num_returns).then(|| derive_return_id(&self.task_id, index))
    }

    pub fn return_ids(&self) -> Vec<ObjectId> {
        (0..self.num_returns)
            .map(|i| derive_return_id(&self.task_id, i))
            .collect()
    }

    /// Reference arguments in order, repeats included.
    pub fn object_refs(&self) -> impl Iterator<Item = ObjectId> + '_ {
        self.args.iter().filter_map(TaskArg::object_id)
    }

    /// Pins held by this instance.
    pub fn pinned(&self) -> usize {
        self.pins.len()
    }
}

impl PartialEq for TaskSpec {
    fn eq(&self, other: &Self) -> bool {
        self.task_id == other.task_id
            && self.function_id == other.function_id
            && self.num_returns == other.num_returns
            && self.args == other.args
    }
}

impl Eq for TaskSpec {}

impl std::fmt::Debug for TaskSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSpec")
            .field("task_id", &self.task_id)
            .field("function_id", &self.function_id)
            .field("num_args", &self.args.len())
            .field("num_returns", &self.num_returns)
            .field("pins", &self.pins)
            .finish()
    }
}

/// Single-shot builder for `TaskSpec`.
///
/// ```ignore
/// let task = TaskSpec::builder(function_id)
///     .object(obj1)
///     .value("x")
///     .object(obj2)
///     .num_returns(2)
///     .build(&pins, &id_gen)?;
/// ```
#[derive(Debug, Clone)]
pub struct TaskSpecBuilder {
    function_id: FunctionId,
    args: Vec<TaskArg>,
    num_returns: u32,
    nonce: Option<Ulid>,
}

impl TaskSpecBuilder {
    pub fn new(function_id: FunctionId) -> Self {
        Self {
            function_id,
            args: Vec::new(),
            num_returns: 0,
            nonce: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<TaskArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn value(self, bytes: impl Into<Bytes>) -> Self {
        self.arg(TaskArg::Value(bytes.into()))
    }

    pub fn object(self, id: ObjectId) -> Self {
        self.arg(TaskArg::ObjectRef(id))
    }

    pub fn args(mut self, args: impl IntoIterator<Item = TaskArg>) -> Self {
        self.args.extend(args);
        self
    }

    pub fn num_returns(mut self, n: u32) -> Self {
        self.num_returns = n;
        self
    }

    /// Use a fixed nonce instead of asking the generator.
    pub fn nonce(mut self, nonce: Ulid) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Finalize: derive ids and pin every reference argument.
    ///
    /// If any pin fails, the pins taken so far are released and no task is
    /// produced.
    pub fn build(self, pins: &Arc<PinTable>, ids: &dyn IdGenerator) -> Result<TaskSpec, PinError> {
        let nonce = self.nonce.unwrap_or_else(|| ids.next_nonce());
        let task_id = derive_task_id(&self.function_id, nonce);
        let pin_set = pins.acquire(self.args.iter().filter_map(TaskArg::object_id))?;

        tracing::trace!(
            task = %task_id,
            args = self.args.len(),
            refs = pin_set.len(),
            returns = self.num_returns,
            "built task"
        );

        Ok(TaskSpec::with_pins(
            TaskParts {
                task_id,
                function_id: self.function_id,
                args: self.args,
                num_returns: self.num_returns,
            },
            pin_set,
        ))
    }
}
