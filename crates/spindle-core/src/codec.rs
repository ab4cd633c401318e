//! Task record codec.
//!
//! Wire format (all integers big-endian):
//!
//! ```text
//! task_id      20 bytes
//! function_id  20 bytes
//! num_args     u32
//!   tag u8     0 = INLINE    -> len u32, then len bytes
//!              1 = REFERENCE -> 20-byte object id
//! num_returns  u32
//! ```
//!
//! Return ids are not transmitted; they are re-derived from `task_id`.
//! A record must be consumed exactly: trailing bytes are an error.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::domain::errors::DecodeError;
use crate::domain::ids::{FunctionId, ID_LEN, ObjectId, TaskId};
use crate::domain::{TaskArg, TaskSpec};

pub const TAG_INLINE: u8 = 0;
pub const TAG_REFERENCE: u8 = 1;

/// Smallest encoding of one argument (tag + empty inline length).
const MIN_ARG_LEN: usize = 1 + 4;

/// Unpinned contents of a task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskParts {
    pub task_id: TaskId,
    pub function_id: FunctionId,
    pub args: Vec<TaskArg>,
    pub num_returns: u32,
}

/// Bytes `encode` will produce for `task`.
pub fn encoded_len(task: &TaskSpec) -> usize {
    let args: usize = task
        .args()
        .iter()
        .map(|arg| match arg {
            TaskArg::Value(v) => 1 + 4 + v.len(),
            TaskArg::ObjectRef(_) => 1 + ID_LEN,
        })
        .sum();
    ID_LEN * 2 + 4 + args + 4
}

pub fn encode(task: &TaskSpec) -> Bytes {
    let mut buf = BytesMut::with_capacity(encoded_len(task));
    buf.put_slice(task.task_id().as_bytes());
    buf.put_slice(task.function_id().as_bytes());
    buf.put_u32(wire_len(task.num_args()));
    for arg in task.args() {
        match arg {
            TaskArg::Value(v) => {
                buf.put_u8(TAG_INLINE);
                buf.put_u32(wire_len(v.len()));
                buf.put_slice(v);
            }
            TaskArg::ObjectRef(id) => {
                buf.put_u8(TAG_REFERENCE);
                buf.put_slice(id.as_bytes());
            }
        }
    }
    buf.put_u32(task.num_returns());
    buf.freeze()
}

/// Count or length as a `u32` field. A record larger than a frame can never
/// be sent, and frames are capped at `u32::MAX` (`SchedulerConfig::validate`).
fn wire_len(n: usize) -> u32 {
    debug_assert!(
        u32::try_from(n).is_ok(),
        "length {n} does not fit a u32 field"
    );
    n as u32
}

pub fn decode(bytes: &[u8]) -> Result<TaskParts, DecodeError> {
    let mut r = Reader { buf: bytes };

    let task_id = TaskId::from_bytes(r.id()?);
    let function_id = FunctionId::from_bytes(r.id()?);
    let num_args = r.u32()? as usize;
    if num_args.saturating_mul(MIN_ARG_LEN) > r.remaining() {
        return Err(DecodeError::Truncated {
            needed: num_args.saturating_mul(MIN_ARG_LEN),
            remaining: r.remaining(),
        });
    }

    let mut args = Vec::with_capacity(num_args);
    for _ in 0..num_args {
        let arg = match r.u8()? {
            TAG_INLINE => {
                let len = r.u32()? as usize;
                TaskArg::Value(Bytes::copy_from_slice(r.take(len)?))
            }
            TAG_REFERENCE => TaskArg::ObjectRef(ObjectId::from_bytes(r.id()?)),
            tag => return Err(DecodeError::BadTag(tag)),
        };
        args.push(arg);
    }

    let num_returns = r.u32()?;
    if r.remaining() != 0 {
        return Err(DecodeError::TrailingBytes(r.remaining()));
    }

    Ok(TaskParts {
        task_id,
        function_id,
        args,
        num_returns,
    })
}

/// Bounds-checked cursor; `Buf` getters panic on short input.
struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn need(&self, n: usize) -> Result<(), DecodeError> {
        if self.buf.len() < n {
            return Err(DecodeError::Truncated {
                needed: n,
                remaining: self.buf.len(),
            });
        }
        Ok(())
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.need(n)?;
        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        self.need(1)?;
        Ok(self.buf.get_u8())
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        self.need(4)?;
        Ok(self.buf.get_u32())
    }

    fn id(&mut self) -> Result<[u8; ID_LEN], DecodeError> {
        let mut out = [0u8; ID_LEN];
        out.copy_from_slice(self.take(ID_LEN)?);
        Ok(out)
    }
}
