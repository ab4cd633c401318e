//! Task arguments: inline values or references into the object store.

use bytes::Bytes;

use super::ids::ObjectId;

/// One positional argument of a task.
///
/// The core never looks inside `Value` payloads; they are whatever the caller
/// serialized. Order inside a task is preserved exactly, duplicates included.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskArg {
    /// Inline, already-serialized value.
    Value(Bytes),
    /// Reference to an object held in the shared store.
    ObjectRef(ObjectId),
}

impl TaskArg {
    pub fn value(bytes: impl Into<Bytes>) -> Self {
        TaskArg::Value(bytes.into())
    }

    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            TaskArg::ObjectRef(id) => Some(*id),
            TaskArg::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Bytes> {
        match self {
            TaskArg::Value(bytes) => Some(bytes),
            TaskArg::ObjectRef(_) => None,
        }
    }

    pub fn is_ref(&self) -> bool {
        matches!(self, TaskArg::ObjectRef(_))
    }
}

impl From<ObjectId> for TaskArg {
    fn from(id: ObjectId) -> Self {
        TaskArg::ObjectRef(id)
    }
}

impl From<Bytes> for TaskArg {
    fn from(bytes: Bytes) -> Self {
        TaskArg::Value(bytes)
    }
}

impl From<Vec<u8>> for TaskArg {
    fn from(bytes: Vec<u8>) -> Self {
        TaskArg::Value(Bytes::from(bytes))
    }
}

impl From<&'static str> for TaskArg {
    fn from(s: &'static str) -> Self {
        TaskArg::Value(Bytes::from_static(s.as_bytes()))
    }
}
