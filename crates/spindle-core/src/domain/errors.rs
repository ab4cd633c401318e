//! Errors - エラー型と分類
//!
//! 4 つの分類（InvalidLength / PinAcquisition / Decode / Connection）を
//! それぞれ独立した enum にし、`SpindleError` でまとめます。
//! どのエラーも呼び出し元へそのまま返し、core の中ではリトライしません。

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use super::ids::{FunctionId, ObjectId};

/// Malformed identifier construction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("identifier must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Failure to acquire a pin on a referenced object.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    #[error("object {0} is not present in the store")]
    MissingObject(ObjectId),

    #[error("object store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Corrupt or truncated bytes on the receiving side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("truncated input: needed {needed} bytes, {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    #[error("bad argument tag: {0:#04x}")]
    BadTag(u8),

    #[error("{0} trailing bytes after task record")]
    TrailingBytes(usize),

    #[error("unknown message type: {0}")]
    UnknownMessage(u8),

    #[error("frame too large: {0} bytes")]
    FrameTooLarge(usize),

    #[error("empty frame")]
    EmptyFrame,

    #[error(transparent)]
    InvalidId(#[from] IdError),
}

/// Channel setup, write, or read failure.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to bind {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("channel io error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed")]
    Closed,

    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum SpindleError {
    #[error(transparent)]
    InvalidLength(#[from] IdError),

    #[error(transparent)]
    PinAcquisition(#[from] PinError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error("handler not found for function={0}")]
    HandlerNotFound(FunctionId),

    #[error("duplicate handler for function={0}")]
    DuplicateHandler(FunctionId),

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("invalid config: {0}")]
    Config(String),
}

impl SpindleError {
    /// Did the channel itself go away (as opposed to a bad record)?
    pub fn is_closed(&self) -> bool {
        matches!(self, SpindleError::Connection(ConnectionError::Closed))
    }
}
