//! Client <-> scheduler protocol messages.
//!
//! Every frame payload starts with a one-byte message type:
//!
//! | type | message     | body                 | direction          |
//! |------|-------------|----------------------|--------------------|
//! | 0    | SubmitTask  | task record          | client -> sched    |
//! | 1    | GetTask     | (empty)              | client -> sched    |
//! | 2    | ExecuteTask | task record          | sched  -> client   |
//! | 3    | TaskDone    | 20-byte task id      | client -> sched    |
//! | 4    | Disconnect  | (empty)              | client -> sched    |
//!
//! Task records are carried as raw bytes here; decoding them (and pinning)
//! is the receiver's job.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncWrite};

use super::framing::{read_frame, write_frame};
use crate::domain::errors::{ConnectionError, DecodeError, SpindleError};
use crate::domain::ids::TaskId;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    SubmitTask = 0,
    GetTask = 1,
    ExecuteTask = 2,
    TaskDone = 3,
    Disconnect = 4,
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(v: u8) -> Result<Self, Self::Error> {
        Ok(match v {
            0 => MessageType::SubmitTask,
            1 => MessageType::GetTask,
            2 => MessageType::ExecuteTask,
            3 => MessageType::TaskDone,
            4 => MessageType::Disconnect,
            other => return Err(DecodeError::UnknownMessage(other)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    SubmitTask(Bytes),
    GetTask,
    ExecuteTask(Bytes),
    TaskDone(TaskId),
    Disconnect,
}

impl Message {
    pub fn kind(&self) -> MessageType {
        match self {
            Message::SubmitTask(_) => MessageType::SubmitTask,
            Message::GetTask => MessageType::GetTask,
            Message::ExecuteTask(_) => MessageType::ExecuteTask,
            Message::TaskDone(_) => MessageType::TaskDone,
            Message::Disconnect => MessageType::Disconnect,
        }
    }

    pub fn encode(&self) -> Bytes {
        let body: &[u8] = match self {
            Message::SubmitTask(b) | Message::ExecuteTask(b) => &b[..],
            Message::TaskDone(id) => &id.as_bytes()[..],
            Message::GetTask | Message::Disconnect => &[],
        };
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(self.kind() as u8);
        buf.put_slice(body);
        buf.freeze()
    }

    pub fn decode(frame: Bytes) -> Result<Self, DecodeError> {
        let Some(&tag) = frame.first() else {
            return Err(DecodeError::EmptyFrame);
        };
        let body = frame.slice(1..);
        let msg = match MessageType::try_from(tag)? {
            MessageType::SubmitTask => Message::SubmitTask(body),
            MessageType::ExecuteTask => Message::ExecuteTask(body),
            MessageType::TaskDone => Message::TaskDone(TaskId::from_slice(&body)?),
            MessageType::GetTask => {
                expect_empty(&body)?;
                Message::GetTask
            }
            MessageType::Disconnect => {
                expect_empty(&body)?;
                Message::Disconnect
            }
        };
        Ok(msg)
    }
}

fn expect_empty(body: &[u8]) -> Result<(), DecodeError> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes(body.len()))
    }
}

/// Write one message as one frame.
pub async fn send_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
    max_frame_size: usize,
) -> Result<(), ConnectionError> {
    write_frame(writer, &msg.encode(), max_frame_size).await
}

/// Read one message. `Ok(None)` means the peer closed the stream.
pub async fn recv_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Message>, SpindleError> {
    match read_frame(reader, max_frame_size).await? {
        Some(frame) => Ok(Some(Message::decode(frame)?)),
        None => Ok(None),
    }
}
