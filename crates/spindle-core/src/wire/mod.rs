//! Channel wire format: framing plus protocol messages.

pub mod framing;
pub mod message;

pub use framing::{DEFAULT_MAX_FRAME_SIZE, read_frame, write_frame};
pub use message::{Message, MessageType, recv_message, send_message};
