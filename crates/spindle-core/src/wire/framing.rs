//! Length-delimited message framing.
//!
//! Wire format: 4-byte big-endian length prefix followed by payload.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::domain::errors::{ConnectionError, DecodeError, SpindleError};

/// Default maximum frame size (16 MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Read a length-delimited frame from an async reader.
///
/// Returns `Ok(None)` when the peer closed the stream at a frame boundary.
/// EOF inside the length prefix is `DecodeError::Truncated`.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_frame_size: usize,
) -> Result<Option<Bytes>, SpindleError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader
            .read(&mut len_buf[filled..])
            .await
            .map_err(ConnectionError::Io)?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(DecodeError::Truncated {
                needed: len_buf.len(),
                remaining: filled,
            }
            .into());
        }
        filled += n;
    }
    let len = u32::from_be_bytes(len_buf) as usize;

    if len > max_frame_size {
        return Err(DecodeError::FrameTooLarge(len).into());
    }

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    reader
        .read_exact(&mut buf)
        .await
        .map_err(ConnectionError::Io)?;

    tracing::trace!(bytes = len, "read frame");
    Ok(Some(buf.freeze()))
}

/// Write a length-delimited frame to an async writer.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    data: &[u8],
    max_frame_size: usize,
) -> Result<(), ConnectionError> {
    if data.len() > max_frame_size {
        return Err(ConnectionError::Protocol(format!(
            "frame too large: {} bytes",
            data.len()
        )));
    }

    let len = data.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(data).await?;
    writer.flush().await?;

    tracing::trace!(bytes = data.len(), "wrote frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    const MAX: usize = DEFAULT_MAX_FRAME_SIZE;

    #[tokio::test]
    async fn test_roundtrip() {
        let data = b"hello world";

        let mut buf = Vec::new();
        write_frame(&mut buf, data, MAX).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let result = read_frame(&mut cursor, MAX).await.unwrap().unwrap();
        assert_eq!(&result[..], data);
    }

    #[tokio::test]
    async fn test_empty_frame() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"", MAX).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let result = read_frame(&mut cursor, MAX).await.unwrap().unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_multiple_frames_then_eof() {
        let frames = vec![b"first".to_vec(), b"second".to_vec(), b"third".to_vec()];

        let mut buf = Vec::new();
        for frame in &frames {
            write_frame(&mut buf, frame, MAX).await.unwrap();
        }

        let mut cursor = Cursor::new(buf);
        for expected in &frames {
            let result = read_frame(&mut cursor, MAX).await.unwrap().unwrap();
            assert_eq!(&result[..], &expected[..]);
        }
        assert!(read_frame(&mut cursor, MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_frame_too_large_write() {
        let data = vec![0_u8; 65];
        let mut buf = Vec::new();

        let err = write_frame(&mut buf, &data, 64).await.unwrap_err();
        assert!(matches!(err, ConnectionError::Protocol(_)));
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn test_frame_too_large_read() {
        let buf = 65_u32.to_be_bytes().to_vec();

        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor, 64).await.unwrap_err();
        assert!(matches!(
            err,
            SpindleError::Decode(DecodeError::FrameTooLarge(65))
        ));
    }

    #[tokio::test]
    async fn test_truncated_frame() {
        // header claims 100 bytes, only 50 follow
        let mut buf = Vec::new();
        buf.extend_from_slice(&100_u32.to_be_bytes());
        buf.extend_from_slice(&[0_u8; 50]);

        let mut cursor = Cursor::new(buf);
        let err = read_frame(&mut cursor, MAX).await.unwrap_err();
        match err {
            SpindleError::Connection(ConnectionError::Io(e)) => {
                assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_torn_length_prefix() {
        for cut in 1..4 {
            let mut cursor = Cursor::new(vec![0_u8; cut]);
            let err = read_frame(&mut cursor, MAX).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    SpindleError::Decode(DecodeError::Truncated { needed: 4, remaining }) if remaining == cut
                ),
                "cut={cut} err={err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_binary_data() {
        let data: Vec<u8> = (0..=255).collect();

        let mut buf = Vec::new();
        write_frame(&mut buf, &data, MAX).await.unwrap();

        let mut cursor = Cursor::new(buf);
        let result = read_frame(&mut cursor, MAX).await.unwrap().unwrap();
        assert_eq!(&result[..], &data[..]);
    }
}
