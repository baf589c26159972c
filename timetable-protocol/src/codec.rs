//! Length-prefixed JSON frame codec.
//!
//! Frame format: [4 bytes u32 BE length][JSON frame bytes]
//!
//! The prefix makes frames independent of TCP segmentation: a frame may
//! arrive split across any number of reads, or packed back-to-back with its
//! neighbors, and decodes identically either way.

use crate::frame::MessageFrame;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on one encoded frame. Guards against corrupt or hostile
/// length prefixes; well-formed frames stay far below this.
pub const MAX_WIRE_FRAME_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame length {0} exceeds limit of {MAX_WIRE_FRAME_BYTES} bytes")]
    Oversized(usize),

    #[error("invalid frame JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Whether the connection is still usable after this error.
    /// JSON errors poison one frame; i/o errors poison the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CodecError::Json(_))
    }
}

/// Encode and write one frame.
pub async fn write_frame<W>(writer: &mut W, frame: &MessageFrame) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let encoded = serde_json::to_vec(frame)?;
    if encoded.len() > MAX_WIRE_FRAME_BYTES {
        return Err(CodecError::Oversized(encoded.len()));
    }

    writer.write_all(&(encoded.len() as u32).to_be_bytes()).await?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

/// Read and decode one frame.
pub async fn read_frame<R>(reader: &mut R) -> Result<MessageFrame, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut length_buf = [0u8; 4];
    reader.read_exact(&mut length_buf).await?;

    let length = u32::from_be_bytes(length_buf) as usize;
    if length > MAX_WIRE_FRAME_BYTES {
        return Err(CodecError::Oversized(length));
    }

    let mut payload = vec![0u8; length];
    reader.read_exact(&mut payload).await?;
    Ok(serde_json::from_slice(&payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MessageType;
    use tokio::io::duplex;

    fn sample_frame() -> MessageFrame {
        MessageFrame::new("frame-1", 0, true, MessageType::Command, "{\"command\":\"ping\"}")
    }

    #[tokio::test]
    async fn frame_roundtrips_over_stream() {
        let (mut client, mut server) = duplex(4096);
        let frame = sample_frame();

        write_frame(&mut client, &frame).await.unwrap();
        let decoded = read_frame(&mut server).await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn back_to_back_frames_decode_individually() {
        let (mut client, mut server) = duplex(16384);
        let first = sample_frame();
        let second = MessageFrame::new("frame-2", 0, true, MessageType::Data, "{}");

        write_frame(&mut client, &first).await.unwrap();
        write_frame(&mut client, &second).await.unwrap();

        assert_eq!(read_frame(&mut server).await.unwrap(), first);
        assert_eq!(read_frame(&mut server).await.unwrap(), second);
    }

    #[tokio::test]
    async fn split_delivery_decodes_identically() {
        // Feed the encoded bytes one at a time to simulate worst-case TCP
        // segmentation.
        let frame = sample_frame();
        let mut encoded = Vec::new();
        write_frame(&mut encoded, &frame).await.unwrap();

        let (mut tx, mut server) = duplex(16);
        let writer = tokio::spawn(async move {
            for byte in encoded {
                tx.write_all(&[byte]).await.unwrap();
            }
        });

        let decoded = read_frame(&mut server).await.unwrap();
        writer.await.unwrap();
        assert_eq!(decoded, frame);
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = duplex(64);
        let bogus = ((MAX_WIRE_FRAME_BYTES + 1) as u32).to_be_bytes();
        client.write_all(&bogus).await.unwrap();

        match read_frame(&mut server).await {
            Err(CodecError::Oversized(len)) => assert_eq!(len, MAX_WIRE_FRAME_BYTES + 1),
            other => panic!("expected oversized error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_json_is_a_recoverable_error() {
        let (mut client, mut server) = duplex(64);
        let garbage = b"not json at all";
        client.write_all(&(garbage.len() as u32).to_be_bytes()).await.unwrap();
        client.write_all(garbage).await.unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(err.is_recoverable());

        // The stream is still aligned: a valid frame decodes next.
        let frame = sample_frame();
        write_frame(&mut client, &frame).await.unwrap();
        assert_eq!(read_frame(&mut server).await.unwrap(), frame);
    }

    #[tokio::test]
    async fn eof_surfaces_as_unrecoverable_io_error() {
        let (client, mut server) = duplex(64);
        drop(client);

        let err = read_frame(&mut server).await.unwrap_err();
        assert!(matches!(err, CodecError::Io(_)));
        assert!(!err.is_recoverable());
    }
}
