use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::codec::{ChunkDigest, ChunkKey, decrypt_chunk, encrypt_chunk};
use super::constants::{FRAME_SLACK, MAX_CHUNK_SIZE};
use crate::error::TransferError;

/// Protocol messages. Every frame is bincode-encoded and sealed before it
/// touches the wire.
///
/// Sender: `Header`, one `Chunk` per span, `Complete`. Receiver: `Ack`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Header {
        file_name: String,
        sender_host: String,
        file_size: u64,
        chunk_size: u32,
        chunk_count: u64,
    },
    Chunk {
        index: u64,
        digest: ChunkDigest,
        data: Vec<u8>,
    },
    /// BLAKE3 of the whole file (64-character hex string)
    Complete {
        file_hash: String,
    },
    Ack {
        bytes_received: u64,
    },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Header { .. } => "Header",
            Frame::Chunk { .. } => "Chunk",
            Frame::Complete { .. } => "Complete",
            Frame::Ack { .. } => "Ack",
        }
    }
}

/// Upper bound on a sealed frame for a given chunk size.
pub fn max_frame_len(chunk_size: usize) -> usize {
    chunk_size + FRAME_SLACK
}

/// Bound used before the header has told us the chunk size.
pub const MAX_UNKNOWN_FRAME_LEN: usize = MAX_CHUNK_SIZE + FRAME_SLACK;

/// Seal a frame and write it as `u32 length || nonce || ciphertext || tag`
pub async fn send_frame<W>(writer: &mut W, key: &ChunkKey, frame: &Frame) -> Result<(), TransferError>
where
    W: AsyncWrite + Unpin,
{
    let plain = bincode::serialize(frame)?;
    let envelope = encrypt_chunk(key, &plain)?;
    let len = u32::try_from(envelope.len())
        .map_err(|_| TransferError::Protocol(format!("frame of {} bytes too large", envelope.len())))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&envelope).await?;
    Ok(())
}

/// Read one length-prefixed envelope, open it and decode the frame
pub async fn recv_frame<R>(reader: &mut R, key: &ChunkKey, max_len: usize) -> Result<Frame, TransferError>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await.map_err(eof_as_protocol)?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        return Err(TransferError::Protocol(format!(
            "frame of {} bytes exceeds limit of {}",
            len, max_len
        )));
    }

    let mut envelope = vec![0u8; len];
    reader.read_exact(&mut envelope).await.map_err(eof_as_protocol)?;

    let plain = decrypt_chunk(key, &envelope)?;
    let frame: Frame = bincode::deserialize(&plain)?;
    Ok(frame)
}

fn eof_as_protocol(err: std::io::Error) -> TransferError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        TransferError::Protocol("connection closed mid-transfer".to_string())
    } else {
        TransferError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;
    use crate::transfer::codec::digest;

    const KEY: ChunkKey = [3u8; 32];

    #[tokio::test]
    async fn test_frames_cross_a_stream_in_order() {
        let (mut a, mut b) = tokio::io::duplex(64 * 1024);
        let frames = vec![
            Frame::Header {
                file_name: "photo.jpg".into(),
                sender_host: "laptop".into(),
                file_size: 3,
                chunk_size: 2,
                chunk_count: 2,
            },
            Frame::Chunk { index: 0, digest: digest(b"ab"), data: b"ab".to_vec() },
            Frame::Chunk { index: 1, digest: digest(b"c"), data: b"c".to_vec() },
            Frame::Complete { file_hash: "00".into() },
        ];
        for frame in &frames {
            send_frame(&mut a, &KEY, frame).await.unwrap();
        }
        for expected in &frames {
            let got = recv_frame(&mut b, &KEY, MAX_UNKNOWN_FRAME_LEN).await.unwrap();
            assert_eq!(&got, expected);
        }
    }

    #[tokio::test]
    async fn test_wrong_key_is_authentication_error() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        send_frame(&mut a, &KEY, &Frame::Ack { bytes_received: 1 }).await.unwrap();
        let err = recv_frame(&mut b, &[4u8; 32], MAX_UNKNOWN_FRAME_LEN).await.unwrap_err();
        assert!(matches!(err, TransferError::Codec(CodecError::Authentication)));
    }

    #[tokio::test]
    async fn test_oversized_length_prefix_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        a.write_all(&(1024u32).to_be_bytes()).await.unwrap();
        let err = recv_frame(&mut b, &KEY, 512).await.unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_truncated_stream_is_protocol_error() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        a.write_all(&(100u32).to_be_bytes()).await.unwrap();
        a.write_all(&[0u8; 10]).await.unwrap();
        drop(a);
        let err = recv_frame(&mut b, &KEY, MAX_UNKNOWN_FRAME_LEN).await.unwrap_err();
        assert!(matches!(err, TransferError::Protocol(_)));
    }
}
