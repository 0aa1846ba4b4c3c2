use blake3::Hasher;
use std::path::Path;
use std::time::Instant;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::codec::{ChunkKey, chunk_count, digest, split_into_chunks};
use super::constants::MAX_CHUNK_SIZE;
use super::hash::hex_digest;
use super::protocol::{Frame, max_frame_len, recv_frame, send_frame};
use super::utils::{display_file_name, report_progress};
use crate::TransferEvent;
use crate::error::TransferError;

/// What the sending pump reports once the receiver has acknowledged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSummary {
    pub file_name: String,
    pub bytes_sent: u64,
    pub chunks: u64,
    pub file_hash: String,
}

/// Stream one file over an established connection, in chunk order.
///
/// Returns only after the receiver's `Ack` confirms every byte arrived; the
/// write side is shut down after that.
pub async fn send_file<S>(
    stream: &mut S,
    file_path: &Path,
    key: &ChunkKey,
    chunk_size: usize,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<SendSummary, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
        return Err(TransferError::Protocol(format!(
            "chunk size {} out of range",
            chunk_size
        )));
    }

    let mut file = File::open(file_path).await?;
    let file_size = file.metadata().await?.len();
    let file_name = display_file_name(file_path);
    let chunks = chunk_count(file_size, chunk_size);

    info!("Sending file: {} ({} bytes, {} chunks)", file_name, file_size, chunks);

    let sender_host = hostname::get()
        .ok()
        .and_then(|s| s.into_string().ok())
        .unwrap_or_else(|| "Unknown-PC".to_string());

    send_frame(
        stream,
        key,
        &Frame::Header {
            file_name: file_name.clone(),
            sender_host,
            file_size,
            chunk_size: chunk_size as u32,
            chunk_count: chunks,
        },
    )
    .await?;

    let mut hasher = Hasher::new();
    let mut buffer = vec![0u8; chunk_size];
    let mut sent: u64 = 0;
    let start_time = Instant::now();

    report_progress(event_tx, &file_name, sent, file_size, start_time, true).await;

    for span in split_into_chunks(file_size, chunk_size) {
        let data = &mut buffer[..span.len];
        file.read_exact(data).await?;
        hasher.update(data);

        send_frame(
            stream,
            key,
            &Frame::Chunk {
                index: span.index,
                digest: digest(data),
                data: data.to_vec(),
            },
        )
        .await?;

        sent += span.len as u64;
        debug!("Sent chunk {}/{} ({} bytes)", span.index + 1, chunks, span.len);
        report_progress(event_tx, &file_name, sent, file_size, start_time, true).await;
    }

    let file_hash = hex_digest(&hasher);
    send_frame(stream, key, &Frame::Complete { file_hash: file_hash.clone() }).await?;
    stream.flush().await?;

    match recv_frame(stream, key, max_frame_len(0)).await? {
        Frame::Ack { bytes_received } if bytes_received == file_size => {
            info!("Receiver confirmed {} bytes", bytes_received);
        }
        Frame::Ack { bytes_received } => {
            return Err(TransferError::Protocol(format!(
                "receiver acknowledged {} of {} bytes",
                bytes_received, file_size
            )));
        }
        other => {
            return Err(TransferError::Protocol(format!(
                "expected Ack, got {}",
                other.kind()
            )));
        }
    }

    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown after Ack failed: {}", e);
    }

    Ok(SendSummary {
        file_name,
        bytes_sent: sent,
        chunks,
        file_hash,
    })
}
