use blake3::Hasher;
use std::io::SeekFrom;
use std::path::Path;
use std::time::Instant;
use tokio::io::{AsyncRead, AsyncSeekExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::codec::{ChunkKey, chunk_count, digest, split_into_chunks};
use super::constants::MAX_CHUNK_SIZE;
use super::hash::hex_digest;
use super::protocol::{Frame, MAX_UNKNOWN_FRAME_LEN, max_frame_len, recv_frame, send_frame};
use super::utils::{open_secure_file, report_progress};
use crate::TransferEvent;
use crate::error::TransferError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveSummary {
    pub file_name: String,
    pub sender_host: String,
    pub bytes_received: u64,
    pub chunks: u64,
    pub file_hash: String,
}

/// Receive one file into `dest_path`, verifying every chunk in order.
///
/// Any integrity failure aborts the whole session; there is no per-chunk retry.
pub async fn receive_file<S>(
    stream: &mut S,
    dest_path: &Path,
    key: &ChunkKey,
    event_tx: &mpsc::Sender<TransferEvent>,
) -> Result<ReceiveSummary, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (file_name, sender_host, file_size, chunk_size, chunks) =
        match recv_frame(stream, key, MAX_UNKNOWN_FRAME_LEN).await? {
            Frame::Header {
                file_name,
                sender_host,
                file_size,
                chunk_size,
                chunk_count: announced,
            } => {
                let chunk_size = chunk_size as usize;
                if chunk_size == 0 || chunk_size > MAX_CHUNK_SIZE {
                    return Err(TransferError::Protocol(format!(
                        "header announces chunk size {}",
                        chunk_size
                    )));
                }
                let expected = chunk_count(file_size, chunk_size);
                if announced != expected {
                    return Err(TransferError::Protocol(format!(
                        "header announces {} chunks, {} bytes in {}-byte chunks needs {}",
                        announced, file_size, chunk_size, expected
                    )));
                }
                (file_name, sender_host, file_size, chunk_size, expected)
            }
            other => {
                return Err(TransferError::Protocol(format!(
                    "expected Header, got {}",
                    other.kind()
                )));
            }
        };

    info!(
        "Receiving file: {} from {} ({} bytes, {} chunks)",
        file_name, sender_host, file_size, chunks
    );
    let _ = event_tx
        .send(TransferEvent::Status(format!(
            "Receiving: {} from {} ({} bytes)",
            file_name, sender_host, file_size
        )))
        .await;

    let mut file = open_secure_file(dest_path).await?;
    let mut hasher = Hasher::new();
    let mut received: u64 = 0;
    let mut position: u64 = 0;
    let frame_limit = max_frame_len(chunk_size);
    let start_time = Instant::now();

    report_progress(event_tx, &file_name, received, file_size, start_time, false).await;

    for span in split_into_chunks(file_size, chunk_size) {
        let (index, chunk_digest, data) = match recv_frame(stream, key, frame_limit).await? {
            Frame::Chunk { index, digest, data } => (index, digest, data),
            other => {
                return Err(TransferError::Protocol(format!(
                    "expected Chunk {}, got {}",
                    span.index,
                    other.kind()
                )));
            }
        };

        if index != span.index {
            return Err(TransferError::OutOfOrder {
                expected: span.index,
                actual: index,
            });
        }
        if data.len() != span.len {
            return Err(TransferError::LengthMismatch {
                index,
                expected: span.len,
                actual: data.len(),
            });
        }
        if digest(&data) != chunk_digest {
            error!("Chunk {} failed digest check", index);
            return Err(TransferError::DigestMismatch { index });
        }

        if position != span.offset {
            file.seek(SeekFrom::Start(span.offset)).await?;
        }
        file.write_all(&data).await?;
        position = span.offset + data.len() as u64;
        hasher.update(&data);

        received += data.len() as u64;
        debug!("Wrote chunk {}/{} at offset {}", index + 1, chunks, span.offset);
        report_progress(event_tx, &file_name, received, file_size, start_time, false).await;
    }

    let expected_hash = match recv_frame(stream, key, frame_limit).await? {
        Frame::Complete { file_hash } => file_hash,
        other => {
            return Err(TransferError::Protocol(format!(
                "expected Complete, got {}",
                other.kind()
            )));
        }
    };

    file.flush().await?;
    file.sync_all().await?;

    let computed = hex_digest(&hasher);
    if computed != expected_hash {
        error!("Hash verification FAILED for {}", file_name);
        return Err(TransferError::FileHashMismatch {
            expected: expected_hash,
            computed,
        });
    }
    info!("File received and verified: {}", file_name);

    send_frame(stream, key, &Frame::Ack { bytes_received: received }).await?;
    stream.flush().await?;
    if let Err(e) = stream.shutdown().await {
        debug!("Shutdown after Ack failed: {}", e);
    }

    Ok(ReceiveSummary {
        file_name,
        sender_host,
        bytes_received: received,
        chunks,
        file_hash: computed,
    })
}
