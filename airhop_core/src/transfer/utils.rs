use crate::TransferEvent;
use crate::transfer::constants::MAX_FILENAME_LENGTH;
use std::path::Path;
use std::time::Instant;
use tokio::fs::{File, OpenOptions};
use tokio::sync::mpsc;

/// Create (or truncate) the destination file with secure permissions (0o600 on Unix)
pub async fn open_secure_file(path: &Path) -> std::io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    options.open(path).await
}

/// Format transfer speed from bytes and elapsed time
pub fn format_transfer_speed(bytes_transferred: u64, elapsed_secs: f64) -> String {
    if elapsed_secs <= 0.0 {
        return "Starting...".to_string();
    }

    let speed_bps = bytes_transferred as f64 / elapsed_secs;
    if speed_bps > 1_000_000.0 {
        format!("{:.2} MB/s", speed_bps / 1_000_000.0)
    } else if speed_bps > 1_000.0 {
        format!("{:.1} KB/s", speed_bps / 1_000.0)
    } else {
        format!("{:.0} B/s", speed_bps)
    }
}

/// Bare file name for the header, never a local path
pub fn display_file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or("unknown_file");

    let mut cutoff = name.len().min(MAX_FILENAME_LENGTH);
    while !name.is_char_boundary(cutoff) {
        cutoff -= 1;
    }
    name[..cutoff].to_string()
}

/// Report transfer progress to the event channel
pub async fn report_progress(
    event_tx: &mpsc::Sender<TransferEvent>,
    file_name: &str,
    bytes_done: u64,
    total_bytes: u64,
    start_time: Instant,
    is_sending: bool,
) {
    let progress = if total_bytes == 0 {
        100.0
    } else {
        (bytes_done as f32 / total_bytes as f32) * 100.0
    };
    let elapsed = start_time.elapsed().as_secs_f64();
    let speed = format_transfer_speed(bytes_done, elapsed);

    let _ = event_tx
        .send(TransferEvent::TransferProgress {
            file_name: file_name.to_string(),
            bytes_done,
            total_bytes,
            progress,
            speed,
            is_sending,
        })
        .await;
}
