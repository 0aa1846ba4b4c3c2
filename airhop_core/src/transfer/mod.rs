//! Chunked, sealed TCP file transfer.
//!
//! This module provides:
//! - Chunking, per-chunk digests and XChaCha20-Poly1305 sealing (`codec`)
//! - Length-prefixed sealed frames (`protocol`)
//! - Listener/accept and bounded dial retry (`establish`)
//! - The ordered send and receive-and-reassemble pumps (`sender`, `receiver`)

pub mod codec;
pub mod constants;
pub mod establish;
pub mod hash;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod utils;

// Re-export public API
pub use constants::TRANSFER_PORT;
pub use establish::{accept_one, bind_listener, dial_with_retry};
pub use receiver::{ReceiveSummary, receive_file};
pub use sender::{SendSummary, send_file};
