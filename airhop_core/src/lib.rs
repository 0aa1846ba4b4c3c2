use std::net::SocketAddr;

pub mod config;
pub mod error;
pub mod rendezvous;
pub mod session;
pub mod transfer;

pub use config::{DialPolicy, LinkTimeouts, TransferConfig};
pub use error::{CodecError, TransferError};
pub use rendezvous::Passphrase;
pub use session::{Role, TransferSession};

/// Progress and status reported from the core to the front-end
#[derive(Debug, Clone)]
pub enum TransferEvent {
    Status(String),

    /// Wireless association established on the derived network
    NetworkReady {
        network_name: String,
    },

    /// Receiving role: socket bound, waiting for the sender
    Listening {
        port: u16,
    },

    /// Sending role: a dial attempt failed and will be retried
    DialAttempt {
        attempt: u32,
        max_attempts: u32,
        addr: SocketAddr,
    },

    Connected {
        peer: SocketAddr,
    },

    TransferProgress {
        file_name: String,
        bytes_done: u64,
        total_bytes: u64,
        progress: f32,
        speed: String,
        is_sending: bool,
    },

    TransferCompleted {
        file_name: String,
        bytes: u64,
    },

    Error(String),
}
