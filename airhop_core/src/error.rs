//! Error types for the transfer layer.
//!
//! `CodecError` covers sealing and opening of individual envelopes.
//! `TransferError` covers everything from binding the listener to the final
//! whole-file hash check, and knows which phase of the session failed.

use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("sealed envelope is {0} bytes, too short to hold a nonce and tag")]
    Truncated(usize),

    #[error("chunk failed authentication (wrong passphrase or corrupted stream)")]
    Authentication,

    #[error("chunk encryption failed")]
    Encryption,
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("could not listen on :{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("error accepting connection: {0}")]
    Accept(#[source] std::io::Error),

    #[error("no connection to {addr} after {attempts} attempts")]
    DialExhausted { addr: SocketAddr, attempts: u32 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("chunk out of order: expected {expected}, got {actual}")]
    OutOfOrder { expected: u64, actual: u64 },

    #[error("chunk {index} digest mismatch")]
    DigestMismatch { index: u64 },

    #[error("chunk {index} has {actual} bytes, expected {expected}")]
    LengthMismatch {
        index: u64,
        expected: usize,
        actual: usize,
    },

    #[error("file hash mismatch: expected {expected}, computed {computed}")]
    FileHashMismatch { expected: String, computed: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    /// Dial exhaustion aborts the transfer without being treated as a crash.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransferError::DialExhausted { .. })
    }

    /// Name of the session phase this error belongs to, for operator messages.
    pub fn phase(&self) -> &'static str {
        match self {
            TransferError::Bind { .. } => "listen",
            TransferError::Accept(_) => "accept",
            TransferError::DialExhausted { .. } => "dial",
            TransferError::Codec(_)
            | TransferError::OutOfOrder { .. }
            | TransferError::DigestMismatch { .. }
            | TransferError::LengthMismatch { .. }
            | TransferError::FileHashMismatch { .. } => "integrity",
            TransferError::Protocol(_) => "protocol",
            TransferError::Io(_) => "local I/O",
        }
    }
}

impl From<bincode::Error> for TransferError {
    fn from(err: bincode::Error) -> Self {
        TransferError::Protocol(format!("malformed frame: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_dial_exhaustion_is_non_fatal() {
        let addr: SocketAddr = "127.0.0.1:3290".parse().unwrap();
        assert!(!TransferError::DialExhausted { addr, attempts: 60 }.is_fatal());
        assert!(TransferError::Codec(CodecError::Authentication).is_fatal());
        assert!(TransferError::Accept(std::io::Error::other("boom")).is_fatal());
    }

    #[test]
    fn test_phase_names() {
        assert_eq!(TransferError::Codec(CodecError::Authentication).phase(), "integrity");
        assert_eq!(TransferError::Protocol("x".into()).phase(), "protocol");
        assert_eq!(
            TransferError::Bind {
                port: 1,
                source: std::io::Error::other("in use")
            }
            .phase(),
            "listen"
        );
    }
}
