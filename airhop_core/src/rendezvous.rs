//! Rendezvous: both ends derive the ad-hoc network name and the chunk key
//! from the shared passphrase locally. Nothing about the passphrase is ever
//! sent over the radio or the TCP stream.

use rand::Rng;
use std::fmt;

use crate::transfer::codec::{ChunkKey, KEY_SIZE};

/// Literal prefix of every derived network name.
pub const NETWORK_NAME_PREFIX: &str = "airhop_";

/// Number of digest bytes encoded into the network name.
const NETWORK_NAME_DIGEST_BYTES: usize = 3;

/// Length of a generated passphrase.
pub const PASSPHRASE_LENGTH: usize = 8;

/// RFC 4648 base32 alphabet: no lowercase, no 0/1/8/9, easy to read aloud.
const PASSPHRASE_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

const NETWORK_NAME_CONTEXT: &str = "airhop 2026 network name";
const CHUNK_KEY_CONTEXT: &str = "airhop 2026 chunk key";

/// Shared secret typed by the operators. `Debug` never reveals it.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    /// Surrounding whitespace from prompts and copy/paste is dropped.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    /// High-entropy passphrase for the receiving operator to read out.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let phrase = (0..PASSPHRASE_LENGTH)
            .map(|_| PASSPHRASE_ALPHABET[rng.random_range(0..PASSPHRASE_ALPHABET.len())] as char)
            .collect();
        Self(phrase)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw passphrase, for display to the receiving operator only.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

/// Ad-hoc network name both ends compute from the passphrase.
pub fn derive_network_name(passphrase: &Passphrase) -> String {
    let digest = blake3::derive_key(NETWORK_NAME_CONTEXT, passphrase.0.as_bytes());
    let suffix: String = digest[..NETWORK_NAME_DIGEST_BYTES]
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    format!("{}{}", NETWORK_NAME_PREFIX, suffix)
}

/// Symmetric chunk key. Uses a domain-separated KDF instead of copying the
/// passphrase bytes into the key; entropy still comes from the passphrase alone.
pub fn derive_key(passphrase: &Passphrase) -> ChunkKey {
    let key: [u8; KEY_SIZE] = blake3::derive_key(CHUNK_KEY_CONTEXT, passphrase.0.as_bytes());
    key
}
