//! Chunking, per-chunk digests and per-chunk authenticated encryption.
//!
//! Envelope layout: `nonce(24) || ciphertext || tag(16)`, sealed with
//! XChaCha20-Poly1305. The nonce is random per envelope, so the receiver
//! needs nothing but the shared key to open it.

use chacha20poly1305::aead::{Aead, AeadCore, KeyInit, OsRng};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::error::CodecError;

pub const KEY_SIZE: usize = 32;
pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Bytes added to every sealed payload.
pub const ENVELOPE_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

pub type ChunkKey = [u8; KEY_SIZE];
pub type ChunkDigest = [u8; 32];

/// One contiguous span of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: u64,
    pub offset: u64,
    pub len: usize,
}

/// Iterator over the spans of a file of `file_len` bytes.
#[derive(Debug, Clone)]
pub struct ChunkSpans {
    file_len: u64,
    chunk_size: u64,
    next_index: u64,
}

impl Iterator for ChunkSpans {
    type Item = ChunkSpan;

    fn next(&mut self) -> Option<ChunkSpan> {
        let offset = self.next_index.checked_mul(self.chunk_size)?;
        if offset >= self.file_len {
            return None;
        }
        let len = (self.file_len - offset).min(self.chunk_size) as usize;
        let span = ChunkSpan {
            index: self.next_index,
            offset,
            len,
        };
        self.next_index += 1;
        Some(span)
    }
}

/// Partition `0..file_len` into `chunk_size` spans; only the last may be shorter.
///
/// `chunk_size` must be non-zero.
pub fn split_into_chunks(file_len: u64, chunk_size: usize) -> ChunkSpans {
    assert!(chunk_size > 0, "chunk size must be non-zero");
    ChunkSpans {
        file_len,
        chunk_size: chunk_size as u64,
        next_index: 0,
    }
}

/// Number of chunks for a file, i.e. `ceil(file_len / chunk_size)`.
pub fn chunk_count(file_len: u64, chunk_size: usize) -> u64 {
    file_len.div_ceil(chunk_size as u64)
}

/// Integrity digest of a raw chunk payload.
pub fn digest(chunk: &[u8]) -> ChunkDigest {
    *blake3::hash(chunk).as_bytes()
}

/// Seal `chunk` under `key` with a fresh random nonce, returning `nonce || sealed`.
pub fn encrypt_chunk(key: &ChunkKey, chunk: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cipher = XChaCha20Poly1305::new(key.into());
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let sealed = cipher
        .encrypt(&nonce, chunk)
        .map_err(|_| CodecError::Encryption)?;

    let mut envelope = Vec::with_capacity(NONCE_SIZE + sealed.len());
    envelope.extend_from_slice(&nonce);
    envelope.extend_from_slice(&sealed);
    Ok(envelope)
}

/// Split the nonce prefix off `envelope` and open the sealed payload.
pub fn decrypt_chunk(key: &ChunkKey, envelope: &[u8]) -> Result<Vec<u8>, CodecError> {
    if envelope.len() < ENVELOPE_OVERHEAD {
        return Err(CodecError::Truncated(envelope.len()));
    }
    let (nonce, sealed) = envelope.split_at(NONCE_SIZE);
    let cipher = XChaCha20Poly1305::new(key.into());

    cipher
        .decrypt(XNonce::from_slice(nonce), sealed)
        .map_err(|_| CodecError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: ChunkKey = [7u8; KEY_SIZE];

    #[test]
    fn test_chunk_count_matches_spans() {
        for &(len, size) in &[(0u64, 4usize), (1, 4), (4, 4), (5, 4), (4096, 1000), (10, 1)] {
            let spans: Vec<_> = split_into_chunks(len, size).collect();
            assert_eq!(spans.len() as u64, chunk_count(len, size), "len={len} size={size}");
        }
    }

    #[test]
    fn test_chunk_boundaries() {
        let spans: Vec<_> = split_into_chunks(10, 4).collect();
        assert_eq!(
            spans,
            vec![
                ChunkSpan { index: 0, offset: 0, len: 4 },
                ChunkSpan { index: 1, offset: 4, len: 4 },
                ChunkSpan { index: 2, offset: 8, len: 2 },
            ]
        );

        // Exact multiple: last chunk is full sized
        let spans: Vec<_> = split_into_chunks(12, 4).collect();
        assert_eq!(spans.len(), 3);
        assert!(spans.iter().all(|s| s.len == 4));

        assert_eq!(split_into_chunks(0, 4).count(), 0);
    }

    #[test]
    fn test_spans_cover_file_exactly() {
        let len = 1_000_003u64;
        let mut expected_offset = 0u64;
        for span in split_into_chunks(len, 65_536) {
            assert_eq!(span.offset, expected_offset);
            expected_offset += span.len as u64;
        }
        assert_eq!(expected_offset, len);
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let envelope = encrypt_chunk(&KEY, data).unwrap();
        assert_eq!(envelope.len(), data.len() + ENVELOPE_OVERHEAD);
        assert_eq!(decrypt_chunk(&KEY, &envelope).unwrap(), data);
    }

    #[test]
    fn test_empty_chunk_roundtrip() {
        let envelope = encrypt_chunk(&KEY, &[]).unwrap();
        assert_eq!(envelope.len(), ENVELOPE_OVERHEAD);
        assert!(decrypt_chunk(&KEY, &envelope).unwrap().is_empty());
    }

    #[test]
    fn test_fresh_nonce_per_chunk() {
        let a = encrypt_chunk(&KEY, b"same").unwrap();
        let b = encrypt_chunk(&KEY, b"same").unwrap();
        assert_ne!(a[..NONCE_SIZE], b[..NONCE_SIZE]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_bit_flip_in_ciphertext_rejected() {
        let mut envelope = encrypt_chunk(&KEY, b"payload bytes").unwrap();
        let last = envelope.len() - 1;
        envelope[NONCE_SIZE + 2] ^= 0x01;
        assert!(matches!(decrypt_chunk(&KEY, &envelope), Err(CodecError::Authentication)));

        envelope[NONCE_SIZE + 2] ^= 0x01;
        envelope[last] ^= 0x80;
        assert!(matches!(decrypt_chunk(&KEY, &envelope), Err(CodecError::Authentication)));
    }

    #[test]
    fn test_bit_flip_in_nonce_rejected() {
        let mut envelope = encrypt_chunk(&KEY, b"payload bytes").unwrap();
        envelope[0] ^= 0x01;
        assert!(matches!(decrypt_chunk(&KEY, &envelope), Err(CodecError::Authentication)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let envelope = encrypt_chunk(&KEY, b"payload bytes").unwrap();
        let other = [8u8; KEY_SIZE];
        assert!(matches!(decrypt_chunk(&other, &envelope), Err(CodecError::Authentication)));
    }

    #[test]
    fn test_truncated_envelope() {
        assert!(matches!(
            decrypt_chunk(&KEY, &[0u8; 10]),
            Err(CodecError::Truncated(10))
        ));
    }

    #[test]
    fn test_digest_distinguishes_payloads() {
        assert_eq!(digest(b"abc"), digest(b"abc"));
        assert_ne!(digest(b"abc"), digest(b"abd"));
    }
}
