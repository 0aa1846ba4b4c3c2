use blake3::Hasher;

/// Hex form of a running hash, as carried in `Frame::Complete`
pub fn hex_digest(hasher: &Hasher) -> String {
    hasher.finalize().to_hex().to_string()
}
