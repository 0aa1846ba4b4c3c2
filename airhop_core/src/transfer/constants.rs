/// Default TCP port for file transfer (must match on both ends)
pub const TRANSFER_PORT: u16 = 3290;

/// Default chunk size (1MB)
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Largest chunk size a receiver will accept from a header (64MB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Slack allowed on top of the chunk size for frame metadata and AEAD overhead
pub const FRAME_SLACK: usize = 64 * 1024;

/// Maximum file name length carried in the header
pub const MAX_FILENAME_LENGTH: usize = 255;
