use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Positional reads from a container file.
///
/// The TIFF layer only ever asks for "N bytes at offset X", so anything that
/// can answer that (a local file, an in-memory buffer in tests, a cache in
/// front of either) can back a `DirectoryStream`.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Human-readable name of the resource, used in log messages.
    fn identifier(&self) -> &str;
}

/// Reject reads that would run past the end of a resource of `size` bytes.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}
