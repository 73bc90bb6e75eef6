use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use lru::LruCache;
use tokio::sync::Mutex;

use super::range_reader::{check_range, RangeReader};
use crate::error::IoError;

/// Default block size: 256KB
pub const DEFAULT_BLOCK_SIZE: usize = 256 * 1024;

/// Default cache capacity in number of blocks (16MB with default blocks).
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Block-based caching layer that wraps any RangeReader.
///
/// Walking an IFD chain issues many tiny reads (entry counts, entries,
/// out-of-line tag values) clustered near each other. Serving them from
/// fixed-size cached blocks turns them into a handful of file reads.
///
/// Reads of at least one block (strip and tile payloads) go straight to the
/// inner reader: pixel data is read exactly once and would only evict the
/// directory blocks.
pub struct BlockCache<R> {
    /// The underlying reader
    inner: R,
    /// Block size in bytes
    block_size: usize,
    /// Cached blocks indexed by block number
    cache: Mutex<LruCache<u64, Bytes>>,
}

impl<R: RangeReader> BlockCache<R> {
    /// Create a new BlockCache with default block size and capacity.
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY)
    }

    /// Create a new BlockCache with custom block size and capacity.
    ///
    /// Zero values are bumped to 1.
    pub fn with_capacity(inner: R, block_size: usize, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            block_size: block_size.max(1),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    async fn get_block(&self, block_idx: u64) -> Result<Bytes, IoError> {
        let mut cache = self.cache.lock().await;
        if let Some(block) = cache.get(&block_idx) {
            return Ok(block.clone());
        }

        let offset = block_idx * self.block_size as u64;
        let remaining = self.inner.size().saturating_sub(offset);
        let len = std::cmp::min(self.block_size as u64, remaining) as usize;
        let block = self.inner.read_exact_at(offset, len).await?;

        cache.put(block_idx, block.clone());
        Ok(block)
    }
}

#[async_trait]
impl<R: RangeReader> RangeReader for BlockCache<R> {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.inner.size())?;

        if len == 0 {
            return Ok(Bytes::new());
        }
        if len >= self.block_size {
            return self.inner.read_exact_at(offset, len).await;
        }

        let block_size = self.block_size as u64;
        let start_block = offset / block_size;
        let end_block = (offset + len as u64 - 1) / block_size;

        if start_block == end_block {
            let block = self.get_block(start_block).await?;
            let start = (offset % block_size) as usize;
            return Ok(block.slice(start..start + len));
        }

        // A sub-block read straddling a boundary touches exactly two blocks
        let mut result = BytesMut::with_capacity(len);
        let mut cursor = offset;
        for block_idx in start_block..=end_block {
            let block = self.get_block(block_idx).await?;
            let start = (cursor % block_size) as usize;
            let take = std::cmp::min(block.len() - start, len - result.len());
            result.extend_from_slice(&block[start..start + take]);
            cursor += take as u64;
        }

        Ok(result.freeze())
    }

    fn size(&self) -> u64 {
        self.inner.size()
    }

    fn identifier(&self) -> &str {
        self.inner.identifier()
    }
}
