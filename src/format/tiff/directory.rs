//! Forward-only traversal of the IFD chain.
//!
//! Leica SCN containers hold dozens of directories (one per resolution level
//! and channel of every field). Only one directory is held at a time: the
//! stream starts at directory 0 and can only move to the next one.

use std::collections::HashSet;

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{Ifd, TiffHeader};
use super::tags::TiffTag;
use super::validation::DirectoryLayout;
use super::values::ValueReader;

// =============================================================================
// Advance
// =============================================================================

/// Why the directory chain stopped.
#[derive(Debug, Clone)]
pub enum ChainEnd {
    /// Next IFD offset was 0
    Terminated,

    /// Next IFD offset points at a directory already visited
    Loop { offset: u64 },

    /// Next IFD could not be read or parsed
    Unreadable { offset: u64, error: TiffError },
}

/// Outcome of [`DirectoryStream::advance`].
#[derive(Debug, Clone)]
pub enum Advance {
    /// The stream now sits on the next directory
    Directory,
    /// No further directories; the stream stays on the last one
    End(ChainEnd),
}

// =============================================================================
// DirectoryStream
// =============================================================================

/// Cursor over the directories of a TIFF/BigTIFF file.
pub struct DirectoryStream<R> {
    reader: R,
    header: TiffHeader,
    current: Ifd,
    position: u64,
    visited: HashSet<u64>,
}

impl<R: RangeReader> DirectoryStream<R> {
    /// Parse the header and position the stream on directory 0.
    pub async fn open(reader: R) -> Result<Self, TiffError> {
        let header = TiffHeader::read(&reader).await?;
        let current = Ifd::read_at(&reader, &header, header.first_ifd_offset).await?;

        let mut visited = HashSet::new();
        visited.insert(header.first_ifd_offset);

        Ok(Self {
            reader,
            header,
            current,
            position: 0,
            visited,
        })
    }

    pub fn header(&self) -> &TiffHeader {
        &self.header
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// 0-based position of the current directory in the chain.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// The current directory.
    pub fn current(&self) -> &Ifd {
        &self.current
    }

    /// Move to the next directory in the chain.
    pub async fn advance(&mut self) -> Advance {
        let offset = self.current.next_ifd_offset;
        if offset == 0 {
            return Advance::End(ChainEnd::Terminated);
        }
        if !self.visited.insert(offset) {
            return Advance::End(ChainEnd::Loop { offset });
        }

        match Ifd::read_at(&self.reader, &self.header, offset).await {
            Ok(ifd) => {
                self.current = ifd;
                self.position += 1;
                Advance::Directory
            }
            Err(error) => Advance::End(ChainEnd::Unreadable { offset, error }),
        }
    }

    /// ImageDescription of the current directory, if it has one.
    pub async fn image_description(&self) -> Result<Option<String>, TiffError> {
        match self.current.get_entry_by_tag(TiffTag::ImageDescription) {
            Some(entry) => {
                let values = ValueReader::new(&self.reader, &self.header);
                Ok(Some(values.read_string(entry).await?))
            }
            None => Ok(None),
        }
    }

    /// Validated pixel layout of the current directory.
    pub async fn layout(&self) -> Result<DirectoryLayout, TiffError> {
        DirectoryLayout::read(&self.reader, &self.header, &self.current).await
    }

    /// Segment table of the current directory.
    pub async fn segments(&self) -> Result<SegmentTable, TiffError> {
        SegmentTable::load(&self.reader, &self.header, &self.current).await
    }
}

// =============================================================================
// SegmentTable
// =============================================================================

/// File locations of a directory's strips or tiles.
#[derive(Debug, Clone)]
pub struct SegmentTable {
    /// Byte offset of each segment in the file
    pub offsets: Vec<u64>,

    /// Byte count (size) of each segment
    pub byte_counts: Vec<u64>,

    /// JPEGTables data (if present)
    pub jpeg_tables: Option<Bytes>,
}

impl SegmentTable {
    /// Load the tile tables, falling back to strip tables.
    pub async fn load<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let (offsets_tag, counts_tag) = if ifd.is_tiled() {
            (TiffTag::TileOffsets, TiffTag::TileByteCounts)
        } else {
            (TiffTag::StripOffsets, TiffTag::StripByteCounts)
        };

        let values = ValueReader::new(reader, header);

        let offsets_entry = ifd
            .get_entry_by_tag(offsets_tag)
            .ok_or(TiffError::MissingTag(offsets_tag.name()))?;
        let counts_entry = ifd
            .get_entry_by_tag(counts_tag)
            .ok_or(TiffError::MissingTag(counts_tag.name()))?;

        let offsets = values.read_u64_array(offsets_entry).await?;
        let byte_counts = values.read_u64_array(counts_entry).await?;

        if offsets.len() != byte_counts.len() {
            return Err(TiffError::InvalidTagValue {
                tag: offsets_tag.name(),
                message: format!(
                    "{} offsets but {} byte counts",
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match ifd.get_entry_by_tag(TiffTag::JpegTables) {
            Some(entry) => Some(values.read_bytes(entry).await?),
            None => None,
        };

        Ok(SegmentTable {
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Offset and size of segment `index`.
    pub fn location(&self, index: usize) -> Option<(u64, u64)> {
        Some((*self.offsets.get(index)?, *self.byte_counts.get(index)?))
    }
}

// =============================================================================
// Tests
// =============================================================================
