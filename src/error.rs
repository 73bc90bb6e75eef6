use std::path::PathBuf;

use thiserror::Error;

/// I/O errors that can occur when reading the container file
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error reported by the operating system
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// File not found
    #[error("File not found: {0}")]
    NotFound(String),
}

/// Errors that can occur when parsing TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Compression scheme without a decoder
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Pixel layout the decoder cannot handle
    #[error("Unsupported pixel layout: {0}")]
    UnsupportedLayout(String),

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),
}

/// Errors raised while resolving the embedded slide description
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// First directory has no ImageDescription tag
    #[error("First directory carries no ImageDescription")]
    MissingDescription,

    /// ImageDescription is present but cannot be read as text
    #[error("Unreadable ImageDescription: {0}")]
    UnreadableDescription(String),

    /// XML syntax error
    #[error("Malformed XML at byte {position}: {message}")]
    Xml { position: u64, message: String },

    /// Required element is absent
    #[error("Missing <{0}> element")]
    MissingElement(&'static str),

    /// Element that must be unique appears more than once
    #[error("Unexpected second <{0}> element")]
    DuplicateElement(&'static str),

    /// Required attribute is absent
    #[error("<{element}> is missing attribute '{attribute}'")]
    MissingAttribute {
        element: &'static str,
        attribute: &'static str,
    },

    /// Attribute is present but not a valid number
    #[error("<{element}> attribute '{attribute}' is not a valid number: '{value}'")]
    InvalidAttribute {
        element: &'static str,
        attribute: &'static str,
        value: String,
    },

    /// Channel id outside of 0..=2
    #[error("Unsupported channel id {0} (expected 0, 1 or 2)")]
    InvalidChannel(u64),

    /// Two selected planes point at the same directory
    #[error("Directory {0} is referenced by more than one full-resolution dimension")]
    DuplicateDirectory(u64),
}

/// Errors raised while turning a directory's segments into a raster
#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    /// TIFF structure error while locating segments
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Codec rejected the segment data
    #[error("{codec} decode failed for segment {segment}: {message}")]
    Codec {
        codec: &'static str,
        segment: usize,
        message: String,
    },

    /// Decoded segment disagrees with the directory geometry
    #[error("Segment {segment} decoded to {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    SegmentSize {
        segment: usize,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    /// Segment count does not cover the image
    #[error("Expected {expected} segments, directory lists {actual}")]
    SegmentCount { expected: usize, actual: usize },

    /// Working buffer could not be reserved
    #[error("Could not allocate {bytes} bytes")]
    Allocation { bytes: usize },
}

/// Fatal errors of an extraction run.
///
/// Each variant maps onto one documented process exit code.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Input could not be opened as a TIFF/BigTIFF container
    #[error("Could not open container {path}: {source}")]
    ContainerOpen {
        path: String,
        #[source]
        source: TiffError,
    },

    /// Embedded description could not be resolved
    #[error("Could not parse slide description: {0}")]
    MetadataParse(#[from] MetadataError),

    /// A selected directory could not be decoded
    #[error("Could not read image from directory {directory}: {source}")]
    ImageRead {
        directory: u64,
        #[source]
        source: DecodeError,
    },

    /// Working buffer could not be allocated
    #[error("Could not allocate {bytes} bytes for image")]
    Allocation { bytes: usize },

    /// Selected directories that the container never reached
    #[error("Selected directories not present in container: {0:?}")]
    UnresolvedDirectories(Vec<u64>),

    /// Plane could not be written
    #[error("Could not write {path}: {message}")]
    Write { path: PathBuf, message: String },
}

impl ExtractError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            ExtractError::ContainerOpen { .. } => 1,
            ExtractError::MetadataParse(_) => 2,
            ExtractError::ImageRead { .. } | ExtractError::UnresolvedDirectories(_) => 3,
            ExtractError::Allocation { .. } => 4,
            ExtractError::Write { .. } => 5,
        }
    }

    /// Wrap a decode failure, promoting allocation failures to their own kind.
    pub fn from_decode(directory: u64, source: DecodeError) -> Self {
        match source {
            DecodeError::Allocation { bytes } => ExtractError::Allocation { bytes },
            source => ExtractError::ImageRead { directory, source },
        }
    }
}
