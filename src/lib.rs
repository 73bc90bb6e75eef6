//! # scn-extract
//!
//! Extracts the full-resolution fluorescence planes of a Leica SCN400F slide
//! into raw one-byte-per-pixel files.
//!
//! An SCN file is a TIFF or BigTIFF container. Directory 0 carries an XML
//! description listing every imaged field, its resolution views and the
//! directory that holds each (resolution, channel) pair. The extractor
//! resolves that description once, walks the directory chain forward once,
//! and writes one plane per selected directory.
//!
//! ## Architecture
//!
//! - [`io`] - Range reads over local files with an LRU block cache
//! - [`mod@format`] - TIFF structure, SCN metadata resolution, JPEG tables
//! - [`decode`] - Segment decoding (raw, JPEG, JPEG 2000) into RGBA rasters
//! - [`extract`] - Directory scanning, channel extraction, plane output
//! - [`config`] - Command-line configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use scn_extract::{extract, ExtractOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = ExtractOptions::new("slide.scn", "out/slide_");
//!     match extract::run(&options).await {
//!         Ok(report) => println!("{} planes written", report.planes_written()),
//!         Err(e) => std::process::exit(e.exit_code() as i32),
//!     }
//! }
//! ```

pub mod config;
pub mod decode;
pub mod error;
pub mod extract;
pub mod format;
pub mod io;

// Re-export commonly used types
pub use config::{Config, ListFormat};
pub use decode::{read_rgba, RgbaRaster};
pub use error::{DecodeError, ExtractError, IoError, MetadataError, TiffError};
pub use extract::{
    extract_channel, plane_path, write_plane, DirectoryScanner, ExtractOptions, ExtractionReport,
};
pub use format::tiff::{
    Advance, ByteOrder, ChainEnd, Compression, DirectoryLayout, DirectoryStream, Orientation,
    TiffHeader,
};
pub use format::{Channel, CollectionSize, Selection, SelectionEntry};
pub use io::{BlockCache, FileRangeReader, RangeReader};
