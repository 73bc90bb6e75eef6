//! Container formats.
//!
//! - [`tiff`]: TIFF/BigTIFF structure (header, directory chain, tag values)
//! - [`scn`]: the Leica SCN XML description carried by directory 0
//! - [`jpeg`]: splicing shared `JPEGTables` into abbreviated segments

pub mod jpeg;
pub mod scn;
pub mod tiff;

pub use scn::{Channel, CollectionSize, Selection, SelectionEntry};
