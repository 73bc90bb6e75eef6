//! Pixel layout validation for a single directory.
//!
//! A selected directory must be decodable into an RGBA raster before any
//! segment is fetched. Layouts outside the supported subset are rejected here
//! with an error naming the offending tag.
//!
//! # Supported Subset
//!
//! - **Organization**: tiles or strips
//! - **Compression**: none, JPEG, JPEG 2000 (33003, 33005, 34712)
//! - **Samples**: 8 bits, 1, 3 or 4 samples per pixel, chunky planar configuration
//! - **Photometric**: grey (0, 1), RGB (2), YCbCr (6, compressed data only)

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{Ifd, TiffHeader};
use super::tags::{Compression, TiffTag};
use super::values::ValueReader;

/// Tiles wider or taller than this are legal but unusual enough to log.
const LARGE_TILE_DIMENSION: u32 = 4096;

// =============================================================================
// Photometric
// =============================================================================

/// Colour model of the stored samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Photometric {
    /// Grey, 0 is white
    WhiteIsZero,
    /// Grey, 0 is black
    BlackIsZero,
    Rgb,
    /// Only valid inside JPEG / JPEG 2000 streams, which convert on decode
    YCbCr,
}

impl Photometric {
    fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Photometric::WhiteIsZero),
            1 => Some(Photometric::BlackIsZero),
            2 => Some(Photometric::Rgb),
            6 => Some(Photometric::YCbCr),
            _ => None,
        }
    }
}

// =============================================================================
// Orientation
// =============================================================================

/// Position of the first stored row and column on the displayed image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    LeftTop,
    RightTop,
    RightBottom,
    LeftBottom,
}

impl Orientation {
    /// Values outside 1..=8 fall back to the TIFF default.
    fn from_u16(value: u16) -> Self {
        match value {
            2 => Orientation::TopRight,
            3 => Orientation::BottomRight,
            4 => Orientation::BottomLeft,
            5 => Orientation::LeftTop,
            6 => Orientation::RightTop,
            7 => Orientation::RightBottom,
            8 => Orientation::LeftBottom,
            _ => Orientation::TopLeft,
        }
    }

    /// Flips that put stored pixels into a raster whose origin is the
    /// lower-left corner, as `(mirror_columns, reverse_rows)`.
    ///
    /// Row/column transposition (5..=8) is not applied; those orientations
    /// flip like their non-transposed counterparts.
    pub fn bottom_up_flips(self) -> (bool, bool) {
        match self {
            Orientation::TopLeft | Orientation::LeftTop => (false, true),
            Orientation::TopRight | Orientation::RightTop => (true, true),
            Orientation::BottomRight | Orientation::RightBottom => (true, false),
            Orientation::BottomLeft | Orientation::LeftBottom => (false, false),
        }
    }
}

// =============================================================================
// Segmentation
// =============================================================================

/// How a directory's pixels are cut into independently encoded segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segmentation {
    Tiled { tile_width: u32, tile_height: u32 },
    Stripped { rows_per_strip: u32 },
}

/// Placement of one segment inside the image.
///
/// `width`/`height` are the encoded dimensions. Edge tiles are padded to the
/// full tile size in the file, so the visible part may be smaller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub visible_width: u32,
    pub visible_height: u32,
}

// =============================================================================
// DirectoryLayout
// =============================================================================

/// Validated geometry and encoding of one directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryLayout {
    pub width: u32,
    pub height: u32,
    pub segmentation: Segmentation,
    pub compression: Compression,
    pub samples_per_pixel: u16,
    pub photometric: Photometric,
    pub orientation: Orientation,
}

impl DirectoryLayout {
    /// Read and validate the layout tags of `ifd`.
    ///
    /// BitsPerSample may be stored out of line (three Shorts in classic TIFF),
    /// hence the reader.
    pub async fn read<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
        ifd: &Ifd,
    ) -> Result<Self, TiffError> {
        let bo = header.byte_order;

        let width = required_dimension(ifd, TiffTag::ImageWidth, header)?;
        let height = required_dimension(ifd, TiffTag::ImageLength, header)?;

        let compression_value = ifd.compression(bo).unwrap_or(1);
        let compression = Compression::from_u16(compression_value)
            .filter(|c| c.is_supported())
            .ok_or_else(|| {
                TiffError::UnsupportedCompression(match Compression::from_u16(compression_value) {
                    Some(c) => c.name().to_string(),
                    None => format!("Unknown ({})", compression_value),
                })
            })?;

        let samples_per_pixel = ifd.get_u32(TiffTag::SamplesPerPixel, bo).unwrap_or(1);
        if !matches!(samples_per_pixel, 1 | 3 | 4) {
            return Err(TiffError::UnsupportedLayout(format!(
                "{} samples per pixel",
                samples_per_pixel
            )));
        }

        if let Some(entry) = ifd.get_entry_by_tag(TiffTag::BitsPerSample) {
            let bits = ValueReader::new(reader, header).read_u64_array(entry).await?;
            if let Some(&b) = bits.iter().find(|&&b| b != 8) {
                return Err(TiffError::UnsupportedLayout(format!("{} bits per sample", b)));
            }
        }

        let planar = ifd.get_u32(TiffTag::PlanarConfiguration, bo).unwrap_or(1);
        if planar != 1 && samples_per_pixel > 1 {
            return Err(TiffError::UnsupportedLayout("separate sample planes".to_string()));
        }

        let default_photometric = if samples_per_pixel == 1 { 1 } else { 2 };
        let photometric_value = ifd
            .get_u32(TiffTag::PhotometricInterpretation, bo)
            .unwrap_or(default_photometric) as u16;
        let photometric = Photometric::from_u16(photometric_value).ok_or_else(|| {
            TiffError::UnsupportedLayout(format!("photometric interpretation {}", photometric_value))
        })?;
        check_photometric(photometric, samples_per_pixel as u16, compression)?;

        let orientation = ifd
            .get_u32(TiffTag::Orientation, bo)
            .and_then(|v| u16::try_from(v).ok())
            .map_or(Orientation::TopLeft, Orientation::from_u16);

        let segmentation = if ifd.is_tiled() {
            let tile_width = ifd
                .tile_width(bo)
                .ok_or(TiffError::MissingTag(TiffTag::TileWidth.name()))?;
            let tile_height = ifd
                .tile_height(bo)
                .ok_or(TiffError::MissingTag(TiffTag::TileLength.name()))?;
            if tile_width == 0 || tile_height == 0 {
                return Err(TiffError::InvalidTagValue {
                    tag: "TileWidth/TileLength",
                    message: "Tile dimensions cannot be zero".to_string(),
                });
            }
            if ifd.get_entry_by_tag(TiffTag::TileByteCounts).is_none() {
                return Err(TiffError::MissingTag(TiffTag::TileByteCounts.name()));
            }
            Segmentation::Tiled {
                tile_width,
                tile_height,
            }
        } else if ifd.is_stripped() {
            if ifd.get_entry_by_tag(TiffTag::StripByteCounts).is_none() {
                return Err(TiffError::MissingTag(TiffTag::StripByteCounts.name()));
            }
            // Absent or oversized RowsPerStrip means one strip
            let rows = ifd
                .get_u32(TiffTag::RowsPerStrip, bo)
                .unwrap_or(u32::MAX)
                .min(height);
            if rows == 0 {
                return Err(TiffError::InvalidTagValue {
                    tag: TiffTag::RowsPerStrip.name(),
                    message: "RowsPerStrip cannot be zero".to_string(),
                });
            }
            Segmentation::Stripped {
                rows_per_strip: rows,
            }
        } else {
            return Err(TiffError::MissingTag("TileOffsets/StripOffsets"));
        };

        Ok(DirectoryLayout {
            width,
            height,
            segmentation,
            compression,
            samples_per_pixel: samples_per_pixel as u16,
            photometric,
            orientation,
        })
    }

    /// Non-fatal oddities worth a log line.
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Segmentation::Tiled {
            tile_width,
            tile_height,
        } = self.segmentation
        {
            if tile_width > LARGE_TILE_DIMENSION || tile_height > LARGE_TILE_DIMENSION {
                warnings.push(format!(
                    "Large tile dimensions ({}x{})",
                    tile_width, tile_height
                ));
            }
            if tile_width % 16 != 0 || tile_height % 16 != 0 {
                warnings.push(format!(
                    "Tile dimensions ({}x{}) are not multiples of 16",
                    tile_width, tile_height
                ));
            }
        }
        warnings
    }

    /// Segments per row and per column.
    pub fn segment_grid(&self) -> (u32, u32) {
        match self.segmentation {
            Segmentation::Tiled {
                tile_width,
                tile_height,
            } => (
                self.width.div_ceil(tile_width),
                self.height.div_ceil(tile_height),
            ),
            Segmentation::Stripped { rows_per_strip } => (1, self.height.div_ceil(rows_per_strip)),
        }
    }

    /// Number of segments needed to cover the image.
    pub fn segment_count(&self) -> usize {
        let (across, down) = self.segment_grid();
        across as usize * down as usize
    }

    /// Placement of segment `index`, in row-major order.
    pub fn segment_rect(&self, index: usize) -> Option<SegmentRect> {
        let (across, _) = self.segment_grid();
        if index >= self.segment_count() {
            return None;
        }
        let col = (index % across as usize) as u32;
        let row = (index / across as usize) as u32;

        let (width, height) = match self.segmentation {
            Segmentation::Tiled {
                tile_width,
                tile_height,
            } => (tile_width, tile_height),
            Segmentation::Stripped { rows_per_strip } => (self.width, rows_per_strip),
        };
        let x = col * width;
        let y = row * height;
        let visible_width = width.min(self.width - x);
        let visible_height = height.min(self.height - y);

        // Strips are not padded: the last one only holds the remaining rows
        let height = match self.segmentation {
            Segmentation::Stripped { .. } => visible_height,
            Segmentation::Tiled { .. } => height,
        };

        Some(SegmentRect {
            x,
            y,
            width,
            height,
            visible_width,
            visible_height,
        })
    }
}

fn required_dimension(ifd: &Ifd, tag: TiffTag, header: &TiffHeader) -> Result<u32, TiffError> {
    let value = ifd
        .get_u64(tag, header.byte_order)
        .ok_or(TiffError::MissingTag(tag.name()))?;
    match u32::try_from(value) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(TiffError::InvalidTagValue {
            tag: tag.name(),
            message: format!("{} is not a usable image dimension", value),
        }),
    }
}

fn check_photometric(
    photometric: Photometric,
    samples_per_pixel: u16,
    compression: Compression,
) -> Result<(), TiffError> {
    let ok = match photometric {
        Photometric::WhiteIsZero | Photometric::BlackIsZero => samples_per_pixel == 1,
        Photometric::Rgb => samples_per_pixel >= 3,
        Photometric::YCbCr => samples_per_pixel >= 3 && compression != Compression::None,
    };
    if ok {
        Ok(())
    } else {
        Err(TiffError::UnsupportedLayout(format!(
            "{:?} with {} samples per pixel and {} compression",
            photometric,
            samples_per_pixel,
            compression.name()
        )))
    }
}

// =============================================================================
// Tests
// =============================================================================
