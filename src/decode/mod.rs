//! Directory decoding.
//!
//! A directory is decoded segment by segment (strips or tiles) into a single
//! [`RgbaRaster`]. Each segment is read, decoded and blitted before the next
//! one is fetched, so only one compressed segment is in memory at a time.

mod codec;
mod raster;

pub use codec::{decode_segment, SegmentGeometry};
pub use raster::{RgbaRaster, SegmentPixels};

use crate::error::{DecodeError, TiffError};
use crate::format::tiff::{DirectoryLayout, DirectoryStream};
use crate::io::RangeReader;

/// Decode the current directory of `stream` into an RGBA raster.
pub async fn read_rgba<R: RangeReader>(
    stream: &DirectoryStream<R>,
    layout: &DirectoryLayout,
) -> Result<RgbaRaster, DecodeError> {
    let table = stream.segments().await?;
    let needed = layout.segment_count();
    if table.len() < needed {
        return Err(DecodeError::SegmentCount {
            expected: needed,
            actual: table.len(),
        });
    }

    let mut raster = RgbaRaster::try_new(layout.width, layout.height)?;
    let jpeg_tables = table.jpeg_tables.as_deref();

    for index in 0..needed {
        let (rect, (offset, size)) = match (layout.segment_rect(index), table.location(index)) {
            (Some(rect), Some(location)) => (rect, location),
            _ => {
                return Err(DecodeError::SegmentCount {
                    expected: needed,
                    actual: table.len(),
                })
            }
        };

        if size == 0 {
            return Err(DecodeError::Codec {
                codec: layout.compression.name(),
                segment: index,
                message: "segment has no data".to_string(),
            });
        }
        let size = usize::try_from(size).map_err(|_| DecodeError::Allocation { bytes: usize::MAX })?;
        let data = stream
            .reader()
            .read_exact_at(offset, size)
            .await
            .map_err(TiffError::from)?;

        let geometry = SegmentGeometry {
            index,
            width: rect.width,
            height: rect.height,
        };
        let pixels = decode_segment(layout, geometry, jpeg_tables, &data)?;

        if pixels.width < rect.visible_width || pixels.height < rect.visible_height {
            return Err(DecodeError::SegmentSize {
                segment: index,
                expected_width: rect.width,
                expected_height: rect.height,
                actual_width: pixels.width,
                actual_height: pixels.height,
            });
        }

        raster.blit(&rect, &pixels);
    }

    Ok(raster)
}
