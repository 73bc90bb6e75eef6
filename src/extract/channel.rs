use crate::decode::RgbaRaster;
use crate::error::ExtractError;
use crate::format::tiff::Orientation;
use crate::format::Channel;

/// Copy one colour component of every pixel into a one-byte-per-pixel plane.
///
/// The plane has its origin in the lower-left corner: the first row written
/// is the bottom row of the displayed image. `orientation` says where the
/// raster's stored rows and columns sit on that image.
pub fn extract_channel(
    raster: &RgbaRaster,
    channel: Channel,
    orientation: Orientation,
) -> Result<Vec<u8>, ExtractError> {
    let count = raster.pixel_count();
    let mut plane = Vec::new();
    plane
        .try_reserve_exact(count)
        .map_err(|_| ExtractError::Allocation { bytes: count })?;

    let (mirror_columns, reverse_rows) = orientation.bottom_up_flips();
    let offset = channel.offset();
    let height = raster.height() as usize;
    let row_bytes = raster.width() as usize * 4;
    let bytes = raster.as_bytes();

    for y in 0..height {
        let stored = if reverse_rows { height - 1 - y } else { y };
        let samples = bytes[stored * row_bytes..(stored + 1) * row_bytes]
            .chunks_exact(4)
            .map(|px| px[offset]);
        if mirror_columns {
            plane.extend(samples.rev());
        } else {
            plane.extend(samples);
        }
    }
    Ok(plane)
}
