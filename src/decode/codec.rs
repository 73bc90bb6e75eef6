//! Per-segment codecs.
//!
//! Every codec turns the bytes of one strip or tile into [`SegmentPixels`]
//! with 1, 3 or 4 interleaved 8-bit samples.

use image::{DynamicImage, ImageFormat};

use crate::error::{DecodeError, TiffError};
use crate::format::jpeg::complete_segment;
use crate::format::tiff::{Compression, DirectoryLayout, Photometric};

use super::raster::SegmentPixels;

/// Geometry a segment is expected to decode to.
#[derive(Debug, Clone, Copy)]
pub struct SegmentGeometry {
    pub index: usize,
    pub width: u32,
    pub height: u32,
}

/// Decode one segment according to the directory's compression.
pub fn decode_segment(
    layout: &DirectoryLayout,
    geometry: SegmentGeometry,
    jpeg_tables: Option<&[u8]>,
    data: &[u8],
) -> Result<SegmentPixels, DecodeError> {
    match layout.compression {
        Compression::None => decode_uncompressed(layout, geometry, data),
        Compression::Jpeg => decode_jpeg(geometry, jpeg_tables, data),
        Compression::Jpeg2000YCbCr => decode_jpeg2000(geometry, data, true),
        Compression::Jpeg2000Rgb | Compression::Jpeg2000 => decode_jpeg2000(geometry, data, false),
        other => Err(TiffError::UnsupportedCompression(other.name().to_string()).into()),
    }
}

// =============================================================================
// Uncompressed
// =============================================================================

fn decode_uncompressed(
    layout: &DirectoryLayout,
    geometry: SegmentGeometry,
    data: &[u8],
) -> Result<SegmentPixels, DecodeError> {
    let samples = layout.samples_per_pixel as usize;
    let expected = geometry.width as usize * geometry.height as usize * samples;
    if data.len() < expected {
        return Err(DecodeError::Codec {
            codec: "raw",
            segment: geometry.index,
            message: format!("{} bytes, expected {}", data.len(), expected),
        });
    }

    let mut pixels = data[..expected].to_vec();
    if layout.photometric == Photometric::WhiteIsZero {
        pixels.iter_mut().for_each(|v| *v = 255 - *v);
    }

    Ok(SegmentPixels {
        width: geometry.width,
        height: geometry.height,
        samples: samples as u8,
        data: pixels,
    })
}

// =============================================================================
// JPEG
// =============================================================================

fn decode_jpeg(
    geometry: SegmentGeometry,
    jpeg_tables: Option<&[u8]>,
    data: &[u8],
) -> Result<SegmentPixels, DecodeError> {
    let stream = complete_segment(jpeg_tables, data);

    let img = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg).map_err(|e| {
        DecodeError::Codec {
            codec: "JPEG",
            segment: geometry.index,
            message: e.to_string(),
        }
    })?;

    let (width, height) = (img.width(), img.height());
    let (samples, data) = match img {
        DynamicImage::ImageLuma8(grey) => (1, grey.into_raw()),
        other => (3, other.into_rgb8().into_raw()),
    };

    Ok(SegmentPixels {
        width,
        height,
        samples,
        data,
    })
}

// =============================================================================
// JPEG 2000
// =============================================================================

fn decode_jpeg2000(
    geometry: SegmentGeometry,
    data: &[u8],
    ycbcr: bool,
) -> Result<SegmentPixels, DecodeError> {
    let img = jpeg2k::Image::from_bytes(data).map_err(|e| DecodeError::Codec {
        codec: "JPEG 2000",
        segment: geometry.index,
        message: e.to_string(),
    })?;

    let planes: Vec<ComponentPlane<'_>> = img
        .components()
        .iter()
        .map(|c| ComponentPlane {
            data: c.data(),
            width: c.width(),
            height: c.height(),
            precision: c.precision(),
            signed: c.is_signed(),
        })
        .collect();

    interleave_components(geometry.index, &planes, img.width(), img.height(), ycbcr)
}

/// One decoded JPEG 2000 component, row-major.
#[derive(Debug, Clone, Copy)]
struct ComponentPlane<'a> {
    data: &'a [i32],
    width: u32,
    height: u32,
    precision: u32,
    signed: bool,
}

impl ComponentPlane<'_> {
    /// Scale a sample of any precision to 8 bits.
    fn scale(&self, value: i32) -> u8 {
        let precision = self.precision.min(31);
        let mut v = value;
        if self.signed && precision > 0 {
            v = v.saturating_add(1 << (precision - 1));
        }
        if precision > 8 {
            v >>= precision - 8;
        } else if precision < 8 && precision > 0 {
            v <<= 8 - precision;
        }
        v.clamp(0, 255) as u8
    }

    /// Sample covering image position (x, y) of a `width` x `height` image.
    ///
    /// Subsampled components (4:2:2, 4:2:0 chroma) are upsampled by
    /// nearest neighbour.
    fn sample(&self, x: u32, y: u32, width: u32, height: u32) -> u8 {
        let cx = x as u64 * self.width as u64 / width as u64;
        let cy = y as u64 * self.height as u64 / height as u64;
        self.scale(self.data[(cy * self.width as u64 + cx) as usize])
    }
}

/// Interleave the first one or three components into 8-bit samples.
fn interleave_components(
    segment: usize,
    planes: &[ComponentPlane<'_>],
    width: u32,
    height: u32,
    ycbcr: bool,
) -> Result<SegmentPixels, DecodeError> {
    let codec_error = |message: String| DecodeError::Codec {
        codec: "JPEG 2000",
        segment,
        message,
    };

    let used = match planes.len() {
        1 => 1,
        n if n >= 3 => 3,
        n => return Err(codec_error(format!("{} components", n))),
    };
    for (i, plane) in planes[..used].iter().enumerate() {
        let fits = plane.width > 0
            && plane.height > 0
            && plane.width <= width
            && plane.height <= height
            && plane.data.len() >= plane.width as usize * plane.height as usize;
        if !fits {
            return Err(codec_error(format!(
                "component {} is {}x{} in a {}x{} image",
                i, plane.width, plane.height, width, height
            )));
        }
    }

    let bytes = width as usize * height as usize * used;
    let mut out = Vec::new();
    out.try_reserve_exact(bytes)
        .map_err(|_| DecodeError::Allocation { bytes })?;

    for y in 0..height {
        for x in 0..width {
            if used == 1 {
                out.push(planes[0].sample(x, y, width, height));
                continue;
            }
            let a = planes[0].sample(x, y, width, height);
            let b = planes[1].sample(x, y, width, height);
            let c = planes[2].sample(x, y, width, height);
            if ycbcr {
                out.extend_from_slice(&ycbcr_to_rgb(a, b, c));
            } else {
                out.extend_from_slice(&[a, b, c]);
            }
        }
    }

    Ok(SegmentPixels {
        width,
        height,
        samples: used as u8,
        data: out,
    })
}

/// ITU-R BT.601 full-range conversion, as used by JFIF.
pub(crate) fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;

    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}
