use crate::error::DecodeError;
use crate::format::tiff::SegmentRect;

/// Decoded pixels of one segment, before placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPixels {
    pub width: u32,
    pub height: u32,
    /// Interleaved samples per pixel: 1 (grey), 3 (RGB) or 4 (RGBA)
    pub samples: u8,
    pub data: Vec<u8>,
}

/// A whole directory decoded to RGBA, 4 bytes per pixel, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaRaster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RgbaRaster {
    /// Allocate an opaque black raster.
    ///
    /// A full-resolution SCN plane can run into tens of gigabytes, so the
    /// buffer is reserved fallibly.
    pub fn try_new(width: u32, height: u32) -> Result<Self, DecodeError> {
        let bytes = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(4))
            .ok_or(DecodeError::Allocation { bytes: usize::MAX })?;

        let mut data = Vec::new();
        data.try_reserve_exact(bytes)
            .map_err(|_| DecodeError::Allocation { bytes })?;
        data.extend(std::iter::repeat([0, 0, 0, 255]).take(bytes / 4).flatten());

        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at (x, y).
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = (y as usize * self.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }

    /// Copy the visible part of a decoded segment into place.
    ///
    /// Grey is replicated to R, G and B. A fourth sample is dropped; alpha
    /// stays opaque.
    pub fn blit(&mut self, rect: &SegmentRect, pixels: &SegmentPixels) {
        let samples = pixels.samples as usize;
        let src_stride = pixels.width as usize * samples;
        let dst_stride = self.width as usize * 4;

        let cols = (rect.visible_width.min(pixels.width)) as usize;
        let rows = (rect.visible_height.min(pixels.height)) as usize;

        for row in 0..rows {
            let src = &pixels.data[row * src_stride..row * src_stride + cols * samples];
            let dst_start = (rect.y as usize + row) * dst_stride + rect.x as usize * 4;
            let dst = &mut self.data[dst_start..dst_start + cols * 4];

            for (out, px) in dst.chunks_exact_mut(4).zip(src.chunks_exact(samples)) {
                match samples {
                    1 => {
                        out[0] = px[0];
                        out[1] = px[0];
                        out[2] = px[0];
                    }
                    _ => out[..3].copy_from_slice(&px[..3]),
                }
            }
        }
    }
}
