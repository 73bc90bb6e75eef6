//! Test utilities for integration tests.
//!
//! This module provides an in-memory range reader, a TIFF/BigTIFF builder
//! and helpers for composing Leica SCN descriptions.

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use scn_extract::error::IoError;
use scn_extract::io::RangeReader;

// =============================================================================
// Mock Range Reader with Request Tracking
// =============================================================================

/// A range reader over an in-memory buffer that counts read requests.
pub struct TrackingMockReader {
    data: Bytes,
    identifier: String,
    request_count: Arc<AtomicUsize>,
}

impl TrackingMockReader {
    pub fn new(data: Vec<u8>, identifier: impl Into<String>) -> Self {
        Self {
            data: Bytes::from(data),
            identifier: identifier.into(),
            request_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RangeReader for TrackingMockReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        let start = offset as usize;
        let end = start + len;
        if end > self.data.len() {
            return Err(IoError::RangeOutOfBounds {
                offset,
                requested: len as u64,
                size: self.data.len() as u64,
            });
        }
        Ok(self.data.slice(start..end))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

// =============================================================================
// Test Pixels
// =============================================================================

/// RGB pattern where every channel differs: r = x, g = y, b = x + y.
pub fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Flat-colour image, used where lossy compression must stay within tolerance.
pub fn flat(width: u32, height: u32, colour: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(width, height, Rgb(colour))
}

/// Expected plane for `channel` (0 = red, 1 = green, 2 = blue) of an image
/// stored top row first. Planes are written bottom row first.
pub fn expected_plane(img: &RgbImage, channel: usize) -> Vec<u8> {
    let (width, height) = img.dimensions();
    (0..height)
        .rev()
        .flat_map(|y| (0..width).map(move |x| img.get_pixel(x, y).0[channel]))
        .collect()
}

/// A checked-in file from `tests/fixtures`.
pub fn fixture(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(&path).unwrap_or_else(|e| panic!("{}: {}", path.display(), e))
}

/// Encode an RGB block as a complete JPEG stream.
pub fn encode_jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Split a complete JPEG stream into a `JPEGTables` stream and an abbreviated
/// stream without quantization or Huffman tables.
pub fn split_jpeg_tables(jpeg: &[u8]) -> (Vec<u8>, Vec<u8>) {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG stream");

    let mut tables = vec![0xFF, 0xD8];
    let mut stream = vec![0xFF, 0xD8];
    let mut pos = 2;

    while pos + 4 <= jpeg.len() {
        assert_eq!(jpeg[pos], 0xFF, "expected a marker at {}", pos);
        let marker = jpeg[pos + 1];
        if marker == 0xDA {
            // Start of scan: everything after belongs to the image stream
            stream.extend_from_slice(&jpeg[pos..]);
            break;
        }
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let segment = &jpeg[pos..pos + 2 + len];
        if marker == 0xDB || marker == 0xC4 {
            tables.extend_from_slice(segment);
        } else {
            stream.extend_from_slice(segment);
        }
        pos += 2 + len;
    }

    tables.extend_from_slice(&[0xFF, 0xD9]);
    (tables, stream)
}

// =============================================================================
// TIFF File Builders
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ByteOrderType {
    LittleEndian,
    BigEndian,
}

/// Tag value as written into an IFD entry.
#[derive(Clone, Debug)]
pub enum TagValue {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Long8(Vec<u64>),
    Ascii(String),
    Undefined(Vec<u8>),
}

impl TagValue {
    fn field_type(&self) -> u16 {
        match self {
            TagValue::Short(_) => 3,
            TagValue::Long(_) => 4,
            TagValue::Long8(_) => 16,
            TagValue::Ascii(_) => 2,
            TagValue::Undefined(_) => 7,
        }
    }

    fn count(&self) -> u64 {
        match self {
            TagValue::Short(v) => v.len() as u64,
            TagValue::Long(v) => v.len() as u64,
            TagValue::Long8(v) => v.len() as u64,
            TagValue::Ascii(s) => s.len() as u64 + 1,
            TagValue::Undefined(v) => v.len() as u64,
        }
    }

    fn encode(&self, order: ByteOrderType) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            TagValue::Short(v) => v.iter().for_each(|&x| write_value(&mut out, order, x as u64, 2)),
            TagValue::Long(v) => v.iter().for_each(|&x| write_value(&mut out, order, x as u64, 4)),
            TagValue::Long8(v) => v.iter().for_each(|&x| write_value(&mut out, order, x, 8)),
            TagValue::Ascii(s) => {
                out.extend_from_slice(s.as_bytes());
                out.push(0);
            }
            TagValue::Undefined(v) => out.extend_from_slice(v),
        }
        out
    }
}

/// Pixel data layout of one directory.
#[derive(Clone, Copy, Debug)]
pub enum Layout {
    Strips { rows_per_strip: u32 },
    Tiles { width: u32, height: u32 },
}

/// Builder for creating test TIFF files.
pub struct TiffBuilder {
    byte_order: ByteOrderType,
    is_bigtiff: bool,
    ifds: Vec<IfdBuilder>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self {
            byte_order: ByteOrderType::LittleEndian,
            is_bigtiff: false,
            ifds: Vec::new(),
        }
    }

    pub fn with_byte_order(mut self, order: ByteOrderType) -> Self {
        self.byte_order = order;
        self
    }

    pub fn with_bigtiff(mut self, is_bigtiff: bool) -> Self {
        self.is_bigtiff = is_bigtiff;
        self
    }

    pub fn add_ifd(mut self, ifd: IfdBuilder) -> Self {
        self.ifds.push(ifd);
        self
    }

    /// Build the TIFF file data.
    ///
    /// Each directory's segments are written first, followed by the IFD and
    /// the tag values that do not fit inline. The previous next-IFD pointer
    /// (or the header pointer) is patched once the IFD position is known.
    pub fn build(self) -> Vec<u8> {
        let order = self.byte_order;
        let offset_size = if self.is_bigtiff { 8 } else { 4 };
        let count_size = if self.is_bigtiff { 8 } else { 2 };
        let entry_size = if self.is_bigtiff { 20 } else { 12 };

        let mut data = Vec::new();
        match order {
            ByteOrderType::LittleEndian => data.extend_from_slice(b"II"),
            ByteOrderType::BigEndian => data.extend_from_slice(b"MM"),
        }
        if self.is_bigtiff {
            write_value(&mut data, order, 43, 2);
            write_value(&mut data, order, 8, 2);
            write_value(&mut data, order, 0, 2);
        } else {
            write_value(&mut data, order, 42, 2);
        }
        let mut next_pointer = data.len();
        write_value(&mut data, order, 0, offset_size);

        for ifd in &self.ifds {
            let mut segment_offsets = Vec::with_capacity(ifd.segments.len());
            for segment in &ifd.segments {
                pad_to_word(&mut data);
                segment_offsets.push(data.len() as u64);
                data.extend_from_slice(segment);
            }

            let mut entries = ifd.entries.clone();
            if let Some((offsets_tag, counts_tag)) = ifd.segment_tags {
                let counts: Vec<u64> = ifd.segments.iter().map(|s| s.len() as u64).collect();
                entries.push((offsets_tag, self.offsets_value(&segment_offsets)));
                entries.push((counts_tag, self.offsets_value(&counts)));
            }
            entries.sort_by_key(|(tag, _)| *tag);

            pad_to_word(&mut data);
            let ifd_start = data.len() as u64;
            patch_value(&mut data, order, next_pointer, ifd_start, offset_size);

            let ifd_len = count_size + entries.len() * entry_size + offset_size;
            let mut external_offset = ifd_start + ifd_len as u64;
            let mut external = Vec::new();

            write_value(&mut data, order, entries.len() as u64, count_size);
            for (tag, value) in &entries {
                let bytes = value.encode(order);
                write_value(&mut data, order, *tag as u64, 2);
                write_value(&mut data, order, value.field_type() as u64, 2);
                write_value(&mut data, order, value.count(), offset_size);
                if bytes.len() <= offset_size {
                    let mut inline = bytes;
                    inline.resize(offset_size, 0);
                    data.extend_from_slice(&inline);
                } else {
                    write_value(&mut data, order, external_offset, offset_size);
                    external_offset += bytes.len() as u64;
                    external.extend_from_slice(&bytes);
                    if external.len() % 2 == 1 {
                        external.push(0);
                        external_offset += 1;
                    }
                }
            }
            next_pointer = data.len();
            write_value(&mut data, order, 0, offset_size);
            data.extend_from_slice(&external);
        }

        data
    }

    fn offsets_value(&self, values: &[u64]) -> TagValue {
        if self.is_bigtiff {
            TagValue::Long8(values.to_vec())
        } else {
            TagValue::Long(values.iter().map(|&v| v as u32).collect())
        }
    }
}

impl Default for TiffBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one image file directory.
#[derive(Clone, Default)]
pub struct IfdBuilder {
    entries: Vec<(u16, TagValue)>,
    segments: Vec<Vec<u8>>,
    segment_tags: Option<(u16, u16)>,
}

impl IfdBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag entry.
    pub fn add_entry(mut self, tag: u16, value: TagValue) -> Self {
        self.entries.retain(|(t, _)| *t != tag);
        self.entries.push((tag, value));
        self
    }

    /// Directory 0 of an SCN file: a small thumbnail carrying the description.
    pub fn description(xml: &str) -> Self {
        Self::uncompressed(&flat(2, 2, [0, 0, 0]), Layout::Strips { rows_per_strip: 2 })
            .add_entry(270, TagValue::Ascii(xml.to_string()))
    }

    /// Uncompressed RGB directory.
    pub fn uncompressed(img: &RgbImage, layout: Layout) -> Self {
        let segments = cut_segments(img, layout)
            .into_iter()
            .map(|block| block.into_raw())
            .collect();
        Self::with_segments(img, layout, 1, 2, segments)
    }

    /// JPEG-compressed directory, each segment a complete JPEG stream.
    pub fn jpeg(img: &RgbImage, layout: Layout, quality: u8) -> Self {
        let segments = cut_segments(img, layout)
            .iter()
            .map(|block| encode_jpeg(block, quality))
            .collect();
        Self::with_segments(img, layout, 7, 6, segments)
    }

    /// JPEG-compressed directory with quantization and Huffman tables moved
    /// into a shared `JPEGTables` tag.
    pub fn jpeg_with_shared_tables(img: &RgbImage, layout: Layout, quality: u8) -> Self {
        let mut tables = None;
        let segments = cut_segments(img, layout)
            .iter()
            .map(|block| {
                let (t, stream) = split_jpeg_tables(&encode_jpeg(block, quality));
                tables.get_or_insert(t);
                stream
            })
            .collect();
        let builder = Self::with_segments(img, layout, 7, 6, segments);
        match tables {
            Some(t) => builder.add_entry(347, TagValue::Undefined(t)),
            None => builder,
        }
    }

    /// JPEG 2000 directory stored as a single strip holding `codestream`.
    pub fn jpeg2000(width: u32, height: u32, compression: u16, codestream: Vec<u8>) -> Self {
        let img = flat(width, height, [0, 0, 0]);
        let layout = Layout::Strips {
            rows_per_strip: height,
        };
        Self::with_segments(&img, layout, compression, 2, vec![codestream])
    }

    fn with_segments(
        img: &RgbImage,
        layout: Layout,
        compression: u16,
        photometric: u16,
        segments: Vec<Vec<u8>>,
    ) -> Self {
        let builder = Self {
            entries: Vec::new(),
            segments,
            segment_tags: None,
        }
        .add_entry(256, TagValue::Long(vec![img.width()]))
        .add_entry(257, TagValue::Long(vec![img.height()]))
        .add_entry(258, TagValue::Short(vec![8, 8, 8]))
        .add_entry(259, TagValue::Short(vec![compression]))
        .add_entry(262, TagValue::Short(vec![photometric]))
        .add_entry(277, TagValue::Short(vec![3]))
        .add_entry(284, TagValue::Short(vec![1]));

        match layout {
            Layout::Strips { rows_per_strip } => Self {
                segment_tags: Some((273, 279)),
                ..builder.add_entry(278, TagValue::Long(vec![rows_per_strip]))
            },
            Layout::Tiles { width, height } => Self {
                segment_tags: Some((324, 325)),
                ..builder
                    .add_entry(322, TagValue::Long(vec![width]))
                    .add_entry(323, TagValue::Long(vec![height]))
            },
        }
    }
}

/// Cut an image into strips (unpadded) or tiles (padded with black).
fn cut_segments(img: &RgbImage, layout: Layout) -> Vec<RgbImage> {
    let (width, height) = img.dimensions();
    let (seg_w, seg_h, padded) = match layout {
        Layout::Strips { rows_per_strip } => (width, rows_per_strip.min(height), false),
        Layout::Tiles {
            width: tile_w,
            height: tile_h,
        } => (tile_w, tile_h, true),
    };

    let mut segments = Vec::new();
    let mut y = 0;
    while y < height {
        let mut x = 0;
        while x < width {
            let visible_w = seg_w.min(width - x);
            let visible_h = seg_h.min(height - y);
            let (w, h) = if padded { (seg_w, seg_h) } else { (visible_w, visible_h) };
            segments.push(RgbImage::from_fn(w, h, |dx, dy| {
                if dx < visible_w && dy < visible_h {
                    *img.get_pixel(x + dx, y + dy)
                } else {
                    Rgb([0, 0, 0])
                }
            }));
            x += seg_w;
        }
        y += seg_h;
    }
    segments
}

fn pad_to_word(data: &mut Vec<u8>) {
    if data.len() % 2 == 1 {
        data.push(0);
    }
}

fn write_value(data: &mut Vec<u8>, byte_order: ByteOrderType, value: u64, size: usize) {
    match byte_order {
        ByteOrderType::LittleEndian => match size {
            1 => data.push(value as u8),
            2 => data.extend(&(value as u16).to_le_bytes()),
            4 => data.extend(&(value as u32).to_le_bytes()),
            8 => data.extend(&value.to_le_bytes()),
            _ => {}
        },
        ByteOrderType::BigEndian => match size {
            1 => data.push(value as u8),
            2 => data.extend(&(value as u16).to_be_bytes()),
            4 => data.extend(&(value as u32).to_be_bytes()),
            8 => data.extend(&value.to_be_bytes()),
            _ => {}
        },
    }
}

fn patch_value(data: &mut [u8], byte_order: ByteOrderType, at: usize, value: u64, size: usize) {
    let mut bytes = Vec::with_capacity(size);
    write_value(&mut bytes, byte_order, value, size);
    data[at..at + size].copy_from_slice(&bytes);
}

// =============================================================================
// SCN Descriptions
// =============================================================================

pub const SCN_NAMESPACE: &str = "http://www.leica-microsystems.com/scn/2010/10/01";

/// One `<image>` element: its views and its `(r, c, ifd)` dimensions.
pub fn scn_image(views: &[(u32, u32)], dimensions: &[(u32, u32, u64)]) -> String {
    let views: String = views
        .iter()
        .map(|(x, y)| {
            format!(
                r#"<view sizeX="{}" sizeY="{}" offsetX="0" offsetY="0" spacingZ="0"/>"#,
                x, y
            )
        })
        .collect();
    let dimensions: String = dimensions
        .iter()
        .map(|(r, c, ifd)| {
            format!(
                r#"<dimension sizeX="64" sizeY="64" r="{}" c="{}" ifd="{}"/>"#,
                r, c, ifd
            )
        })
        .collect();
    format!(
        r#"<image name="field" uuid="urn:uuid:test">
      <creationDate>2012-01-01T00:00:00Z</creationDate>
      <device model="Leica SCN400F" version="1.4.0"/>
      <pixels sizeX="64" sizeY="64">{}</pixels>
      {}
      <scanSettings>
        <channelSettings>
          <channel index="0" name="DAPI"/>
          <channel index="1" name="FITC"/>
          <channel index="2" name="Cy5"/>
        </channelSettings>
      </scanSettings>
    </image>"#,
        dimensions, views
    )
}

/// Complete SCN document for a collection of the given overview size.
pub fn scn_document(size_x: u32, size_y: u32, images: &[String]) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<scn xmlns="{}">
  <collection name="slide" uuid="urn:uuid:collection" sizeX="{}" sizeY="{}">
    <barcode>TEST</barcode>
    {}
  </collection>
</scn>"#,
        SCN_NAMESPACE,
        size_x,
        size_y,
        images.join("\n    ")
    )
}

// =============================================================================
// Files
// =============================================================================

/// Write `data` as `slide.scn` inside `dir`.
pub fn write_container(dir: &Path, data: &[u8]) -> PathBuf {
    let path = dir.join("slide.scn");
    std::fs::write(&path, data).unwrap();
    path
}

/// Output prefix inside `dir`, with a file-name stem.
pub fn prefix_in(dir: &Path) -> PathBuf {
    let mut prefix = dir.as_os_str().to_owned();
    prefix.push("/run_");
    PathBuf::from(prefix)
}

/// Sorted list of `.bin` files in `dir`.
pub fn bin_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".bin"))
        .collect();
    names.sort();
    names
}
