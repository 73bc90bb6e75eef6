//! Container parsing tests over an in-memory reader.
//!
//! These exercise the TIFF layer and the decoder without touching the disk:
//! byte orders, BigTIFF, strip and tile layouts, shared JPEG tables.

use scn_extract::decode::read_rgba;
use scn_extract::format::tiff::{Advance, ChainEnd, Segmentation};
use scn_extract::{ByteOrder, Compression, DirectoryStream, Selection};

use super::test_utils::*;

fn slide(builder: TiffBuilder, ifd: IfdBuilder) -> Vec<u8> {
    let xml = scn_document(1, 1, &[scn_image(&[(2, 2)], &[(0, 0, 1)])]);
    builder
        .add_ifd(IfdBuilder::description(&xml))
        .add_ifd(ifd)
        .build()
}

async fn open(data: Vec<u8>) -> DirectoryStream<TrackingMockReader> {
    DirectoryStream::open(TrackingMockReader::new(data, "mock://slide.scn"))
        .await
        .unwrap()
}

// =============================================================================
// Headers and directory chain
// =============================================================================

#[tokio::test]
async fn test_little_endian_tiff() {
    let img = gradient(8, 8);
    let stream = open(slide(
        TiffBuilder::new(),
        IfdBuilder::uncompressed(&img, Layout::Strips { rows_per_strip: 8 }),
    ))
    .await;

    assert_eq!(stream.header().byte_order, ByteOrder::LittleEndian);
    assert!(!stream.header().is_bigtiff);
    assert_eq!(stream.position(), 0);
}

#[tokio::test]
async fn test_big_endian_bigtiff() {
    let img = gradient(8, 8);
    let stream = open(slide(
        TiffBuilder::new()
            .with_bigtiff(true)
            .with_byte_order(ByteOrderType::BigEndian),
        IfdBuilder::uncompressed(&img, Layout::Strips { rows_per_strip: 8 }),
    ))
    .await;

    assert_eq!(stream.header().byte_order, ByteOrder::BigEndian);
    assert!(stream.header().is_bigtiff);
}

#[tokio::test]
async fn test_description_is_resolvable() {
    let img = gradient(2, 2);
    let stream = open(slide(
        TiffBuilder::new().with_bigtiff(true),
        IfdBuilder::uncompressed(&img, Layout::Strips { rows_per_strip: 2 }),
    ))
    .await;

    let description = stream.image_description().await.unwrap().unwrap();
    assert!(description.starts_with("<?xml"));

    let selection = Selection::resolve(&description).unwrap();
    assert_eq!(selection.entries.len(), 1);
    assert_eq!(selection.entries[0].directory, 1);
}

#[tokio::test]
async fn test_chain_positions_and_end() {
    let img = gradient(4, 4);
    let layout = Layout::Strips { rows_per_strip: 4 };
    let data = TiffBuilder::new()
        .with_byte_order(ByteOrderType::BigEndian)
        .add_ifd(IfdBuilder::description("<scn/>"))
        .add_ifd(IfdBuilder::uncompressed(&img, layout))
        .add_ifd(IfdBuilder::uncompressed(&img, layout))
        .build();
    let mut stream = open(data).await;

    assert!(matches!(stream.advance().await, Advance::Directory));
    assert_eq!(stream.position(), 1);
    assert!(matches!(stream.advance().await, Advance::Directory));
    assert_eq!(stream.position(), 2);
    assert!(stream.image_description().await.unwrap().is_none());
    assert!(matches!(
        stream.advance().await,
        Advance::End(ChainEnd::Terminated)
    ));
    assert_eq!(stream.position(), 2);
}

// =============================================================================
// Layouts and decoding
// =============================================================================

#[tokio::test]
async fn test_tiled_layout_decodes_with_padding_clipped() {
    let img = gradient(20, 10);
    let mut stream = open(slide(
        TiffBuilder::new(),
        IfdBuilder::uncompressed(&img, Layout::Tiles { width: 16, height: 16 }),
    ))
    .await;
    assert!(matches!(stream.advance().await, Advance::Directory));

    let layout = stream.layout().await.unwrap();
    assert_eq!(
        layout.segmentation,
        Segmentation::Tiled {
            tile_width: 16,
            tile_height: 16
        }
    );
    assert_eq!(layout.segment_count(), 2);

    let raster = read_rgba(&stream, &layout).await.unwrap();
    assert_eq!((raster.width(), raster.height()), (20, 10));
    assert_eq!(raster.pixel(19, 9), Some([19, 9, 28, 255]));
    assert_eq!(raster.pixel(0, 0), Some([0, 0, 0, 255]));
}

#[tokio::test]
async fn test_stripped_layout_with_short_last_strip() {
    let img = gradient(6, 7);
    let mut stream = open(slide(
        TiffBuilder::new().with_bigtiff(true),
        IfdBuilder::uncompressed(&img, Layout::Strips { rows_per_strip: 3 }),
    ))
    .await;
    assert!(matches!(stream.advance().await, Advance::Directory));

    let layout = stream.layout().await.unwrap();
    assert_eq!(layout.segment_count(), 3);

    let segments = stream.segments().await.unwrap();
    assert_eq!(segments.len(), 3);
    assert_eq!(segments.location(2).map(|(_, size)| size), Some(6 * 3));

    let raster = read_rgba(&stream, &layout).await.unwrap();
    assert_eq!(raster.pixel(5, 6), Some([5, 6, 11, 255]));
}

#[tokio::test]
async fn test_shared_jpeg_tables() {
    let img = flat(32, 32, [30, 160, 220]);
    let mut stream = open(slide(
        TiffBuilder::new(),
        IfdBuilder::jpeg_with_shared_tables(&img, Layout::Tiles { width: 16, height: 16 }, 95),
    ))
    .await;
    assert!(matches!(stream.advance().await, Advance::Directory));

    let layout = stream.layout().await.unwrap();
    assert_eq!(layout.compression, Compression::Jpeg);

    let segments = stream.segments().await.unwrap();
    assert!(segments.jpeg_tables.is_some());

    let raster = read_rgba(&stream, &layout).await.unwrap();
    for (x, y) in [(0, 0), (15, 15), (16, 0), (31, 31)] {
        let [r, g, b, a] = raster.pixel(x, y).unwrap();
        assert!(r.abs_diff(30) <= 8, "red at {},{}: {}", x, y, r);
        assert!(g.abs_diff(160) <= 8, "green at {},{}: {}", x, y, g);
        assert!(b.abs_diff(220) <= 8, "blue at {},{}: {}", x, y, b);
        assert_eq!(a, 255);
    }
}

#[tokio::test]
async fn test_jpeg_tables_split_round_trip() {
    let jpeg = encode_jpeg(&flat(8, 8, [10, 20, 30]), 90);
    let (tables, stream) = split_jpeg_tables(&jpeg);

    assert!(scn_extract::format::jpeg::has_quantization_tables(&tables));
    assert!(!scn_extract::format::jpeg::has_quantization_tables(&stream));
}

// =============================================================================
// Block cache
// =============================================================================

#[tokio::test]
async fn test_block_cache_coalesces_directory_reads() {
    use scn_extract::BlockCache;

    let img = gradient(16, 16);
    let layout = Layout::Strips { rows_per_strip: 1 };
    let mut builder = TiffBuilder::new().add_ifd(IfdBuilder::description("<scn/>"));
    for _ in 0..8 {
        builder = builder.add_ifd(IfdBuilder::uncompressed(&img, layout));
    }
    let data = builder.build();

    let uncached = {
        let mut stream = open(data.clone()).await;
        while let Advance::Directory = stream.advance().await {
            stream.layout().await.unwrap();
        }
        stream.reader().request_count()
    };

    let cached = {
        let reader = BlockCache::with_capacity(
            TrackingMockReader::new(data, "mock://cached"),
            64 * 1024,
            4,
        );
        let mut stream = DirectoryStream::open(reader).await.unwrap();
        while let Advance::Directory = stream.advance().await {
            stream.layout().await.unwrap();
        }
        stream.reader().inner().request_count()
    };

    assert!(cached < uncached, "cached {} >= uncached {}", cached, uncached);
    assert!(cached <= 2);
}
