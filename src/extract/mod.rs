//! Extraction pipeline.
//!
//! ```text
//! open container -> directory 0 description -> Selection
//!     -> walk directories 1.. once -> decode -> channel -> .bin file
//! ```

mod channel;
mod scanner;
mod writer;

pub use channel::extract_channel;
pub use scanner::{DirectoryScanner, ExtractionReport};
pub use writer::{plane_path, write_plane};

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ExtractError, MetadataError, TiffError};
use crate::format::tiff::DirectoryStream;
use crate::format::Selection;
use crate::io::{BlockCache, FileRangeReader, RangeReader, DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};

/// Settings for one extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub input: PathBuf,
    pub output_prefix: PathBuf,
    pub strict: bool,
    pub block_size: usize,
    pub cache_blocks: usize,
}

impl ExtractOptions {
    pub fn new(input: impl Into<PathBuf>, output_prefix: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output_prefix: output_prefix.into(),
            strict: false,
            block_size: DEFAULT_BLOCK_SIZE,
            cache_blocks: DEFAULT_CACHE_CAPACITY,
        }
    }
}

/// Container stream over a cached local file.
pub type ContainerStream = DirectoryStream<BlockCache<FileRangeReader>>;

/// Open `path` and position a stream on directory 0.
pub async fn open_container(
    path: &Path,
    block_size: usize,
    cache_blocks: usize,
) -> Result<ContainerStream, ExtractError> {
    let container_error = |source: TiffError| ExtractError::ContainerOpen {
        path: path.display().to_string(),
        source,
    };

    let file = FileRangeReader::open(path)
        .await
        .map_err(|e| container_error(e.into()))?;
    let reader = BlockCache::with_capacity(file, block_size, cache_blocks);
    DirectoryStream::open(reader).await.map_err(container_error)
}

/// Resolve the slide description carried by the current (first) directory.
pub async fn resolve_selection<R: RangeReader>(
    stream: &DirectoryStream<R>,
) -> Result<Selection, ExtractError> {
    let description = stream
        .image_description()
        .await
        .map_err(|e| MetadataError::UnreadableDescription(e.to_string()))?
        .ok_or(MetadataError::MissingDescription)?;

    let selection = Selection::resolve(&description)?;
    info!(
        size_x = selection.collection.size_x,
        size_y = selection.collection.size_y,
        images = selection.images_seen,
        accepted = selection.images_accepted,
        planes = selection.entries.len(),
        "Resolved slide description"
    );
    if !selection.channel_names.is_empty() {
        info!("Channels: {}", selection.channel_names.join(", "));
    }
    Ok(selection)
}

/// Open the container and resolve its selection without decoding anything.
pub async fn inspect(options: &ExtractOptions) -> Result<Selection, ExtractError> {
    let stream = open_container(&options.input, options.block_size, options.cache_blocks).await?;
    resolve_selection(&stream).await
}

/// Full extraction run.
pub async fn run(options: &ExtractOptions) -> Result<ExtractionReport, ExtractError> {
    let mut stream =
        open_container(&options.input, options.block_size, options.cache_blocks).await?;
    let header = stream.header();
    info!(
        path = %options.input.display(),
        bigtiff = header.is_bigtiff,
        byte_order = ?header.byte_order,
        "Opened container"
    );

    let selection = resolve_selection(&stream).await?;

    let report = DirectoryScanner::new(&selection, &options.output_prefix)
        .strict(options.strict)
        .run(&mut stream)
        .await?;

    info!(
        planes = report.planes_written(),
        bytes = report.bytes_written,
        directories = report.directories_visited,
        unmatched = report.unmatched.len(),
        "Extraction complete"
    );
    Ok(report)
}
