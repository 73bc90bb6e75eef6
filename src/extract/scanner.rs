use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::decode;
use crate::error::ExtractError;
use crate::format::tiff::{Advance, ChainEnd, DirectoryStream};
use crate::format::{Selection, SelectionEntry};
use crate::io::RangeReader;

use super::channel::extract_channel;
use super::writer::{plane_path, write_plane};

/// Outcome of a completed scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionReport {
    /// Files written, in traversal order
    pub files: Vec<PathBuf>,

    pub bytes_written: u64,

    /// Directories after directory 0 that the chain reached
    pub directories_visited: u64,

    /// Selection entries whose directory was never reached
    pub unmatched: Vec<SelectionEntry>,
}

impl ExtractionReport {
    pub fn planes_written(&self) -> usize {
        self.files.len()
    }
}

/// Walks a directory stream once and extracts every selected directory.
pub struct DirectoryScanner<'a> {
    selection: &'a Selection,
    output_prefix: &'a Path,
    strict: bool,
}

impl<'a> DirectoryScanner<'a> {
    pub fn new(selection: &'a Selection, output_prefix: &'a Path) -> Self {
        Self {
            selection,
            output_prefix,
            strict: false,
        }
    }

    /// Treat selection entries the chain never reaches as fatal.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Advance `stream` from its current directory to the end of the chain.
    ///
    /// The stream is expected to sit on directory 0, which is never matched.
    pub async fn run<R: RangeReader>(
        &self,
        stream: &mut DirectoryStream<R>,
    ) -> Result<ExtractionReport, ExtractError> {
        let wanted: HashMap<u64, SelectionEntry> = self.selection.by_directory();
        let mut done: HashSet<u64> = HashSet::with_capacity(wanted.len());
        let mut report = ExtractionReport::default();

        loop {
            match stream.advance().await {
                Advance::Directory => {}
                Advance::End(ChainEnd::Terminated) => break,
                Advance::End(ChainEnd::Loop { offset }) => {
                    warn!(
                        offset = offset,
                        position = stream.position(),
                        "Directory chain loops back, stopping traversal"
                    );
                    break;
                }
                Advance::End(ChainEnd::Unreadable { offset, error }) => {
                    warn!(
                        offset = offset,
                        position = stream.position(),
                        "Next directory is unreadable, stopping traversal: {}",
                        error
                    );
                    break;
                }
            }

            report.directories_visited += 1;
            let position = stream.position();
            let Some(entry) = wanted.get(&position) else {
                debug!(directory = position, "Skipping directory");
                continue;
            };

            let (path, bytes) = self.extract(stream, entry).await?;
            report.bytes_written += bytes;
            report.files.push(path);
            done.insert(position);
        }

        report.unmatched = self
            .selection
            .entries
            .iter()
            .filter(|e| !done.contains(&e.directory))
            .copied()
            .collect();

        if !report.unmatched.is_empty() {
            let directories: Vec<u64> = report.unmatched.iter().map(|e| e.directory).collect();
            if self.strict {
                return Err(ExtractError::UnresolvedDirectories(directories));
            }
            warn!(
                visited = report.directories_visited,
                "Selected directories not found in container: {:?}",
                directories
            );
        }

        Ok(report)
    }

    /// Decode, split and write the current directory.
    async fn extract<R: RangeReader>(
        &self,
        stream: &DirectoryStream<R>,
        entry: &SelectionEntry,
    ) -> Result<(PathBuf, u64), ExtractError> {
        let directory = entry.directory;

        let layout = stream
            .layout()
            .await
            .map_err(|e| ExtractError::from_decode(directory, e.into()))?;
        for warning in layout.warnings() {
            warn!(directory = directory, "{}", warning);
        }
        debug!(
            directory = directory,
            width = layout.width,
            height = layout.height,
            compression = layout.compression.name(),
            segments = layout.segment_count(),
            "Decoding directory"
        );

        let plane = {
            let raster = decode::read_rgba(stream, &layout)
                .await
                .map_err(|e| ExtractError::from_decode(directory, e))?;
            extract_channel(&raster, entry.channel, layout.orientation)?
        };

        let path = plane_path(self.output_prefix, entry, layout.width, layout.height);
        let bytes = write_plane(&path, &plane).await?;

        info!(
            directory = directory,
            image = entry.field,
            channel = entry.channel.id(),
            bytes = bytes,
            "Wrote {}",
            path.display()
        );
        Ok((path, bytes))
    }
}
