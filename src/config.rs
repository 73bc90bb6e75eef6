//! Command-line configuration.
//!
//! Every option can also be set through an environment variable with the
//! `SCN_` prefix:
//!
//! - `SCN_VERBOSE` - Debug logging (default: false)
//! - `SCN_STRICT` - Fail when a selected directory is missing (default: false)
//! - `SCN_BLOCK_SIZE` - Block cache block size in bytes (default: 262144)
//! - `SCN_CACHE_BLOCKS` - Block cache capacity in blocks (default: 64)

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::extract::ExtractOptions;
use crate::io::{DEFAULT_BLOCK_SIZE, DEFAULT_CACHE_CAPACITY};

/// Smallest accepted block size.
pub const MIN_BLOCK_SIZE: usize = 1024;

/// Largest accepted block size.
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Format of `--list` output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListFormat {
    /// One line per plane
    Text,
    /// JSON document with collection and entries
    Json,
}

/// Extract full-resolution channel planes from a Leica SCN400F slide.
///
/// Every selected directory is written as
/// `{OUTPUT_PREFIX}Image{field}_Channel{channel}_X{width}_Y{height}.bin`,
/// raw 8-bit samples without header.
#[derive(Parser, Debug, Clone)]
#[command(name = "scn-extract")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Leica SCN container (TIFF or BigTIFF).
    pub input: PathBuf,

    /// Prepended verbatim to every output file name.
    pub output_prefix: PathBuf,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false, env = "SCN_VERBOSE")]
    pub verbose: bool,

    /// Fail when a selected directory is not present in the container.
    #[arg(long, default_value_t = false, env = "SCN_STRICT")]
    pub strict: bool,

    /// Print the resolved selection and exit without decoding.
    #[arg(long, default_value_t = false)]
    pub list: bool,

    /// Output format for --list.
    #[arg(long, value_enum, default_value_t = ListFormat::Text)]
    pub list_format: ListFormat,

    /// Block size in bytes for the block cache.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE, env = "SCN_BLOCK_SIZE")]
    pub block_size: usize,

    /// Maximum number of blocks to cache.
    #[arg(long, default_value_t = DEFAULT_CACHE_CAPACITY, env = "SCN_CACHE_BLOCKS")]
    pub cache_blocks: usize,
}

impl Config {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.input.as_os_str().is_empty() {
            return Err("INPUT must not be empty".to_string());
        }
        if self.cache_blocks == 0 {
            return Err("cache_blocks must be greater than 0".to_string());
        }
        if self.block_size < MIN_BLOCK_SIZE || self.block_size > MAX_BLOCK_SIZE {
            return Err("block_size must be between 1KB and 16MB".to_string());
        }
        Ok(())
    }

    /// Options for the extraction pipeline.
    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            input: self.input.clone(),
            output_prefix: self.output_prefix.clone(),
            strict: self.strict,
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
