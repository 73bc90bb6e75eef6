use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::ExtractError;
use crate::format::SelectionEntry;

/// `{prefix}Image{field}_Channel{channel}_X{width}_Y{height}.bin`
///
/// The prefix is used verbatim: `out/slide_` yields `out/slide_Image0_...`,
/// `out/` yields a file inside `out`.
pub fn plane_path(prefix: &Path, entry: &SelectionEntry, width: u32, height: u32) -> PathBuf {
    let mut name = OsString::from(prefix.as_os_str());
    name.push(format!(
        "Image{}_Channel{}_X{}_Y{}.bin",
        entry.field,
        entry.channel.id(),
        width,
        height
    ));
    PathBuf::from(name)
}

/// Write a plane, replacing any existing file. Returns the bytes written.
pub async fn write_plane(path: &Path, plane: &[u8]) -> Result<u64, ExtractError> {
    tokio::fs::write(path, plane)
        .await
        .map_err(|e| ExtractError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    Ok(plane.len() as u64)
}
