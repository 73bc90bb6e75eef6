//! Abbreviated JPEG segments.
//!
//! JPEG-compressed TIFF directories usually store their quantization (DQT)
//! and Huffman (DHT) tables once, in the `JPEGTables` tag, and leave them out
//! of every strip or tile. Such a segment cannot be decoded on its own: the
//! tables have to be spliced back in right after its SOI marker.
//!
//! ```text
//! JPEGTables: SOI DQT.. DHT.. EOI
//! segment:    SOI SOF0 SOS <scan> EOI
//! complete:   SOI DQT.. DHT.. SOF0 SOS <scan> EOI
//! ```

use std::borrow::Cow;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

/// Markers without a length field
fn is_standalone(code: u8) -> bool {
    matches!(code, 0x01 | 0xD0..=0xD9)
}

// =============================================================================
// Stream Analysis
// =============================================================================

/// Whether the header of `data` (everything before the first SOS) defines a
/// quantization table.
///
/// Returns `false` for data that does not start with SOI.
pub fn has_quantization_tables(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            // Not on a marker: header is corrupt, let the decoder complain
            return false;
        }
        let code = data[pos + 1];
        if code == 0xFF {
            // Fill byte
            pos += 1;
            continue;
        }

        let marker = [0xFF, code];
        if marker == DQT {
            return true;
        }
        if marker == SOS {
            return false;
        }

        if is_standalone(code) {
            pos += 2;
        } else {
            if pos + 3 >= data.len() {
                return false;
            }
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        }
    }

    false
}

// =============================================================================
// Table Splicing
// =============================================================================

/// Body of a JPEGTables blob with its SOI and EOI stripped.
fn tables_body(tables: &[u8]) -> &[u8] {
    let start = if tables.starts_with(&SOI) { 2 } else { 0 };
    let end = if tables.len() >= start + 2 && tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    &tables[start..end]
}

/// Make a strip or tile decodable on its own.
///
/// Segments that already carry their tables, or directories without
/// `JPEGTables`, are passed through untouched.
pub fn complete_segment<'a>(tables: Option<&[u8]>, segment: &'a [u8]) -> Cow<'a, [u8]> {
    let tables = match tables {
        Some(t) if !t.is_empty() => t,
        _ => return Cow::Borrowed(segment),
    };
    if has_quantization_tables(segment) || !segment.starts_with(&SOI) {
        return Cow::Borrowed(segment);
    }

    let body = tables_body(tables);
    let mut out = Vec::with_capacity(segment.len() + body.len());
    out.extend_from_slice(&SOI);
    out.extend_from_slice(body);
    out.extend_from_slice(&segment[2..]);
    Cow::Owned(out)
}

// =============================================================================
// Tests
// =============================================================================
