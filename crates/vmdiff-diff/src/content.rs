//! Content inspection: binary/text classification, bounded reads and
//! whole-stream hashing of file entries.

use std::io::{self, Read};

use tracing::warn;
use vmdiff_types::FileEntry;

use crate::hasher::{ContentHasher, Digest};

/// Entities larger than this are never line-diffed.
pub const MAX_DIFF_SIZE: u64 = 2 * 1024 * 1024;

/// How many leading bytes the binary heuristic inspects.
pub const SNIFF_LEN: usize = 512;

/// Stand-in line for a binary side in a text comparison.
pub const BINARY_PLACEHOLDER: &str = "<Binary file>";

/// Returns `true` for bytes that never appear in text: C0 controls other
/// than BEL, BS, TAB, LF, FF, CR and ESC, plus DEL.
fn is_control_byte(b: u8) -> bool {
    matches!(b, 0..=6 | 11 | 14..=26 | 28..=31 | 0x7f)
}

/// Classify a content prefix.
///
/// Binary if the prefix is not UTF-8 (a multi-byte sequence cut off by the
/// prefix boundary is tolerated) or contains any control byte.
pub fn looks_binary(header: &[u8]) -> bool {
    let valid = match std::str::from_utf8(header) {
        Ok(_) => header,
        Err(e) if e.error_len().is_none() => &header[..e.valid_up_to()],
        Err(_) => return true,
    };
    valid.iter().copied().any(is_control_byte)
}

/// Read up to `limit` bytes, retrying short reads.
fn read_prefix(reader: &mut dyn Read, limit: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    reader.take(limit as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Classify an entry as binary by sniffing its first [`SNIFF_LEN`] bytes.
///
/// Entries without a data stream are text. An unreadable stream is logged and
/// treated as binary.
pub fn is_binary<E: FileEntry + ?Sized>(entry: &E, key: &str) -> bool {
    let sniffed = entry
        .open()
        .and_then(|stream| stream.map(|mut s| read_prefix(&mut *s, SNIFF_LEN)).transpose());
    match sniffed {
        Ok(Some(header)) => looks_binary(&header),
        Ok(None) => false,
        Err(e) => {
            warn!(key, error = %e, "failed to read entry; treating as binary");
            true
        }
    }
}

/// Hash an entry's whole data stream.
///
/// Devices, pipes and sockets are never read. Returns `None` when there is no
/// stream to hash or it cannot be read.
pub fn hash_entry<E: FileEntry + ?Sized>(entry: &E, key: &str) -> Option<Digest> {
    if entry.is_device() || entry.is_pipe() || entry.is_socket() {
        return None;
    }
    let mut stream = match entry.open() {
        Ok(Some(stream)) => stream,
        Ok(None) => return None,
        Err(e) => {
            warn!(key, error = %e, "unable to open entry for hashing");
            return None;
        }
    };
    match ContentHasher::CONTENT.hash_reader(&mut *stream) {
        Ok(digest) => Some(digest),
        Err(e) => {
            warn!(key, error = %e, "unable to read entry for hashing");
            None
        }
    }
}

/// Split decoded text into lines, keeping empty lines and `\r`.
pub fn split_lines(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let trimmed = text.strip_suffix('\n').unwrap_or(text);
    trimmed.split('\n').map(str::to_string).collect()
}

/// The content of an entry as text lines for line diffing.
///
/// At most [`MAX_DIFF_SIZE`] bytes are read; invalid UTF-8 is replaced. A
/// binary entry becomes the single [`BINARY_PLACEHOLDER`] line.
pub fn content_lines<E: FileEntry + ?Sized>(entry: &E, key: &str, binary: bool) -> Vec<String> {
    if binary {
        return vec![BINARY_PLACEHOLDER.to_string()];
    }
    let data = entry.open().and_then(|stream| {
        stream
            .map(|mut s| read_prefix(&mut *s, MAX_DIFF_SIZE as usize))
            .transpose()
    });
    match data {
        Ok(Some(bytes)) => split_lines(&String::from_utf8_lossy(&bytes)),
        Ok(None) => Vec::new(),
        Err(e) => {
            warn!(key, error = %e, "failed to read entry contents");
            Vec::new()
        }
    }
}
