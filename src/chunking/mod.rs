#[cfg(test)]
mod tests;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Target chunk size, in characters, used when none is configured
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// A line-aligned slice of a file's text, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The chunk text, including the newlines of the lines it holds
    pub text: String,
    /// Zero-based position of this chunk within its file
    pub index: usize,
    /// Number of chunks the file was split into
    pub total: usize,
}

/// Split `text` into chunks of roughly `target_size` characters.
///
/// Lines are never split: a chunk is closed before a line that would push it
/// past `target_size`, unless the chunk is still empty, so a single oversized
/// line becomes a chunk of its own. Concatenating the chunk texts in order
/// gives back `text` exactly.
#[inline]
pub fn split_into_chunks(text: &str, target_size: usize) -> Vec<Chunk> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut current_size = 0;

    for line in text.split_inclusive('\n') {
        // Every line counts its trailing newline, present or not
        let line_size = line.strip_suffix('\n').unwrap_or(line).chars().count() + 1;

        if current_size + line_size > target_size && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
            current_size = 0;
        }

        current.push_str(line);
        current_size += line_size;
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    let total = pieces.len();
    debug!(
        "Split {} bytes into {} chunks (target size {})",
        text.len(),
        total,
        target_size
    );

    pieces
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk { text, index, total })
        .collect()
}

/// Content-addressed identifier for a chunk of a file.
///
/// SHA-256 over the path immediately followed by the chunk text, as 64
/// lowercase hex characters.
#[inline]
pub fn document_id(path: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
