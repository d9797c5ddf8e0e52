//! Fixed-window text chunker with overlap.
//!
//! Splits a document into windows of `chunk_size` characters, advancing the
//! window start by `chunk_size - overlap` until the start reaches the end of
//! the text. Consecutive windows therefore share `overlap` characters, and
//! the final window may be shorter than `chunk_size`.
//!
//! Each chunk gets a deterministic id, `<document_id>_chunk_<n>`, so a
//! reset followed by re-ingestion reproduces the same ids and text. Sizes
//! are counted in characters, not bytes.
//!
//! # Example
//!
//! ```rust
//! use rag_query_core::chunk::{chunk_text, ChunkParams};
//! use rag_query_core::models::Metadata;
//!
//! let text = "x".repeat(2000);
//! let chunks = chunk_text("doc", &text, &Metadata::new(), &ChunkParams::default()).unwrap();
//! assert_eq!(chunks[0].id, "doc_chunk_0");
//! assert_eq!(chunks[1].id, "doc_chunk_1");
//! assert_eq!(chunks[1].text.chars().count(), 1100);
//! ```

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};

use crate::models::{Chunk, Metadata, SourceDocument, META_ID, META_SOURCE};

pub const DEFAULT_CHUNK_SIZE: usize = 1200;
pub const DEFAULT_OVERLAP: usize = 300;

const CHUNK_ID_SEPARATOR: &str = "_chunk_";
const UNKNOWN_DOCUMENT: &str = "Unknown";

/// Window sizing for the chunker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkParams {
    /// Window length in characters.
    pub chunk_size: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
}

impl Default for ChunkParams {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkParams {
    /// Build validated parameters.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let params = Self {
            chunk_size,
            overlap,
        };
        params.validate()?;
        Ok(params)
    }

    /// Rejects sizings that would never advance the window.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be > 0");
        }
        if self.overlap >= self.chunk_size {
            bail!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap,
                self.chunk_size
            );
        }
        Ok(())
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Chunk a [`SourceDocument`] using its id and metadata.
pub fn chunk_document(doc: &SourceDocument, params: &ChunkParams) -> Result<Vec<Chunk>> {
    chunk_text(&doc.id, &doc.text, &doc.metadata, params)
}

/// Split `text` into overlapping windows.
///
/// # Guarantees
///
/// - Empty text yields no chunks.
/// - Sequence numbers are contiguous from 0.
/// - The window starting at `n * step` covers characters
///   `[n * step, min(n * step + chunk_size, len))`.
/// - Every chunk's metadata is `metadata` plus `id`, with `source`
///   defaulted to the document id when absent.
///
/// # Errors
///
/// Fails before producing anything if `params` is invalid or the
/// document id is empty.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    metadata: &Metadata,
    params: &ChunkParams,
) -> Result<Vec<Chunk>> {
    params.validate()?;
    if document_id.is_empty() {
        bail!("document id must not be empty");
    }

    // Byte offset of every character, plus the end of the text.
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_len = boundaries.len() - 1;
    let step = params.step();

    let mut chunks = Vec::with_capacity(char_len.div_ceil(step));
    let mut start = 0usize;
    let mut sequence = 0u64;

    while start < char_len {
        let end = (start + params.chunk_size).min(char_len);
        let window = &text[boundaries[start]..boundaries[end]];
        chunks.push(make_chunk(document_id, sequence, window.trim(), metadata));
        sequence += 1;
        start += step;
    }

    Ok(chunks)
}

/// Format a chunk id.
pub fn chunk_id(document_id: &str, sequence: u64) -> String {
    format!("{}{}{}", document_id, CHUNK_ID_SEPARATOR, sequence)
}

/// Split a chunk id into `(document_id, sequence)`.
///
/// Returns `None` unless the id is exactly `<non-empty>_chunk_<n>` with `n`
/// in canonical decimal form.
pub fn parse_chunk_id(id: &str) -> Option<(&str, u64)> {
    let (document_id, seq) = id.rsplit_once(CHUNK_ID_SEPARATOR)?;
    if document_id.is_empty() || seq.is_empty() || !seq.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sequence: u64 = seq.parse().ok()?;
    if sequence.to_string() != seq {
        return None;
    }
    Some((document_id, sequence))
}

/// Derive a document id from a whole relative path.
///
/// Every character other than ASCII alphanumerics, `-` and `_` becomes
/// `_`: `"sub/notes.md"` becomes `"sub_notes_md"`. Used when two files
/// share a file-name id.
pub fn document_id_from_relative_path(path: &str) -> String {
    let id: String = path
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() {
        UNKNOWN_DOCUMENT.to_string()
    } else {
        id
    }
}

/// Derive a document id from a file path.
///
/// Takes the file name, replaces spaces with `_`, and keeps everything
/// before the first `.`: `"docs/My Report.v2.pdf"` becomes `"My_Report"`.
pub fn document_id_from_path(path: &str) -> String {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let id = file_name.replace(' ', "_");
    let id = id.split('.').next().unwrap_or_default();
    if id.is_empty() {
        UNKNOWN_DOCUMENT.to_string()
    } else {
        id.to_string()
    }
}

fn make_chunk(document_id: &str, sequence: u64, text: &str, metadata: &Metadata) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    let id = chunk_id(document_id, sequence);
    let mut metadata = metadata.clone();
    metadata.insert(META_ID.to_string(), id.clone());
    metadata
        .entry(META_SOURCE.to_string())
        .or_insert_with(|| document_id.to_string());

    Chunk {
        id,
        document_id: document_id.to_string(),
        sequence,
        text: text.to_string(),
        hash,
        metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Whitespace-free text where every character position is recognizable.
    fn letters(len: usize) -> String {
        (0..len).map(|i| (b'a' + (i % 26) as u8) as char).collect()
    }

    fn chunk(text: &str) -> Vec<Chunk> {
        chunk_text("doc", text, &Metadata::new(), &ChunkParams::default()).unwrap()
    }

    #[test]
    fn test_empty_document_has_no_chunks() {
        assert!(chunk("").is_empty());
    }

    #[test]
    fn test_two_thousand_chars() {
        let text = letters(2000);
        let chunks = chunk(&text);

        assert_eq!(chunks[0].id, "doc_chunk_0");
        assert_eq!(chunks[0].text, text[0..1200]);
        assert_eq!(chunks[1].id, "doc_chunk_1");
        assert_eq!(chunks[1].text, text[900..2000]);
        // The loop runs while the window start is inside the text.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text, text[1800..2000]);
    }

    #[test]
    fn test_chunk_count_matches_step() {
        for len in [1, 299, 300, 899, 900, 901, 1200, 1201, 2000, 5000, 9001] {
            let chunks = chunk(&letters(len));
            assert_eq!(chunks.len(), len.div_ceil(900), "len {}", len);
        }
    }

    #[test]
    fn test_consecutive_chunks_share_overlap() {
        let chunks = chunk(&letters(5000));
        for pair in chunks.windows(2) {
            let (a, b) = (&pair[0].text, &pair[1].text);
            if b.len() < 300 {
                continue;
            }
            assert_eq!(&a[900..1200], &b[0..300], "{} -> {}", pair[0].id, pair[1].id);
        }
    }

    #[test]
    fn test_ids_are_sequential() {
        let chunks = chunk(&letters(4000));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.sequence, i as u64);
            assert_eq!(c.id, format!("doc_chunk_{}", i));
            assert_eq!(parse_chunk_id(&c.id), Some(("doc", i as u64)));
        }
    }

    #[test]
    fn test_text_is_trimmed() {
        let text = format!("   {}   ", "word ".repeat(10));
        let chunks = chunk(&text);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.starts_with("word"));
        assert!(chunks[0].text.ends_with("word"));
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        let text = "é".repeat(1000);
        let params = ChunkParams::new(400, 100).unwrap();
        let chunks = chunk_text("doc", &text, &Metadata::new(), &params).unwrap();
        assert_eq!(chunks.len(), 4);
        assert_eq!(chunks[0].text.chars().count(), 400);
        assert_eq!(chunks[3].text.chars().count(), 100);
    }

    #[test]
    fn test_metadata_copied_with_id() {
        let mut meta = Metadata::new();
        meta.insert("source".to_string(), "data/doc.pdf".to_string());
        meta.insert("title".to_string(), "Doc".to_string());
        let chunks = chunk_text("doc", &letters(1000), &meta, &ChunkParams::default()).unwrap();
        assert_eq!(chunks[1].metadata["id"], "doc_chunk_1");
        assert_eq!(chunks[1].metadata["source"], "data/doc.pdf");
        assert_eq!(chunks[1].metadata["title"], "Doc");
    }

    #[test]
    fn test_source_defaults_to_document_id() {
        let chunks = chunk("hello");
        assert_eq!(chunks[0].metadata["source"], "doc");
    }

    #[test]
    fn test_deterministic() {
        let text = letters(3333);
        let a = chunk(&text);
        let b = chunk(&text);
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_params_rejected() {
        assert!(ChunkParams::new(300, 300).is_err());
        assert!(ChunkParams::new(300, 301).is_err());
        assert!(ChunkParams::new(0, 0).is_err());
        let bad = ChunkParams {
            chunk_size: 10,
            overlap: 10,
        };
        assert!(chunk_text("doc", "abc", &Metadata::new(), &bad).is_err());
    }

    #[test]
    fn test_empty_document_id_rejected() {
        assert!(chunk_text("", "abc", &Metadata::new(), &ChunkParams::default()).is_err());
    }

    #[test]
    fn test_parse_chunk_id() {
        assert_eq!(parse_chunk_id("doc_chunk_0"), Some(("doc", 0)));
        assert_eq!(parse_chunk_id("my_doc_chunk_12"), Some(("my_doc", 12)));
        assert_eq!(parse_chunk_id("a_chunk_b_chunk_3"), Some(("a_chunk_b", 3)));
        assert_eq!(parse_chunk_id("doc_chunk_"), None);
        assert_eq!(parse_chunk_id("_chunk_1"), None);
        assert_eq!(parse_chunk_id("doc_chunk_01"), None);
        assert_eq!(parse_chunk_id("doc_chunk_+1"), None);
        assert_eq!(parse_chunk_id("doc-0"), None);
    }

    #[test]
    fn test_document_id_from_relative_path() {
        assert_eq!(document_id_from_relative_path("notes.md"), "notes_md");
        assert_eq!(document_id_from_relative_path("sub/My Notes.v2.txt"), "sub_My_Notes_v2_txt");
        assert_eq!(document_id_from_relative_path("a\\x.pdf"), "a_x_pdf");
        assert_eq!(document_id_from_relative_path(""), "Unknown");
    }

    #[test]
    fn test_document_id_from_path() {
        assert_eq!(document_id_from_path("data/LFH study.pdf"), "LFH_study");
        assert_eq!(document_id_from_path("My Report.v2.pdf"), "My_Report");
        assert_eq!(document_id_from_path("C:\\docs\\notes.txt"), "notes");
        assert_eq!(document_id_from_path("plain"), "plain");
        assert_eq!(document_id_from_path("dir/.hidden"), "Unknown");
    }
}
