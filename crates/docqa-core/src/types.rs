//! Domain types shared by the loaders, the index and the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub type ChunkId = String;
pub type Meta = BTreeMap<String, String>;

/// Metadata key holding the origin path of a document.
pub const META_SOURCE: &str = "source";
/// Metadata key holding the 0-based page number (PDF only).
pub const META_PAGE: &str = "page";
pub const META_TOTAL_PAGES: &str = "total_pages";
pub const META_CHUNK_INDEX: &str = "chunk_index";

/// Raw text read from one input file (or one page of it).
///
/// - `id`: stable document identity (relative path, plus `#page` for PDFs)
/// - `path`: original path to the source file
/// - `metadata`: loader-specific fields; always carries `source`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub path: PathBuf,
    pub text: String,
    pub metadata: Meta,
}

/// A chunk of a source document that is independently embedded and indexed.
///
/// - `id`: `"<doc_id>:<chunk_index>"`
/// - `doc_id`/`doc_path`: the single source document
/// - `content`: the text payload of the chunk
/// - `chunk_index`/`total_chunks`: position within the parent document
/// - `metadata`: the source document's metadata plus `chunk_index`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: ChunkId,
    pub doc_id: String,
    pub doc_path: String,
    pub content: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub metadata: Meta,
}

/// One attributed source returned with an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub content: String,
    pub metadata: Meta,
    pub score: f32,
}

/// Generated answer plus the chunks it was grounded on, in retrieval order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

/// Truncate `text` to at most `max_chars` characters, appending `...` when cut.
pub fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}
