//! Recursive separator-based splitter with character overlap.
//!
//! Text is cut into contiguous *core* pieces of at most `max_size - overlap`
//! characters, trying separators from coarsest to finest. Each emitted chunk is
//! the `overlap` characters preceding its core followed by the core itself, so
//! chunk `i + 1` always opens with the tail of chunk `i`.
use std::ops::Range;

use crate::error::{Error, Result};
use crate::types::{Document, DocumentChunk, META_CHUNK_INDEX};

/// Paragraph, line, sentence, word, then a hard character cut.
pub const DEFAULT_SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

#[derive(Debug, Clone)]
pub struct Chunker {
    max_size: usize,
    overlap: usize,
    separators: Vec<String>,
}

impl Chunker {
    pub fn new(max_size: usize, overlap: usize) -> Result<Self> {
        Self::with_separators(max_size, overlap, DEFAULT_SEPARATORS.iter().map(ToString::to_string).collect())
    }

    /// Use a custom separator list. Without a trailing `""` separator, a token
    /// longer than the core size cannot be cut and is emitted whole.
    pub fn with_separators(max_size: usize, overlap: usize, separators: Vec<String>) -> Result<Self> {
        if max_size == 0 {
            return Err(Error::Configuration("chunk size must be positive".into()));
        }
        if overlap >= max_size {
            return Err(Error::Configuration(format!(
                "chunk overlap ({overlap}) must be smaller than chunk size ({max_size})"
            )));
        }
        Ok(Self { max_size, overlap, separators })
    }

    pub fn max_size(&self) -> usize { self.max_size }

    pub fn overlap(&self) -> usize { self.overlap }

    pub fn split(&self, text: &str) -> Vec<String> {
        self.split_ranges(text).into_iter().map(|r| text[r].to_string()).collect()
    }

    pub fn split_document(&self, doc: &Document) -> Vec<DocumentChunk> {
        let parts = self.split(&doc.text);
        let total_chunks = parts.len();
        let doc_path = doc.path.to_string_lossy().to_string();
        parts
            .into_iter()
            .enumerate()
            .map(|(chunk_index, content)| {
                let mut metadata = doc.metadata.clone();
                metadata.insert(META_CHUNK_INDEX.to_string(), chunk_index.to_string());
                DocumentChunk {
                    id: format!("{}:{}", doc.id, chunk_index),
                    doc_id: doc.id.clone(),
                    doc_path: doc_path.clone(),
                    content,
                    chunk_index,
                    total_chunks,
                    metadata,
                }
            })
            .collect()
    }

    pub fn split_documents(&self, docs: &[Document]) -> Vec<DocumentChunk> {
        docs.iter().flat_map(|d| self.split_document(d)).collect()
    }

    fn split_ranges(&self, text: &str) -> Vec<Range<usize>> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        if char_len(text) <= self.max_size {
            return vec![0..text.len()];
        }
        let step = self.max_size - self.overlap;
        let mut pieces = Vec::new();
        self.segment(text, 0..text.len(), 0, step, &mut pieces);
        merge_pieces(text, pieces, step)
            .into_iter()
            .map(|core| {
                // an unsplittable core is passed through untouched
                if char_len(&text[core.clone()]) > step {
                    core
                } else {
                    back_chars(text, core.start, self.overlap)..core.end
                }
            })
            .collect()
    }

    /// Depth is bounded by the separator count; `""` always terminates.
    fn segment(&self, text: &str, range: Range<usize>, level: usize, step: usize, out: &mut Vec<Range<usize>>) {
        if char_len(&text[range.clone()]) <= step {
            out.push(range);
            return;
        }
        let Some(sep) = self.separators.get(level) else {
            out.push(range);
            return;
        };
        if sep.is_empty() {
            hard_cut(text, range, step, out);
            return;
        }
        let parts = split_keep_separator(&text[range.clone()], sep, range.start);
        if parts.len() == 1 {
            self.segment(text, range, level + 1, step, out);
            return;
        }
        for part in parts {
            self.segment(text, part, level + 1, step, out);
        }
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split on `sep`, keeping each separator attached to the piece before it.
fn split_keep_separator(piece: &str, sep: &str, offset: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, _) in piece.match_indices(sep) {
        let end = i + sep.len();
        if end > start {
            out.push(offset + start..offset + end);
        }
        start = end;
    }
    if start < piece.len() {
        out.push(offset + start..offset + piece.len());
    }
    out
}

fn hard_cut(text: &str, range: Range<usize>, step: usize, out: &mut Vec<Range<usize>>) {
    let mut start = range.start;
    let mut count = 0;
    for (i, _) in text[range.clone()].char_indices() {
        if count == step {
            out.push(start..range.start + i);
            start = range.start + i;
            count = 0;
        }
        count += 1;
    }
    if start < range.end {
        out.push(start..range.end);
    }
}

/// Greedily join adjacent pieces while the joined length stays within `step`.
fn merge_pieces(text: &str, pieces: Vec<Range<usize>>, step: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut current: Option<(Range<usize>, usize)> = None;
    for piece in pieces {
        let len = char_len(&text[piece.clone()]);
        current = match current.take() {
            Some((cur, cur_len)) if cur_len + len <= step => Some((cur.start..piece.end, cur_len + len)),
            Some((cur, _)) => {
                out.push(cur);
                Some((piece, len))
            }
            None => Some((piece, len)),
        };
    }
    if let Some((cur, _)) = current {
        out.push(cur);
    }
    out
}

/// Byte offset `n` characters before `pos`, clamped to the start of `text`.
fn back_chars(text: &str, pos: usize, n: usize) -> usize {
    if n == 0 {
        return pos;
    }
    text[..pos].char_indices().rev().nth(n - 1).map_or(0, |(i, _)| i)
}
