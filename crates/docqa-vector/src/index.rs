//! In-memory vector index over (vector, chunk) entries.
//!
//! Search is an exact scan under cosine similarity (higher is better).
//! Results are ordered by score descending, ties by ascending entry id.
use std::cmp::Ordering;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use docqa_core::traits::Embedder;
use docqa_core::types::DocumentChunk;
use docqa_core::{Error, Result};

pub const METRIC: &str = "cosine";
const EMBED_BATCH: usize = 100;

static BUILD_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: u32,
    pub vector: Vec<f32>,
    pub chunk: DocumentChunk,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub entry_id: u32,
    pub score: f32,
    pub chunk: DocumentChunk,
}

/// Immutable once built; shared read-only between queries.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    norms: Vec<f32>,
    dim: usize,
    embedder_id: String,
    build_id: String,
}

impl VectorIndex {
    /// Embed every chunk and assemble a new index. Entry ids follow chunk order.
    pub async fn build(chunks: Vec<DocumentChunk>, embedder: &dyn Embedder) -> Result<Self> {
        if chunks.is_empty() {
            return Err(Error::InvalidInput("cannot build an index from zero chunks".into()));
        }
        if chunks.len() > u32::MAX as usize {
            return Err(Error::InvalidInput(format!("too many chunks: {}", chunks.len())));
        }
        let pb = ProgressBar::new(chunks.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%) {msg}")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_message("embedding");

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = embedder.embed_batch(&texts).await?;
            if embedded.len() != texts.len() {
                pb.abandon();
                return Err(Error::InvalidInput(format!(
                    "embedder returned {} vectors for {} chunks",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
            pb.inc(batch.len() as u64);
        }
        pb.finish_with_message("embedded");

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(i, (chunk, vector))| IndexEntry { id: i as u32, vector, chunk })
            .collect();
        let index = Self::from_entries(entries, embedder.embedder_id(), new_build_id())?;
        info!(entries = index.len(), dim = index.dim, embedder = %index.embedder_id, "built vector index");
        Ok(index)
    }

    /// Assemble an index from already-embedded entries, sorted by id.
    ///
    /// Every vector must share one non-zero dimension.
    pub fn from_entries(mut entries: Vec<IndexEntry>, embedder_id: &str, build_id: String) -> Result<Self> {
        let dim = entries.first().map(|e| e.vector.len()).unwrap_or(0);
        if dim == 0 {
            return Err(Error::InvalidInput("index entries must have a non-empty vector".into()));
        }
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dim) {
            return Err(Error::InvalidInput(format!(
                "entry {} has dimension {}, expected {dim}",
                bad.id,
                bad.vector.len()
            )));
        }
        entries.sort_by_key(|e| e.id);
        let norms = entries.iter().map(|e| l2_norm(&e.vector)).collect();
        Ok(Self { entries, norms, dim, embedder_id: embedder_id.to_string(), build_id })
    }

    /// Read the active index persisted under `location`.
    pub async fn load(location: &Path) -> Result<Self> {
        crate::reader::load_index(location).await
    }

    /// Write this index under `location` and make it the active one.
    pub async fn persist(&self, location: &Path) -> Result<()> {
        crate::writer::persist(self, location).await
    }

    /// The `min(k, len)` most similar entries.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        if query.len() != self.dim {
            return Err(Error::InvalidInput(format!(
                "query has dimension {}, index has {}",
                query.len(),
                self.dim
            )));
        }
        let q_norm = l2_norm(query);
        let mut scored: Vec<(f32, u32, usize)> = self
            .entries
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(pos, (e, &norm))| (cosine(query, q_norm, &e.vector, norm), e.id, pos))
            .collect();
        scored.sort_by(|a, b| rank(a.0, a.1, b.0, b.1));
        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry_id, pos)| SearchHit { entry_id, score, chunk: self.entries[pos].chunk.clone() })
            .collect())
    }

    pub fn entries(&self) -> &[IndexEntry] { &self.entries }
    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }
    pub fn dim(&self) -> usize { self.dim }
    pub fn embedder_id(&self) -> &str { &self.embedder_id }
    pub fn build_id(&self) -> &str { &self.build_id }
}

/// Timestamp, process id and an in-process sequence, so concurrent builders
/// sharing one index directory never pick the same table name.
fn new_build_id() -> String {
    let seq = BUILD_SEQ.fetch_add(1, AtomicOrdering::Relaxed) % 1000;
    format!("{}_{}_{seq:03}", Utc::now().format("%Y%m%d_%H%M%S_%3f"), std::process::id())
}

/// Score descending, then entry id ascending.
fn rank(score_a: f32, id_a: u32, score_b: f32, id_b: u32) -> Ordering {
    score_b.total_cmp(&score_a).then(id_a.cmp(&id_b))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Zero-norm on either side scores 0.
fn cosine(q: &[f32], q_norm: f32, v: &[f32], v_norm: f32) -> f32 {
    if q_norm == 0.0 || v_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = q.iter().zip(v).map(|(a, b)| a * b).sum();
    dot / (q_norm * v_norm)
}
