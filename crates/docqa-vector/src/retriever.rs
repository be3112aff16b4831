use std::path::Path;
use std::sync::Arc;

use docqa_core::{Error, Result};

use crate::index::{SearchHit, VectorIndex};

/// A loaded index bound to a fixed result width.
#[derive(Debug, Clone)]
pub struct Retriever {
    index: Arc<VectorIndex>,
    k: usize,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, k: usize) -> Result<Self> {
        if k == 0 {
            return Err(Error::Configuration("retrieval width k must be positive".into()));
        }
        Ok(Self { index, k })
    }

    pub async fn load(location: &Path, k: usize) -> Result<Self> {
        let index = VectorIndex::load(location).await?;
        Self::new(Arc::new(index), k)
    }

    /// Top-`k` entries for an already-embedded query.
    pub fn retrieve(&self, query: &[f32]) -> Result<Vec<SearchHit>> {
        self.index.search(query, self.k)
    }

    pub fn index(&self) -> &Arc<VectorIndex> { &self.index }
    pub fn k(&self) -> usize { self.k }
}
