use async_trait::async_trait;
use std::path::Path;

use crate::error::Result;
use crate::types::Document;

/// Maps text to fixed-dimension vectors.
///
/// Implementations must return vectors of one dimensionality for a given
/// `embedder_id`.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Stable identifier for the provider/model (e.g. `gemini:text-embedding-004`).
    fn embedder_id(&self) -> &str;
    /// Embedding dimensionality (D).
    async fn dimension(&self) -> Result<usize>;
    /// Compute embeddings for a batch of input texts, one vector per text, in order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| crate::Error::ExternalService("embedder returned no vector".into()))
    }
}

/// Produces a textual answer for a fully rendered prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Parses one class of input file into documents.
pub trait DocumentLoader: Send + Sync {
    fn name(&self) -> &str;
    fn load(&self, path: &Path, doc_id: &str) -> Result<Vec<Document>>;
}
