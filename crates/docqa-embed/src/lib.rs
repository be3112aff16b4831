//! Embedding providers: the Gemini API client with model selection, and a
//! deterministic offline embedder for tests and air-gapped runs.
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;
use twox_hash::XxHash64;

use docqa_core::config::{ProviderKind, Settings};
use docqa_core::traits::Embedder;
use docqa_core::{Error, Result};

pub mod client;
pub mod gemini;
pub mod model_select;
pub mod retry;

pub use client::GeminiClient;
pub use gemini::GeminiEmbedder;
pub use model_select::{ModelCatalog, ModelPolicy, ModelSelection, SelectionSource};
pub use retry::{with_retry, CallError, RetryPolicy};

/// Hashed bag-of-words, L2-normalised. Same text, same vector; texts that
/// share words land close together.
#[derive(Debug, Clone)]
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1), id: format!("fake:{}", dim.max(1)) }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            v[idx] += 0.5 + ((h >> 32) as u32) as f32 / u32::MAX as f32;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    async fn dimension(&self) -> Result<usize> { Ok(self.dim) }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Build the embedder named by `settings.models.provider`.
///
/// Gemini needs a credential (checked before any request) and may issue one
/// model-listing call when configuration rejects every known model.
pub async fn get_default_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    match settings.models.provider {
        ProviderKind::Fake => {
            info!(dim = settings.models.fake_dim, "using fake embedder");
            if settings.models.fake_dim == 0 {
                return Err(Error::Configuration("models.fake_dim must be positive".into()));
            }
            Ok(Arc::new(FakeEmbedder::new(settings.models.fake_dim)))
        }
        ProviderKind::Gemini => {
            let client = GeminiClient::new(&settings.models, &settings.http)?;
            let policy = ModelPolicy::new(settings.models.embedding_model.clone(), settings.models.rejected_models.clone());
            Ok(Arc::new(GeminiEmbedder::connect(client, &policy).await))
        }
    }
}
