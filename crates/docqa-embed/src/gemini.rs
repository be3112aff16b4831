use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::info;

use docqa_core::traits::Embedder;
use docqa_core::{Error, Result};

use crate::client::GeminiClient;
use crate::model_select::{ModelPolicy, SelectionSource};

/// Embeddings from the Gemini API. Dimension is learned from the first
/// response and cached.
#[derive(Debug)]
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    id: String,
    dim: OnceCell<usize>,
}

impl GeminiEmbedder {
    /// Select a model per `policy`; hits the network only when every
    /// known model is rejected.
    pub async fn connect(client: GeminiClient, policy: &ModelPolicy) -> Self {
        let selection = policy.select(&client).await;
        if selection.source == SelectionSource::Fallback {
            info!(model = %selection.model, "using default embedding model");
        } else {
            info!(model = %selection.model, source = ?selection.source, "selected embedding model");
        }
        Self::with_model(client, selection.model)
    }

    pub fn with_model(client: GeminiClient, model: impl Into<String>) -> Self {
        let model = model.into();
        Self { id: format!("gemini:{model}"), client, model, dim: OnceCell::new() }
    }

    pub fn model(&self) -> &str { &self.model }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn embedder_id(&self) -> &str { &self.id }

    async fn dimension(&self) -> Result<usize> {
        self.dim
            .get_or_try_init(|| async {
                let probe = self.client.embed_batch(&self.model, &["dimension probe".to_string()]).await?;
                probe
                    .first()
                    .map(Vec::len)
                    .ok_or_else(|| Error::ExternalService("embedding probe returned no vector".into()))
            })
            .await
            .copied()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors = self.client.embed_batch(&self.model, texts).await?;
        if let Some(first) = vectors.first() {
            let dim = *self.dim.get_or_init(|| async { first.len() }).await;
            if let Some(bad) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::ExternalService(format!(
                    "model {} returned a {}-dim vector, expected {dim}",
                    self.model,
                    bad.len()
                )));
            }
        }
        Ok(vectors)
    }
}
