use async_trait::async_trait;

use docqa_core::config::Settings;
use docqa_core::traits::Generator;
use docqa_core::{Error, Result};
use docqa_embed::GeminiClient;

/// Answers with a Gemini chat model at a fixed temperature.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: GeminiClient,
    model: String,
    temperature: f32,
}

impl GeminiGenerator {
    pub fn new(client: GeminiClient, model: impl Into<String>, temperature: f32) -> Self {
        Self { client, model: model.into(), temperature }
    }

    /// Fails with a configuration error when no credential is set.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let client = GeminiClient::new(&settings.models, &settings.http)?;
        Ok(Self::new(client, settings.models.generation_model.clone(), settings.models.temperature))
    }

    pub fn model(&self) -> &str { &self.model }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.client.generate(&self.model, prompt, self.temperature).await
    }
}

/// Stands in when generation cannot be configured (offline embedding with no
/// credential). Retrieval still works; every `generate` reports why.
#[derive(Debug, Clone)]
pub(crate) struct UnavailableGenerator {
    pub(crate) reason: String,
}

#[async_trait]
impl Generator for UnavailableGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        Err(Error::Configuration(format!("answer generation unavailable: {}", self.reason)))
    }
}
