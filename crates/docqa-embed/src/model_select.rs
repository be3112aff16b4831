//! Embedding model selection.
//!
//! Known-good names are tried first without touching the network. The model
//! listing is consulted only when configuration rejects every known name.
use async_trait::async_trait;
use tracing::{debug, warn};

use docqa_core::Result;

pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const KNOWN_EMBEDDING_MODELS: [&str; 2] = ["text-embedding-004", "gemini-embedding-001"];
const EMBED_MARKER: &str = "embed";

/// Source of available model names (e.g. the provider's listing endpoint).
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    async fn list_models(&self) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Known,
    Listing,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelection {
    pub model: String,
    pub source: SelectionSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelPolicy {
    pub configured: Option<String>,
    pub rejected: Vec<String>,
}

impl ModelPolicy {
    pub fn new(configured: Option<String>, rejected: Vec<String>) -> Self {
        Self { configured, rejected }
    }

    fn is_rejected(&self, name: &str) -> bool {
        let name = normalize_model_name(name);
        self.rejected.iter().any(|r| normalize_model_name(r) == name)
    }

    /// Configured model then the known-good list, minus rejected names.
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let configured = self.configured.as_deref().map(normalize_model_name).filter(|c| !c.is_empty());
        for name in configured.into_iter().chain(KNOWN_EMBEDDING_MODELS.iter().map(|s| s.to_string())) {
            if !self.is_rejected(&name) && !out.contains(&name) {
                out.push(name);
            }
        }
        out
    }

    /// Fast path; `None` means every known name is rejected.
    pub fn pick_known(&self) -> Option<ModelSelection> {
        self.candidates()
            .into_iter()
            .next()
            .map(|model| ModelSelection { model, source: SelectionSource::Known })
    }

    /// First listed name containing `embed` (any case) that is not rejected.
    pub fn pick_from_listing(&self, listing: &[String]) -> Option<ModelSelection> {
        listing
            .iter()
            .map(|n| normalize_model_name(n))
            .find(|n| n.to_ascii_lowercase().contains(EMBED_MARKER) && !self.is_rejected(n))
            .map(|model| ModelSelection { model, source: SelectionSource::Listing })
    }

    pub fn fallback(&self) -> ModelSelection {
        ModelSelection { model: DEFAULT_EMBEDDING_MODEL.to_string(), source: SelectionSource::Fallback }
    }

    /// Full selection: known list, then the catalog, then the default.
    pub async fn select(&self, catalog: &dyn ModelCatalog) -> ModelSelection {
        if let Some(sel) = self.pick_known() {
            debug!(model = %sel.model, "embedding model from known list");
            return sel;
        }
        match catalog.list_models().await {
            Ok(listing) => {
                if let Some(sel) = self.pick_from_listing(&listing) {
                    debug!(model = %sel.model, listed = listing.len(), "embedding model from listing");
                    return sel;
                }
                warn!(listed = listing.len(), "no usable embedding model in listing, using default");
            }
            Err(e) => warn!(error = %e, "model listing failed, using default embedding model"),
        }
        self.fallback()
    }
}

/// `models/text-embedding-004` -> `text-embedding-004`.
pub fn normalize_model_name(name: &str) -> String {
    name.trim().trim_start_matches("models/").to_string()
}
