//! Lightweight configuration loader and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_MODELS__API_KEY`). Only hosts call
//! [`Config::load`]; the pipeline receives an already-extracted [`Settings`].
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are an expert assistant answering questions about a private document collection.

Use the following context from the knowledge base to answer the question.
If the answer is not found in the context, say so clearly and provide
your general knowledge on the topic.

Always provide code examples when relevant and highlight security
considerations.

Context:
{context}

Question: {question}

Answer:";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub data: DataSettings,
    pub chunking: ChunkingSettings,
    pub retrieval: RetrievalSettings,
    pub models: ModelSettings,
    pub http: HttpSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    pub docs_dir: String,
    pub index_dir: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { docs_dir: "data/docs".to_string(), index_dir: "data/vector_store".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, chunk_overlap: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub k: usize,
    pub snippet_chars: usize,
    pub prompt_template: String,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { k: 4, snippet_chars: 200, prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Gemini,
    Fake,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub provider: ProviderKind,
    pub base_url: String,
    pub api_key: Option<String>,
    /// Preferred embedding model; tried before the built-in known-good list.
    pub embedding_model: Option<String>,
    /// Model names that must never be selected for embeddings.
    pub rejected_models: Vec<String>,
    pub generation_model: String,
    pub temperature: f32,
    /// Dimensionality of the offline fake embedder.
    pub fake_dim: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Gemini,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
            embedding_model: None,
            rejected_models: Vec::new(),
            generation_model: "gemini-2.5-flash".to_string(),
            temperature: 0.3,
            fake_dim: 256,
        }
    }
}

/// Timeout and retry policy for every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            connect_timeout_secs: 10,
            max_retries: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Settings {
    pub fn docs_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.data.docs_dir)
    }

    pub fn index_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.data.index_dir)
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Ok(Self { figment: Self::figment_for(&env_name, Path::new(".")) })
    }

    /// Build the layered figment for `env_name`, reading TOML files from `dir`.
    pub fn figment_for(env_name: &str, dir: &Path) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(dir.join("config.toml")));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file(dir.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(dir.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(dir.join("config.test.toml"))),
            _ => {}
        }
        figment.merge(Env::prefixed("APP_").split("__"))
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Configuration(format!("Failed to get '{key}': {e}")))
    }

    /// Extract and validate [`Settings`]. `~` and `$VAR` in the data paths are
    /// expanded here, on the host side; the pipeline never expands them.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {e}")))?;
        settings.data.docs_dir = expand_path(&settings.data.docs_dir).to_string_lossy().to_string();
        settings.data.index_dir = expand_path(&settings.data.index_dir).to_string_lossy().to_string();
        validate(&settings)?;
        Ok(settings)
    }
}

/// Reject settings no pipeline could run with.
pub fn validate(settings: &Settings) -> Result<()> {
    let c = &settings.chunking;
    if c.chunk_size == 0 {
        return Err(Error::Configuration("chunking.chunk_size must be positive".into()));
    }
    if c.chunk_overlap >= c.chunk_size {
        return Err(Error::Configuration(format!(
            "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
            c.chunk_overlap, c.chunk_size
        )));
    }
    if settings.retrieval.k == 0 {
        return Err(Error::Configuration("retrieval.k must be positive".into()));
    }
    Ok(())
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against `base`, taking `p` literally.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = Path::new(p.as_ref());
    if p.is_absolute() { p.to_path_buf() } else { base.join(p) }
}
