//! Ingestion and question answering over a local document collection.
//!
//! Ingest: load -> chunk -> embed -> build -> persist -> swap the active index.
//! Ask: embed the question -> top-k -> context block -> prompt -> generate.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use docqa_core::chunker::Chunker;
use docqa_core::config::{validate, ProviderKind, Settings};
use docqa_core::loader::{walk_files, LoaderRegistry};
use docqa_core::traits::{Embedder, Generator};
use docqa_core::types::{snippet, Answer, SourceRef};
use docqa_core::{Error, Result};
use docqa_vector::{Retriever, SearchHit, VectorIndex};

pub mod generator;
pub mod prompt;

pub use generator::GeminiGenerator;
pub use prompt::{build_context, PromptTemplate};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub chunk_count: usize,
    pub document_count: usize,
    pub failed_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentInfo {
    /// Path relative to the documents directory.
    pub name: String,
    pub size_bytes: u64,
}

pub struct Pipeline {
    docs_dir: PathBuf,
    index_dir: PathBuf,
    chunker: Chunker,
    loaders: LoaderRegistry,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    prompt: PromptTemplate,
    k: usize,
    snippet_chars: usize,
    active: RwLock<Option<Arc<Retriever>>>,
    ingest_lock: Mutex<()>,
}

impl Pipeline {
    /// Relative directories in `settings` are resolved against `base`.
    pub fn new(settings: &Settings, base: &Path, embedder: Arc<dyn Embedder>, generator: Arc<dyn Generator>) -> Result<Self> {
        validate(settings)?;
        Ok(Self {
            docs_dir: settings.docs_dir(base),
            index_dir: settings.index_dir(base),
            chunker: Chunker::new(settings.chunking.chunk_size, settings.chunking.chunk_overlap)?,
            loaders: LoaderRegistry::with_defaults(),
            embedder,
            generator,
            prompt: PromptTemplate::new(settings.retrieval.prompt_template.clone())?,
            k: settings.retrieval.k,
            snippet_chars: settings.retrieval.snippet_chars,
            active: RwLock::new(None),
            ingest_lock: Mutex::new(()),
        })
    }

    /// Build the configured embedder and generator, then the pipeline.
    ///
    /// With the fake provider and no credential, retrieval works offline and
    /// `ask` reports a configuration error at generation time.
    pub async fn from_settings(settings: &Settings, base: &Path) -> Result<Self> {
        validate(settings)?;
        let embedder = docqa_embed::get_default_embedder(settings).await?;
        let generator: Arc<dyn Generator> = match (settings.models.provider, GeminiGenerator::from_settings(settings)) {
            (_, Ok(g)) => Arc::new(g),
            (ProviderKind::Fake, Err(e)) => Arc::new(generator::UnavailableGenerator { reason: e.to_string() }),
            (ProviderKind::Gemini, Err(e)) => return Err(e),
        };
        Self::new(settings, base, embedder, generator)
    }

    /// Replace the extension -> loader routing.
    pub fn with_loaders(mut self, loaders: LoaderRegistry) -> Self {
        self.loaders = loaders;
        self
    }

    pub fn docs_dir(&self) -> &Path { &self.docs_dir }
    pub fn index_dir(&self) -> &Path { &self.index_dir }

    /// Rebuild the index from every document under the documents directory
    /// and make it active for subsequent queries.
    pub async fn ingest(&self) -> Result<IngestSummary> {
        let _guard = self.ingest_lock.lock().await;
        info!(
            docs_dir = %self.docs_dir.display(),
            chunk_size = self.chunker.max_size(),
            chunk_overlap = self.chunker.overlap(),
            "ingesting documents"
        );

        let loaders = self.loaders.clone();
        let docs_dir = self.docs_dir.clone();
        let report = tokio::task::spawn_blocking(move || loaders.load_directory(&docs_dir))
            .await
            .map_err(|e| Error::ExternalService(format!("document loading task failed: {e}")))??;
        if report.documents.is_empty() {
            return Err(Error::InvalidInput(format!(
                "No documents could be loaded from {} (supported: {})",
                self.docs_dir.display(),
                self.loaders.allowed_extensions().join(", ")
            )));
        }
        let failed_files: Vec<PathBuf> = report.failures.into_iter().map(|(path, _)| path).collect();
        if !failed_files.is_empty() {
            warn!(failed = failed_files.len(), "some documents could not be loaded");
        }

        let document_count = report.documents.len();
        let chunks = self.chunker.split_documents(&report.documents);
        if chunks.is_empty() {
            return Err(Error::InvalidInput("loaded documents contain no text".into()));
        }
        let chunk_count = chunks.len();
        info!(documents = document_count, chunks = chunk_count, "chunked documents");

        let index = VectorIndex::build(chunks, self.embedder.as_ref()).await?;
        index.persist(&self.index_dir).await?;
        let retriever = Arc::new(Retriever::new(Arc::new(index), self.k)?);
        *self.active.write().await = Some(retriever);

        info!(chunks = chunk_count, index_dir = %self.index_dir.display(), "ingestion complete");
        Ok(IngestSummary { chunk_count, document_count, failed_files })
    }

    /// Answer `question` from the active index.
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(Error::InvalidInput("Question must not be empty".into()));
        }
        let hits = self.search(question).await?;
        let context = build_context(&hits);
        let prompt = self.prompt.render(&context, question);
        debug!(sources = hits.len(), prompt_chars = prompt.len(), "generating answer");
        let answer = self.generator.generate(&prompt).await?;
        Ok(Answer { answer, sources: self.sources(&hits) })
    }

    /// [`Pipeline::ask`] that stops outstanding remote calls when `cancel` fires.
    pub async fn ask_cancellable(&self, question: &str, cancel: CancellationToken) -> Result<Answer> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("ask cancelled by caller");
                Err(Error::ExternalService("request cancelled".into()))
            }
            res = self.ask(question) => res,
        }
    }

    /// Retrieval only: the top-k chunks for `query`, without generation.
    pub async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let retriever = self.retriever().await?;
        let q = self.embedder.embed(query).await?;
        retriever.retrieve(&q)
    }

    pub fn sources(&self, hits: &[SearchHit]) -> Vec<SourceRef> {
        hits.iter()
            .map(|h| SourceRef {
                content: snippet(&h.chunk.content, self.snippet_chars),
                metadata: h.chunk.metadata.clone(),
                score: h.score,
            })
            .collect()
    }

    /// Store one uploaded file under the documents directory. Only the final
    /// component of `file_name` is kept.
    pub async fn upload(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf> {
        let name = Path::new(file_name)
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("Invalid file name '{file_name}'")))?;
        let ext = Path::new(name)
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
            .unwrap_or_default();
        if !self.loaders.is_allowed(&ext) {
            return Err(Error::InvalidInput(format!(
                "Unsupported file type '{ext}'. Allowed: {}",
                self.loaders.allowed_extensions().join(", ")
            )));
        }
        tokio::fs::create_dir_all(&self.docs_dir).await.map_err(|e| {
            Error::ExternalService(format!("cannot create {}: {e}", self.docs_dir.display()))
        })?;
        let dest = self.docs_dir.join(name);
        tokio::fs::write(&dest, bytes)
            .await
            .map_err(|e| Error::ExternalService(format!("cannot write {}: {e}", dest.display())))?;
        info!(path = %dest.display(), bytes = bytes.len(), "stored upload");
        Ok(dest)
    }

    /// Files currently in the documents directory, sorted by name.
    pub fn list_documents(&self) -> Result<Vec<DocumentInfo>> {
        if !self.docs_dir.is_dir() {
            return Err(Error::NotFound(format!("Documents directory not found: {}", self.docs_dir.display())));
        }
        // unreadable entries are logged by the walk and left out of the listing
        let (files, _unreadable) = walk_files(&self.docs_dir);
        let mut docs: Vec<DocumentInfo> = files
            .iter()
            .map(|path| DocumentInfo {
                name: path.strip_prefix(&self.docs_dir).unwrap_or(path).to_string_lossy().to_string(),
                size_bytes: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            })
            .collect();
        docs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(docs)
    }

    /// The active retriever, loading the persisted index on first use.
    ///
    /// The load runs without holding `active`; an index installed meanwhile
    /// (by ingest or a concurrent load) wins over the one just read.
    async fn retriever(&self) -> Result<Arc<Retriever>> {
        if let Some(r) = self.active.read().await.as_ref() {
            return Ok(Arc::clone(r));
        }
        let loaded = Arc::new(Retriever::load(&self.index_dir, self.k).await.map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound("No index found. Please ingest documents first.".into()),
            other => other,
        })?);

        let mut slot = self.active.write().await;
        if let Some(r) = slot.as_ref() {
            debug!("index installed during load, discarding the loaded copy");
            return Ok(Arc::clone(r));
        }
        let stored = loaded.index().embedder_id();
        if stored != self.embedder.embedder_id() {
            warn!(index = stored, current = self.embedder.embedder_id(), "index was built with a different embedder");
        }
        info!(entries = loaded.index().len(), "loaded persisted index");
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }
}
