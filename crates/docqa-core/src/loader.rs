//! File loaders keyed by extension.
//!
//! The registry walks a document directory, routes each file to the loader
//! registered for its extension, and isolates per-file failures so one bad
//! file never aborts a whole ingestion.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::traits::DocumentLoader;
use crate::types::{Document, Meta, META_PAGE, META_SOURCE, META_TOTAL_PAGES};

/// Plain UTF-8 text (`.txt`, `.md`, `.sol`, ...). Invalid UTF-8 is decoded lossily.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextLoader;

impl DocumentLoader for TextLoader {
    fn name(&self) -> &str { "text" }

    fn load(&self, path: &Path, doc_id: &str) -> Result<Vec<Document>> {
        let text = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(_) => {
                let bytes = fs::read(path)
                    .map_err(|e| Error::InvalidInput(format!("cannot read {}: {e}", path.display())))?;
                String::from_utf8_lossy(&bytes).to_string()
            }
        };
        Ok(vec![Document { id: doc_id.to_string(), path: path.to_path_buf(), text, metadata: source_meta(path) }])
    }
}

/// One document per PDF page, tagged with `page` (0-based) and `total_pages`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfLoader;

impl DocumentLoader for PdfLoader {
    fn name(&self) -> &str { "pdf" }

    fn load(&self, path: &Path, doc_id: &str) -> Result<Vec<Document>> {
        // the extractor panics on some malformed files
        let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_by_pages(path))
            .map_err(|_| Error::InvalidInput(format!("cannot parse PDF {}: extractor panicked", path.display())))?
            .map_err(|e| Error::InvalidInput(format!("cannot parse PDF {}: {e}", path.display())))?;
        let total = pages.len();
        Ok(pages
            .into_iter()
            .enumerate()
            .map(|(page, text)| {
                let mut metadata = source_meta(path);
                metadata.insert(META_PAGE.to_string(), page.to_string());
                metadata.insert(META_TOTAL_PAGES.to_string(), total.to_string());
                Document { id: format!("{doc_id}#{page}"), path: path.to_path_buf(), text, metadata }
            })
            .collect())
    }
}

fn source_meta(path: &Path) -> Meta {
    let mut meta = Meta::new();
    meta.insert(META_SOURCE.to_string(), path.to_string_lossy().to_string());
    meta
}

/// Outcome of loading a directory: what loaded and what was skipped.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<(PathBuf, String)>,
}

#[derive(Clone, Default)]
pub struct LoaderRegistry {
    loaders: BTreeMap<String, Arc<dyn DocumentLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self { Self::default() }

    /// `pdf`, `txt`, `md` and `sol` (Solidity sources).
    pub fn with_defaults() -> Self {
        let text: Arc<dyn DocumentLoader> = Arc::new(TextLoader);
        let mut registry = Self::new();
        registry.register("pdf", Arc::new(PdfLoader));
        for ext in ["txt", "md", "sol"] {
            registry.register(ext, Arc::clone(&text));
        }
        registry
    }

    /// Route `extension` (with or without the leading dot, any case) to `loader`.
    pub fn register(&mut self, extension: &str, loader: Arc<dyn DocumentLoader>) {
        self.loaders.insert(normalize_ext(extension), loader);
    }

    pub fn loader_for(&self, path: &Path) -> Option<&Arc<dyn DocumentLoader>> {
        let ext = path.extension()?.to_str()?;
        self.loaders.get(&normalize_ext(ext))
    }

    /// Registered extensions as `.ext`, sorted.
    pub fn allowed_extensions(&self) -> Vec<String> {
        self.loaders.keys().map(|e| format!(".{e}")).collect()
    }

    pub fn is_allowed(&self, extension: &str) -> bool {
        self.loaders.contains_key(&normalize_ext(extension))
    }

    /// Load every supported file under `root`, recursively and in path order.
    ///
    /// Fails with `NotFound` when `root` is not a directory. Files a loader
    /// rejects are logged and reported in `failures`.
    pub fn load_directory(&self, root: &Path) -> Result<LoadReport> {
        if !root.is_dir() {
            return Err(Error::NotFound(format!("Documents directory not found: {}", root.display())));
        }
        let (files, walk_failures) = walk_files(root);
        let mut report = LoadReport { failures: walk_failures, ..LoadReport::default() };
        for path in files {
            let Some(loader) = self.loader_for(&path) else {
                debug!(path = %path.display(), "no loader for file, skipping");
                continue;
            };
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let doc_id = relative.to_string_lossy().to_string();
            match loader.load(&path, &doc_id) {
                Ok(docs) => {
                    debug!(path = %path.display(), loader = loader.name(), documents = docs.len(), "loaded");
                    report.documents.extend(docs);
                }
                Err(e) => {
                    warn!(path = %path.display(), loader = loader.name(), error = %e, "failed to load document, skipping");
                    report.failures.push((path, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

/// Every regular file under `root`, sorted, plus the entries the walk could
/// not read (an unreadable subdirectory, a file removed mid-walk).
pub fn walk_files(root: &Path) -> (Vec<PathBuf>, Vec<(PathBuf, String)>) {
    let mut files = Vec::new();
    let mut failures = Vec::new();
    for entry in walkdir::WalkDir::new(root) {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().unwrap_or(root).to_path_buf();
                warn!(path = %path.display(), error = %e, "cannot read directory entry, skipping");
                failures.push((path, e.to_string()));
            }
        }
    }
    files.sort();
    (files, failures)
}

fn normalize_ext(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}
