use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use docqa_core::config::{ProviderKind, Settings};
use docqa_core::loader::{LoaderRegistry, TextLoader};
use docqa_core::traits::Generator;
use docqa_core::ErrorKind;
use docqa_embed::FakeEmbedder;
use docqa_pipeline::Pipeline;
use docqa_vector::VectorIndex;

const REENTRANCY: &str = "Reentrancy occurs when external calls re-enter the calling contract before state update.";

/// Records every prompt and answers with a fixed string.
#[derive(Default)]
struct RecordingGenerator {
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, prompt: &str) -> docqa_core::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok("stub answer".into())
    }
}

/// Never answers within a test's lifetime.
struct StalledGenerator;

#[async_trait]
impl Generator for StalledGenerator {
    async fn generate(&self, _prompt: &str) -> docqa_core::Result<String> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok("too late".into())
    }
}

fn settings(root: &Path) -> Settings {
    let mut s = Settings::default();
    s.data.docs_dir = root.join("docs").to_string_lossy().to_string();
    s.data.index_dir = root.join("index").to_string_lossy().to_string();
    s.chunking.chunk_size = 1000;
    s.chunking.chunk_overlap = 200;
    s.models.provider = ProviderKind::Fake;
    s
}

fn pipeline(root: &Path, generator: Arc<dyn Generator>) -> Pipeline {
    let s = settings(root);
    Pipeline::new(&s, root, Arc::new(FakeEmbedder::new(128)), generator).expect("pipeline")
}

fn write_doc(root: &Path, name: &str, text: &str) {
    let docs = root.join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join(name), text).unwrap();
}

#[tokio::test]
async fn single_short_document_becomes_one_entry() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));

    let summary = p.ingest().await?;
    assert_eq!(summary.chunk_count, 1);
    assert_eq!(summary.document_count, 1);
    assert!(summary.failed_files.is_empty());

    let persisted = VectorIndex::load(&tmp.path().join("index")).await?;
    assert_eq!(persisted.len(), 1);
    Ok(())
}

#[tokio::test]
async fn ask_grounds_the_prompt_in_the_retrieved_chunk() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    let generator = Arc::new(RecordingGenerator::default());
    let p = pipeline(tmp.path(), generator.clone());
    p.ingest().await?;

    let answer = p.ask("What is reentrancy?").await?;
    assert_eq!(answer.answer, "stub answer");
    assert_eq!(answer.sources.len(), 1);
    assert_eq!(answer.sources[0].content, REENTRANCY);
    assert!(answer.sources[0].metadata["source"].ends_with("reentrancy.txt"));

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(REENTRANCY));
    assert!(prompts[0].contains("Question: What is reentrancy?"));
    Ok(())
}

#[tokio::test]
async fn empty_document_directory_is_invalid_input() -> Result<()> {
    let tmp = TempDir::new()?;
    fs::create_dir_all(tmp.path().join("docs"))?;
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    assert_eq!(p.ingest().await.unwrap_err().kind(), ErrorKind::InvalidInput);

    // unsupported files alone do not count as documents
    write_doc(tmp.path(), "tool.exe", "MZ");
    assert_eq!(p.ingest().await.unwrap_err().kind(), ErrorKind::InvalidInput);
    Ok(())
}

#[tokio::test]
async fn missing_document_directory_is_not_found() -> Result<()> {
    let tmp = TempDir::new()?;
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    assert_eq!(p.ingest().await.unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(p.list_documents().unwrap_err().kind(), ErrorKind::NotFound);
    Ok(())
}

#[tokio::test]
async fn ask_before_ingest_is_not_found() -> Result<()> {
    let tmp = TempDir::new()?;
    let generator = Arc::new(RecordingGenerator::default());
    let p = pipeline(tmp.path(), generator.clone());
    assert_eq!(p.ask("What is reentrancy?").await.unwrap_err().kind(), ErrorKind::NotFound);
    assert!(generator.prompts().is_empty());
    Ok(())
}

#[tokio::test]
async fn blank_question_is_invalid_input() -> Result<()> {
    let tmp = TempDir::new()?;
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    assert_eq!(p.ask("  \n").await.unwrap_err().kind(), ErrorKind::InvalidInput);
    Ok(())
}

#[tokio::test]
async fn upload_rejects_unsupported_extension() -> Result<()> {
    let tmp = TempDir::new()?;
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    let err = p.upload("payload.exe", b"MZ").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    let msg = err.to_string();
    assert!(msg.contains("'.exe'"), "{msg}");
    assert!(msg.contains(".md, .pdf, .sol, .txt"), "{msg}");
    assert!(!tmp.path().join("docs").join("payload.exe").exists());
    Ok(())
}

#[tokio::test]
async fn upload_stores_file_name_only() -> Result<()> {
    let tmp = TempDir::new()?;
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    let dest = p.upload("../../Notes.MD", b"# notes").await?;
    assert_eq!(dest, tmp.path().join("docs").join("Notes.MD"));
    assert_eq!(fs::read_to_string(&dest)?, "# notes");

    let docs = p.list_documents()?;
    assert_eq!(docs.len(), 1);
    assert_eq!(docs[0].name, "Notes.MD");
    assert_eq!(docs[0].size_bytes, 7);
    Ok(())
}

#[tokio::test]
async fn custom_loaders_extend_ingest_and_upload() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "guide.rst", REENTRANCY);
    let default = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    assert_eq!(default.ingest().await.unwrap_err().kind(), ErrorKind::InvalidInput);
    assert_eq!(default.upload("more.rst", b"text").await.unwrap_err().kind(), ErrorKind::InvalidInput);

    let mut loaders = LoaderRegistry::with_defaults();
    loaders.register("rst", Arc::new(TextLoader));
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default())).with_loaders(loaders);
    let summary = p.ingest().await?;
    assert_eq!(summary.document_count, 1);
    let hits = p.search("reentrancy").await?;
    assert_eq!(hits[0].chunk.doc_id, "guide.rst");

    let dest = p.upload("more.RST", b"text").await?;
    assert!(dest.ends_with("more.RST"));
    Ok(())
}

#[tokio::test]
async fn unreadable_file_is_skipped_not_fatal() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "broken.pdf", "definitely not a pdf");
    write_doc(tmp.path(), "notes.md", REENTRANCY);
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    let summary = p.ingest().await?;
    assert_eq!(summary.document_count, 1);
    assert_eq!(summary.failed_files.len(), 1);
    assert!(summary.failed_files[0].ends_with("broken.pdf"));
    Ok(())
}

#[tokio::test]
async fn persisted_index_is_loaded_by_a_fresh_pipeline() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    pipeline(tmp.path(), Arc::new(RecordingGenerator::default())).ingest().await?;

    let generator = Arc::new(RecordingGenerator::default());
    let restarted = pipeline(tmp.path(), generator.clone());
    let answer = restarted.ask("reentrancy").await?;
    assert_eq!(answer.sources.len(), 1);
    assert!(generator.prompts()[0].contains(REENTRANCY));
    Ok(())
}

#[tokio::test]
async fn cold_load_racing_an_ingest_keeps_the_newer_index() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    pipeline(tmp.path(), Arc::new(RecordingGenerator::default())).ingest().await?;
    write_doc(tmp.path(), "oracle.txt", "Price oracle manipulation skews on-chain prices.");

    let restarted = Arc::new(pipeline(tmp.path(), Arc::new(RecordingGenerator::default())));
    let mut readers = Vec::new();
    for _ in 0..4 {
        let p = Arc::clone(&restarted);
        readers.push(tokio::spawn(async move { p.search("reentrancy").await }));
    }
    let summary = restarted.ingest().await?;
    for r in readers {
        assert!(!r.await??.is_empty());
    }

    assert_eq!(summary.chunk_count, 2);
    assert_eq!(restarted.search("price oracle manipulation").await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn reingest_swaps_in_the_new_index() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    p.ingest().await?;
    assert_eq!(p.search("oracle").await?.len(), 1);

    write_doc(tmp.path(), "oracle.txt", "Price oracle manipulation skews on-chain prices.");
    let summary = p.ingest().await?;
    assert_eq!(summary.chunk_count, 2);
    let hits = p.search("price oracle manipulation").await?;
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk.doc_id, "oracle.txt");
    Ok(())
}

#[tokio::test]
async fn long_sources_are_truncated_snippets() -> Result<()> {
    let tmp = TempDir::new()?;
    let long = "storage slot collision in proxy upgrades ".repeat(20);
    write_doc(tmp.path(), "proxy.txt", &long);
    let p = pipeline(tmp.path(), Arc::new(RecordingGenerator::default()));
    p.ingest().await?;

    let answer = p.ask("proxy storage collision").await?;
    let first = &answer.sources[0].content;
    assert!(first.ends_with("..."));
    assert_eq!(first.chars().count(), 203);
    Ok(())
}

#[tokio::test]
async fn concurrent_asks_share_the_index() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    let generator = Arc::new(RecordingGenerator::default());
    let p = Arc::new(pipeline(tmp.path(), generator.clone()));
    p.ingest().await?;

    let mut tasks = Vec::new();
    for i in 0..8 {
        let p = Arc::clone(&p);
        tasks.push(tokio::spawn(async move { p.ask(&format!("reentrancy question {i}")).await }));
    }
    for t in tasks {
        assert_eq!(t.await??.sources.len(), 1);
    }
    assert_eq!(generator.prompts().len(), 8);
    Ok(())
}

#[tokio::test]
async fn cancelling_ask_abandons_generation() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    let p = pipeline(tmp.path(), Arc::new(StalledGenerator));
    p.ingest().await?;

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let err = tokio::time::timeout(Duration::from_secs(10), p.ask_cancellable("reentrancy", token))
        .await
        .expect("cancellation must end the call")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ExternalService);
    assert!(err.to_string().contains("request cancelled"));
    Ok(())
}

#[tokio::test]
async fn fake_provider_without_credential_still_retrieves() -> Result<()> {
    let tmp = TempDir::new()?;
    write_doc(tmp.path(), "reentrancy.txt", REENTRANCY);
    let s = settings(tmp.path());
    let p = Pipeline::from_settings(&s, tmp.path()).await?;
    p.ingest().await?;
    assert_eq!(p.search("reentrancy").await?.len(), 1);
    assert_eq!(p.ask("reentrancy").await.unwrap_err().kind(), ErrorKind::Configuration);

    let mut gemini = settings(tmp.path());
    gemini.models.provider = ProviderKind::Gemini;
    assert_eq!(Pipeline::from_settings(&gemini, tmp.path()).await.err().map(|e| e.kind()), Some(ErrorKind::Configuration));
    Ok(())
}
