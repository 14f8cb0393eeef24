//! Corpus ingestion
//!
//! [`CorpusBuilder`] turns chunks into a [`CorpusSnapshot`] (corpus + both
//! indexes). [`IngestionService`] replaces the indexed document set with each
//! upload, skips the rebuild when the upload matches what is installed, and
//! installs each new version atomically. Builds are serialised so versions
//! are handed out in order.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::Mutex;

use docchat_config::{RetrievalConfig, SemanticBackend};
use docchat_core::{
    Chunk, Corpus, CorpusSnapshot, CorpusStore, CorpusVersion, LexicalIndex, SemanticIndex,
};

use crate::embeddings::Embedder;
use crate::processor::{DocumentProcessor, SourceFile};
use crate::semantic::InMemoryVectorIndex;
use crate::sparse_search::SparseIndex;
use crate::vector_store::{QdrantVectorIndex, VectorStoreConfig};
use crate::RagError;

/// Outcome of an ingest call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub corpus_version: CorpusVersion,
    pub documents: usize,
    pub chunks: usize,
    /// False when the upload added nothing and the current version was kept
    pub rebuilt: bool,
}

/// Builds the lexical and semantic indexes for a chunk set
pub struct CorpusBuilder {
    embedder: Arc<dyn Embedder>,
    semantic_backend: SemanticBackend,
    vector_store: VectorStoreConfig,
}

impl CorpusBuilder {
    pub fn new(embedder: Arc<dyn Embedder>, config: &RetrievalConfig) -> Self {
        Self {
            embedder,
            semantic_backend: config.semantic_backend,
            vector_store: VectorStoreConfig::from(config),
        }
    }

    /// In-memory indexes only
    pub fn in_memory(embedder: Arc<dyn Embedder>) -> Self {
        Self::new(embedder, &RetrievalConfig::default())
    }

    pub async fn build(
        &self,
        version: CorpusVersion,
        chunks: Vec<Chunk>,
    ) -> Result<CorpusSnapshot, RagError> {
        let corpus = Arc::new(Corpus::new(version, chunks)?);

        let lexical_corpus = Arc::clone(&corpus);
        let lexical_task = tokio::task::spawn_blocking(move || {
            SparseIndex::build(version, lexical_corpus.chunks())
        });

        let semantic: Arc<dyn SemanticIndex> = match self.semantic_backend {
            SemanticBackend::Memory => Arc::new(
                InMemoryVectorIndex::build(version, corpus.chunks(), Arc::clone(&self.embedder))
                    .await?,
            ),
            SemanticBackend::Qdrant => Arc::new(
                QdrantVectorIndex::build(
                    &self.vector_store,
                    version,
                    corpus.chunks(),
                    Arc::clone(&self.embedder),
                )
                .await?,
            ),
        };

        let lexical: Arc<dyn LexicalIndex> = Arc::new(
            lexical_task
                .await
                .map_err(|e| RagError::Index(format!("Lexical build task failed: {}", e)))??,
        );

        Ok(CorpusSnapshot::new(corpus, lexical, semantic)?)
    }
}

/// Upload-to-installed-version pipeline
pub struct IngestionService {
    processor: DocumentProcessor,
    builder: CorpusBuilder,
    store: Arc<CorpusStore>,
    build_lock: Mutex<()>,
}

impl IngestionService {
    pub fn new(processor: DocumentProcessor, builder: CorpusBuilder, store: Arc<CorpusStore>) -> Self {
        Self {
            processor,
            builder,
            store,
            build_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<CorpusStore> {
        &self.store
    }

    /// Make `files` the corpus, installing a new version if the set changed.
    ///
    /// The upload is the whole document set; documents from earlier uploads
    /// are not carried over.
    pub async fn ingest(&self, files: Vec<SourceFile>) -> Result<IngestReport, RagError> {
        self.processor.validate(&files)?;

        let _build = self.build_lock.lock().await;

        let mut hashes = BTreeSet::new();
        let documents: Vec<&SourceFile> = self
            .processor
            .supported(&files)
            .into_iter()
            .filter(|file| hashes.insert(file.content_hash()))
            .collect();

        if documents.is_empty() {
            return Err(RagError::InvalidDocument(
                "no supported documents in upload".to_string(),
            ));
        }

        if let Some(snapshot) = self.store.current() {
            if self.store.matches_sources(&hashes) {
                tracing::info!(version = %snapshot.version(), "Upload unchanged, keeping current corpus");
                return Ok(IngestReport {
                    corpus_version: snapshot.version(),
                    documents: documents.len(),
                    chunks: snapshot.corpus().len(),
                    rebuilt: false,
                });
            }
        }

        let version = self.store.next_version();
        let chunks = self.processor.chunk_files(version, &documents);

        let snapshot = self.builder.build(version, chunks).await?;
        let chunk_count = snapshot.corpus().len();
        let installed = self.store.install(snapshot, hashes)?;

        tracing::info!(
            version = %installed,
            documents = documents.len(),
            chunks = chunk_count,
            "Corpus rebuilt"
        );

        Ok(IngestReport {
            corpus_version: installed,
            documents: documents.len(),
            chunks: chunk_count,
            rebuilt: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::retriever::HybridRetriever;

    fn service() -> IngestionService {
        IngestionService::new(
            DocumentProcessor::default(),
            CorpusBuilder::in_memory(Arc::new(HashEmbedder::new(256))),
            Arc::new(CorpusStore::new()),
        )
    }

    fn guide() -> SourceFile {
        SourceFile::new(
            "guide.md",
            "# Install\nRun the installer script.\n# Upgrade\nBack up data before upgrading.",
        )
    }

    #[tokio::test]
    async fn test_first_ingest_installs_version_one() {
        let service = service();
        let report = service.ingest(vec![guide()]).await.unwrap();

        assert_eq!(report.corpus_version, CorpusVersion(1));
        assert_eq!(report.chunks, 2);
        assert!(report.rebuilt);
        assert_eq!(service.store().current_version(), Some(CorpusVersion(1)));
    }

    #[tokio::test]
    async fn test_identical_upload_skips_rebuild() {
        let service = service();
        service.ingest(vec![guide()]).await.unwrap();
        let report = service.ingest(vec![guide()]).await.unwrap();

        assert!(!report.rebuilt);
        assert_eq!(report.corpus_version, CorpusVersion(1));
    }

    #[tokio::test]
    async fn test_new_upload_replaces_corpus() {
        let service = service();
        service.ingest(vec![guide()]).await.unwrap();
        let report = service
            .ingest(vec![SourceFile::new("faq.txt", "Support hours are nine to five.")])
            .await
            .unwrap();

        assert!(report.rebuilt);
        assert_eq!(report.corpus_version, CorpusVersion(2));
        assert_eq!(report.documents, 1);
        assert_eq!(report.chunks, 1);

        let snapshot = service.store().current().unwrap();
        assert!(snapshot.corpus().chunks().iter().all(|c| c.id.starts_with("v2:")));
        assert!(snapshot.corpus().chunks().iter().all(|c| c.source_doc_id == "faq.txt"));
    }

    #[tokio::test]
    async fn test_upload_superset_rebuilds() {
        let service = service();
        service.ingest(vec![guide()]).await.unwrap();
        let faq = SourceFile::new("faq.txt", "Support hours are nine to five.");
        let report = service.ingest(vec![guide(), faq.clone()]).await.unwrap();

        assert!(report.rebuilt);
        assert_eq!(report.documents, 2);
        assert_eq!(report.chunks, 3);

        let again = service.ingest(vec![faq, guide()]).await.unwrap();
        assert!(!again.rebuilt);
        assert_eq!(again.corpus_version, CorpusVersion(2));
    }

    #[tokio::test]
    async fn test_size_limit_bounds_corpus_across_uploads() {
        let service = IngestionService::new(
            DocumentProcessor::from(&docchat_config::IngestionConfig {
                max_total_bytes: 100,
                ..Default::default()
            }),
            CorpusBuilder::in_memory(Arc::new(HashEmbedder::new(256))),
            Arc::new(CorpusStore::new()),
        );

        for n in 0..5 {
            let body = format!("# Part {}\n{}", n, "x".repeat(80));
            service
                .ingest(vec![SourceFile::new(format!("part{}.md", n), body)])
                .await
                .unwrap();
        }

        let snapshot = service.store().current().unwrap();
        let bytes: usize = snapshot.corpus().chunks().iter().map(|c| c.text.len()).sum();
        assert_eq!(snapshot.version(), CorpusVersion(5));
        assert!(bytes <= 100);
        assert!(snapshot.corpus().chunks().iter().all(|c| c.source_doc_id == "part4.md"));
    }

    #[tokio::test]
    async fn test_unsupported_only_upload_rejected() {
        let service = service();
        let result = service.ingest(vec![SourceFile::new("logo.png", "binary")]).await;
        assert!(matches!(result, Err(RagError::InvalidDocument(_))));
        assert!(service.store().current().is_none());
    }

    #[tokio::test]
    async fn test_pinned_snapshot_survives_rebuild() {
        let service = service();
        service.ingest(vec![guide()]).await.unwrap();
        let pinned = service.store().require_current().unwrap();

        service
            .ingest(vec![SourceFile::new("more.md", "# Extra\nInstaller flags are documented here.")])
            .await
            .unwrap();

        let result = HybridRetriever::default()
            .retrieve("installer", &pinned, 5)
            .await
            .unwrap();
        assert!(!result.is_empty());
        assert!(result.ids().all(|id| id.starts_with("v1:")));
        assert_eq!(pinned.version(), CorpusVersion(1));
    }
}
