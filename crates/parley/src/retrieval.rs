//! Chunk, embed and retrieve uploaded documents.
//!
//! [`VectorStore`] holds the vectors; [`RetrievalEngine`] ties it to a
//! [`Chunker`] and an [`Embedder`] to run whole-document ingestion and
//! prompt-time search.
pub mod chunker;
pub mod embedder;
pub mod similarity;
pub mod store;

use std::sync::Arc;
use tracing::{debug, warn};

pub use chunker::{Chunker, DelimiterChunker};
pub use embedder::{EmbeddingConfig, Embedder, HttpEmbedder};
pub use store::{ContextHandle, FileRecord, FileStatus, VectorChunk, VectorStore};

use crate::errors::{ParleyError, ParleyResult};

/// Number of chunks spliced into a prompt unless configured otherwise
pub const DEFAULT_TOP_K: usize = 2;

pub struct RetrievalEngine {
    store: Arc<VectorStore>,
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<VectorStore>,
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            store,
            chunker,
            embedder,
        }
    }

    pub fn store(&self) -> &VectorStore {
        &self.store
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.chunker.chunk(text)
    }

    /// Embed `texts`, checking that the embedder answered once per input.
    pub async fn embed(&self, texts: &[String]) -> ParleyResult<Vec<Vec<f32>>> {
        let embeddings = self
            .embedder
            .embed(texts)
            .await
            .map_err(|e| ParleyError::Retrieval(format!("embedding failed: {e}")))?;
        if embeddings.len() != texts.len() {
            return Err(ParleyError::Retrieval(format!(
                "embedder returned {} vectors for {} texts",
                embeddings.len(),
                texts.len()
            )));
        }
        Ok(embeddings)
    }

    /// Register, chunk, embed and store one document.
    ///
    /// The chunks are only written once every embedding is in hand, so a
    /// failure leaves the record in `error` state with no chunks behind it.
    pub async fn ingest_document(
        &self,
        context_id: &str,
        name: &str,
        text: &str,
    ) -> ParleyResult<FileRecord> {
        let record = self.store.register_file(context_id, name, text.len())?;

        let chunks = self.chunk(text);
        let stored = match self.embed(&chunks).await {
            Ok(embeddings) => self.store.ingest(context_id, &record.id, chunks, embeddings),
            Err(e) => Err(e),
        };

        match stored {
            Ok(count) => {
                debug!("File {} ({}) ready with {} chunks", record.id, name, count);
                self.store
                    .set_file_status(context_id, &record.id, FileStatus::Ready)
            }
            Err(e) => {
                warn!("Failed to ingest {} into {}: {}", name, context_id, e);
                self.store
                    .set_file_status(context_id, &record.id, FileStatus::Error)?;
                Err(e)
            }
        }
    }

    /// Embed `query` and return the best `k` chunk texts across `context_ids`.
    pub async fn search(
        &self,
        context_ids: &[String],
        query: &str,
        k: usize,
    ) -> ParleyResult<Vec<String>> {
        if context_ids.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let mut embeddings = self.embed(&[query.to_string()]).await?;
        let query_embedding = embeddings
            .pop()
            .ok_or_else(|| ParleyError::Retrieval("no embedding for query".to_string()))?;
        self.store.retrieve(context_ids, &query_embedding, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedder::MockEmbedder;

    fn engine_with(embedder: MockEmbedder) -> RetrievalEngine {
        RetrievalEngine::new(
            Arc::new(VectorStore::new()),
            Arc::new(DelimiterChunker::default()),
            Arc::new(embedder),
        )
    }

    #[tokio::test]
    async fn test_ingest_document_marks_ready() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .withf(|texts: &[String]| texts == ["alpha", "beta"])
            .times(1)
            .returning(|texts| Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect()));

        let engine = engine_with(embedder);
        engine.store().create_context(Some("c"));

        let record = engine
            .ingest_document("c", "doc.txt", "Alpha\nBeta\n")
            .await
            .unwrap();
        assert_eq!(record.status, FileStatus::Ready);
        assert_eq!(record.byte_size, 11);
        assert_eq!(engine.store().chunk_count("c").unwrap(), 2);
    }

    #[tokio::test]
    async fn test_ingest_document_embedding_mismatch_marks_error() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Ok(vec![vec![1.0]]));

        let engine = engine_with(embedder);
        engine.store().create_context(Some("c"));

        let err = engine
            .ingest_document("c", "doc.txt", "one\ntwo\nthree")
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Retrieval(_)));

        let files = engine.store().list_files("c").unwrap();
        assert_eq!(files[0].status, FileStatus::Error);
        assert_eq!(engine.store().chunk_count("c").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ingest_document_embedder_failure_marks_error() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .returning(|_| Err(anyhow::anyhow!("rate limited")));

        let engine = engine_with(embedder);
        engine.store().create_context(Some("c"));

        let err = engine
            .ingest_document("c", "doc.txt", "text")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(
            engine.store().list_files("c").unwrap()[0].status,
            FileStatus::Error
        );
    }

    #[tokio::test]
    async fn test_search_embeds_query_once() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed()
            .withf(|texts: &[String]| texts == ["where is the cat"])
            .times(1)
            .returning(|_| Ok(vec![vec![0.0, 1.0]]));

        let engine = engine_with(embedder);
        engine.store().create_context(Some("c"));
        engine
            .store()
            .ingest(
                "c",
                "f",
                vec!["the dog is outside".into(), "the cat is on the mat".into()],
                vec![vec![1.0, 0.0], vec![0.1, 1.0]],
            )
            .unwrap();

        let hits = engine
            .search(&["c".to_string()], "where is the cat", 1)
            .await
            .unwrap();
        assert_eq!(hits, vec!["the cat is on the mat"]);
    }

    #[tokio::test]
    async fn test_search_without_contexts_skips_embedding() {
        let mut embedder = MockEmbedder::new();
        embedder.expect_embed().times(0);
        let engine = engine_with(embedder);
        assert!(engine.search(&[], "anything", 2).await.unwrap().is_empty());
    }
}
