use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use strum_macros::Display;
use tracing::{debug, info};
use uuid::Uuid;

use super::similarity::cosine_similarity;
use crate::errors::{ParleyError, ParleyResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorChunk {
    pub text: String,
    pub embedding: Vec<f32>,
    pub file_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum FileStatus {
    Processing,
    Ready,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub name: String,
    pub byte_size: usize,
    pub status: FileStatus,
}

#[derive(Debug, Clone, Default)]
pub struct VectorContext {
    pub context_id: String,
    pub chunks: Vec<VectorChunk>,
    pub files: BTreeMap<String, FileRecord>,
}

/// Result of [`VectorStore::create_context`]; `created` is false when the
/// context already existed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHandle {
    pub id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub context_id: String,
    pub file_id: String,
    pub text: String,
    pub score: f32,
}

type SharedContext = Arc<RwLock<VectorContext>>;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory chunk storage keyed by context id.
///
/// The outer map is only locked to look contexts up or add/remove them; all
/// chunk work happens under the owning context's own lock, so writers to one
/// context never block readers of another.
#[derive(Default)]
pub struct VectorStore {
    contexts: RwLock<HashMap<String, SharedContext>>,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self, context_id: &str) -> ParleyResult<SharedContext> {
        read(&self.contexts)
            .get(context_id)
            .cloned()
            .ok_or_else(|| ParleyError::not_found("Vector context", context_id))
    }

    /// Create a context, or return the existing one with the same id.
    pub fn create_context(&self, id: Option<&str>) -> ContextHandle {
        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| format!("vs_{}", Uuid::new_v4().simple()));

        let mut contexts = write(&self.contexts);
        if contexts.contains_key(&id) {
            return ContextHandle { id, created: false };
        }
        contexts.insert(
            id.clone(),
            Arc::new(RwLock::new(VectorContext {
                context_id: id.clone(),
                ..Default::default()
            })),
        );
        info!("Created vector context {}", id);
        ContextHandle { id, created: true }
    }

    pub fn contains(&self, context_id: &str) -> bool {
        read(&self.contexts).contains_key(context_id)
    }

    pub fn delete_context(&self, context_id: &str) -> ParleyResult<()> {
        write(&self.contexts)
            .remove(context_id)
            .map(|_| ())
            .ok_or_else(|| ParleyError::not_found("Vector context", context_id))
    }

    /// Record a new file in `processing` state.
    pub fn register_file(
        &self,
        context_id: &str,
        name: &str,
        byte_size: usize,
    ) -> ParleyResult<FileRecord> {
        let context = self.context(context_id)?;
        let record = FileRecord {
            id: format!("file_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            byte_size,
            status: FileStatus::Processing,
        };
        write(&context)
            .files
            .insert(record.id.clone(), record.clone());
        Ok(record)
    }

    pub fn set_file_status(
        &self,
        context_id: &str,
        file_id: &str,
        status: FileStatus,
    ) -> ParleyResult<FileRecord> {
        let context = self.context(context_id)?;
        let mut context = write(&context);
        let record = context
            .files
            .get_mut(file_id)
            .ok_or_else(|| ParleyError::not_found("File", file_id))?;
        record.status = status;
        Ok(record.clone())
    }

    pub fn file(&self, context_id: &str, file_id: &str) -> ParleyResult<FileRecord> {
        let context = self.context(context_id)?;
        let context = read(&context);
        context
            .files
            .get(file_id)
            .cloned()
            .ok_or_else(|| ParleyError::not_found("File", file_id))
    }

    pub fn list_files(&self, context_id: &str) -> ParleyResult<Vec<FileRecord>> {
        let context = self.context(context_id)?;
        let files = read(&context).files.values().cloned().collect();
        Ok(files)
    }

    pub fn chunk_count(&self, context_id: &str) -> ParleyResult<usize> {
        let context = self.context(context_id)?;
        let count = read(&context).chunks.len();
        Ok(count)
    }

    /// Store one chunk per `(text, embedding)` pair for `file_id`.
    pub fn ingest(
        &self,
        context_id: &str,
        file_id: &str,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> ParleyResult<usize> {
        if chunks.len() != embeddings.len() {
            return Err(ParleyError::Retrieval(format!(
                "chunk/embedding length mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        let context = self.context(context_id)?;
        let count = chunks.len();
        write(&context)
            .chunks
            .extend(
                chunks
                    .into_iter()
                    .zip(embeddings)
                    .map(|(text, embedding)| VectorChunk {
                        text,
                        embedding,
                        file_id: file_id.to_string(),
                    }),
            );
        debug!("Ingested {} chunks for {} into {}", count, file_id, context_id);
        Ok(count)
    }

    /// Drop every chunk belonging to `file_id` along with its record.
    /// Returns the number of chunks removed.
    pub fn remove_file(&self, context_id: &str, file_id: &str) -> ParleyResult<usize> {
        let context = self.context(context_id)?;
        let mut context = write(&context);
        let before = context.chunks.len();
        context.chunks.retain(|chunk| chunk.file_id != file_id);
        let removed = before - context.chunks.len();
        let had_record = context.files.remove(file_id).is_some();

        if removed == 0 && !had_record {
            return Err(ParleyError::not_found("File", file_id));
        }
        Ok(removed)
    }

    /// Score every chunk in the given contexts against `query` and return
    /// the best `k`, highest first. Equal scores keep insertion order.
    pub fn retrieve_scored(
        &self,
        context_ids: &[String],
        query: &[f32],
        k: usize,
    ) -> ParleyResult<Vec<ScoredChunk>> {
        let contexts = context_ids
            .iter()
            .map(|id| self.context(id))
            .collect::<ParleyResult<Vec<_>>>()?;

        let mut scored = Vec::new();
        for context in contexts {
            let context = read(&context);
            scored.extend(context.chunks.iter().map(|chunk| ScoredChunk {
                context_id: context.context_id.clone(),
                file_id: chunk.file_id.clone(),
                text: chunk.text.clone(),
                score: cosine_similarity(&chunk.embedding, query),
            }));
        }

        // sort_by is stable, which gives the insertion-order tie-break
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    pub fn retrieve(
        &self,
        context_ids: &[String],
        query: &[f32],
        k: usize,
    ) -> ParleyResult<Vec<String>> {
        Ok(self
            .retrieve_scored(context_ids, query, k)?
            .into_iter()
            .map(|chunk| chunk.text)
            .collect())
    }
}
