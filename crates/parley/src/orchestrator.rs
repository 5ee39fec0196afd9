//! Drives conversation turns end to end.
//!
//! Each turn runs on its own task holding the conversation's lock and writes
//! encoded frames into a bounded channel; the caller reads them from the
//! returned [`TurnStream`]. Dropping that stream cancels the turn.
use bytes::Bytes;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::errors::{ParleyError, ParleyResult};
use crate::functions::FunctionExecutor;
use crate::models::conversation::Conversation;
use crate::models::message::{Message, MessageStatus};
use crate::normalizer::{NormalizedEvent, Normalizer, StreamRequest, DEFAULT_MAX_FUNCTION_ROUNDS};
use crate::prompt_template::render_retrieved_context;
use crate::protocol::codec::encode_bytes;
use crate::protocol::{CanonicalEvent, EventKind};
use crate::providers::base::VendorRequest;
use crate::providers::configs::AgentConfig;
use crate::providers::factory::AdapterResolver;
use crate::retrieval::{FileRecord, RetrievalEngine};
use crate::storage::ConversationStore;

/// A text document supplied with a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileUpload {
    pub name: String,
    pub content: String,
}

impl FileUpload {
    pub fn new<N: Into<String>, C: Into<String>>(name: N, content: C) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub prompt: String,
    #[serde(default)]
    pub files: Vec<FileUpload>,
}

impl Turn {
    pub fn new<S: Into<String>>(prompt: S) -> Self {
        Self {
            prompt: prompt.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<FileUpload>) -> Self {
        self.files = files;
        self
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_function_rounds: usize,
    /// Frames buffered between the turn task and the caller
    pub channel_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_function_rounds: DEFAULT_MAX_FUNCTION_ROUNDS,
            channel_capacity: 100,
        }
    }
}

/// The encoded frames of one turn
pub struct TurnStream {
    pub conversation_id: String,
    pub frames: ReceiverStream<Bytes>,
}

/// Why a turn stopped early
#[derive(Debug)]
enum Interrupt {
    Failed(ParleyError),
    /// A terminal frame the normalizer already produced
    Reported(CanonicalEvent),
    Disconnected,
}

impl From<ParleyError> for Interrupt {
    fn from(error: ParleyError) -> Self {
        Interrupt::Failed(error)
    }
}

struct FrameSink {
    tx: mpsc::Sender<Bytes>,
}

impl FrameSink {
    async fn send(&self, event: &CanonicalEvent) -> Result<(), Interrupt> {
        self.tx
            .send(encode_bytes(event))
            .await
            .map_err(|_| Interrupt::Disconnected)
    }
}

/// Reply text per vendor message id, in first-seen order
#[derive(Debug, Default)]
struct Replies {
    order: Vec<String>,
    texts: HashMap<String, String>,
}

impl Replies {
    fn push(&mut self, message_id: &str, content: &str) {
        match self.texts.get_mut(message_id) {
            Some(text) => text.push_str(content),
            None => {
                self.order.push(message_id.to_string());
                self.texts.insert(message_id.to_string(), content.to_string());
            }
        }
    }

    fn into_texts(mut self) -> Vec<String> {
        self.order
            .iter()
            .filter_map(|id| self.texts.remove(id))
            .filter(|text| !text.is_empty())
            .collect()
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn ConversationStore>,
    retrieval: Arc<RetrievalEngine>,
    resolver: Arc<dyn AdapterResolver>,
    executor: Arc<dyn FunctionExecutor>,
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        retrieval: Arc<RetrievalEngine>,
        resolver: Arc<dyn AdapterResolver>,
        executor: Arc<dyn FunctionExecutor>,
    ) -> Self {
        Self {
            store,
            retrieval,
            resolver,
            executor,
            locks: Arc::new(Mutex::new(HashMap::new())),
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn retrieval(&self) -> &RetrievalEngine {
        &self.retrieval
    }

    pub async fn conversation(&self, id: &str) -> ParleyResult<Conversation> {
        self.store.get(id).await
    }

    pub async fn conversations(&self) -> ParleyResult<Vec<Conversation>> {
        self.store.list().await
    }

    fn conversation_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.to_string()).or_default().clone()
    }

    fn forget_lock(&self, id: &str) {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// Create a conversation and stream its first turn
    pub async fn start_conversation(
        &self,
        agent: AgentConfig,
        turn: Turn,
    ) -> ParleyResult<TurnStream> {
        validate_prompt(&turn)?;
        let conversation = Conversation::new();
        let id = conversation.id.clone();
        self.store.insert(conversation).await?;
        info!("Started conversation {} with {}", id, agent.vendor());
        Ok(self.spawn_turn(id, agent, turn))
    }

    pub async fn continue_conversation(
        &self,
        id: &str,
        agent: AgentConfig,
        turn: Turn,
    ) -> ParleyResult<TurnStream> {
        validate_prompt(&turn)?;
        self.store.get(id).await?;
        Ok(self.spawn_turn(id.to_string(), agent, turn))
    }

    /// Ingest files into the conversation's own context without prompting
    pub async fn upload_files(&self, id: &str, files: Vec<FileUpload>) -> ParleyResult<TurnStream> {
        if files.is_empty() {
            return Err(ParleyError::InvalidRequest("no files to upload".to_string()));
        }
        self.store.get(id).await?;

        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);
        let this = self.clone();
        let conversation_id = id.to_string();
        tokio::spawn(async move {
            let lock = this.conversation_lock(&conversation_id);
            let _guard = lock.lock_owned().await;
            let sink = FrameSink { tx };

            let result = match this.store.get(&conversation_id).await {
                Ok(mut conversation) => this.ingest_files(&mut conversation, files, &sink).await,
                Err(e) => Err(Interrupt::Failed(e)),
            };
            match result {
                Ok(_) => debug!("Upload into {} complete", conversation_id),
                Err(Interrupt::Disconnected) => {
                    warn!("Client disconnected during upload into {}", conversation_id)
                }
                Err(Interrupt::Failed(e)) => {
                    error!("Upload into {} failed: {}", conversation_id, e);
                    let _ = sink.send(&CanonicalEvent::error(e.to_string())).await;
                }
                Err(Interrupt::Reported(frame)) => {
                    let _ = sink.send(&frame).await;
                }
            }
        });

        Ok(TurnStream {
            conversation_id: id.to_string(),
            frames: ReceiverStream::new(rx),
        })
    }

    /// Remove one uploaded file from the conversation's context
    pub async fn remove_conversation_file(&self, id: &str, file_id: &str) -> ParleyResult<usize> {
        self.store.get(id).await?;
        let lock = self.conversation_lock(id);
        let guard = lock.lock_owned().await;

        let conversation = match self.store.get(id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                drop(guard);
                self.forget_lock(id);
                return Err(e);
            }
        };
        let context_id = conversation
            .vector_store_id
            .ok_or_else(|| ParleyError::not_found("File", file_id))?;
        let removed = self.retrieval.store().remove_file(&context_id, file_id)?;
        info!("Removed file {} ({} chunks) from {}", file_id, removed, id);
        Ok(removed)
    }

    /// Delete a conversation together with its uploaded files
    pub async fn delete_conversation(&self, id: &str) -> ParleyResult<()> {
        self.store.get(id).await?;
        let lock = self.conversation_lock(id);
        let guard = lock.lock_owned().await;

        let conversation = match self.store.get(id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                drop(guard);
                self.forget_lock(id);
                return Err(e);
            }
        };
        if let Some(context_id) = &conversation.vector_store_id {
            if let Err(e) = self.retrieval.store().delete_context(context_id) {
                warn!("Could not delete context {}: {}", context_id, e);
            }
        }
        self.store.delete(id).await?;
        drop(guard);
        self.forget_lock(id);
        Ok(())
    }

    fn spawn_turn(&self, conversation_id: String, agent: AgentConfig, turn: Turn) -> TurnStream {
        let (tx, rx) = mpsc::channel(self.settings.channel_capacity);
        let this = self.clone();
        let id = conversation_id.clone();
        tokio::spawn(async move {
            this.run_turn(id, agent, turn, FrameSink { tx }).await;
        });
        TurnStream {
            conversation_id,
            frames: ReceiverStream::new(rx),
        }
    }

    async fn run_turn(&self, id: String, agent: AgentConfig, turn: Turn, sink: FrameSink) {
        let lock = self.conversation_lock(&id);
        let _guard = lock.lock_owned().await;

        let mut conversation = match self.store.get(&id).await {
            Ok(conversation) => conversation,
            Err(e) => {
                let _ = sink.send(&CanonicalEvent::error(e.to_string())).await;
                return;
            }
        };

        let user_message = Message::user(turn.prompt.clone());
        let user_message_id = user_message.id.clone();
        conversation.append(user_message);
        if let Err(e) = self.store.update(conversation.clone()).await {
            error!("Could not record prompt for {}: {}", id, e);
            let _ = sink.send(&CanonicalEvent::error(e.to_string())).await;
            return;
        }

        match self
            .chat(&mut conversation, &agent, turn, &user_message_id, &sink)
            .await
        {
            Ok(()) => debug!("Turn on {} complete", id),
            Err(interrupt) => {
                conversation.set_status(&user_message_id, MessageStatus::Incomplete);
                if let Err(e) = self.store.update(conversation).await {
                    error!("Could not mark turn on {} incomplete: {}", id, e);
                }
                match interrupt {
                    Interrupt::Disconnected => {
                        warn!("Client disconnected from {}, discarding partial reply", id)
                    }
                    Interrupt::Failed(e) => {
                        error!("Turn on {} failed: {}", id, e);
                        let _ = sink.send(&CanonicalEvent::error(e.to_string())).await;
                    }
                    Interrupt::Reported(frame) => {
                        error!(
                            "Turn on {} failed: {}",
                            id,
                            frame.error_message().unwrap_or("vendor error")
                        );
                        let _ = sink.send(&frame).await;
                    }
                }
            }
        }
    }

    async fn chat(
        &self,
        conversation: &mut Conversation,
        agent: &AgentConfig,
        turn: Turn,
        user_message_id: &str,
        sink: &FrameSink,
    ) -> Result<(), Interrupt> {
        if !turn.files.is_empty() {
            self.ingest_files(conversation, turn.files, sink).await?;
        }

        let context = self
            .retrieved_context(conversation, agent, &turn.prompt)
            .await?;
        let request = VendorRequest::new(turn.prompt).with_context(context);

        let adapter = self
            .resolver
            .resolve(agent, &self.executor.tools())
            .map_err(|e| {
                ParleyError::Internal(format!("could not build {} adapter: {}", agent.vendor(), e))
            })?;
        let normalizer = Normalizer::new(adapter, self.executor.clone())
            .with_max_rounds(self.settings.max_function_rounds);
        let stream_request = match &conversation.vendor_conversation_id {
            Some(handle) => StreamRequest::Append {
                handle: handle.clone(),
                request,
            },
            None => StreamRequest::Start {
                conversation_id: conversation.id.clone(),
                request,
            },
        };

        let mut events = normalizer.normalize(stream_request);
        let mut handle = conversation.vendor_conversation_id.clone();
        let mut replies = Replies::default();
        loop {
            let next = tokio::select! {
                _ = sink.tx.closed() => return Err(Interrupt::Disconnected),
                next = events.next() => next,
            };
            let event = match next {
                Some(NormalizedEvent::Handle(new_handle)) => {
                    handle = Some(new_handle);
                    continue;
                }
                Some(NormalizedEvent::Frame(event)) => event,
                None => {
                    return Err(ParleyError::VendorStream(
                        "stream ended without a terminal event".to_string(),
                    )
                    .into())
                }
            };

            match event.kind {
                EventKind::MessageEnded => {
                    let mut finished = conversation.clone();
                    finished.vendor_conversation_id = handle;
                    for text in std::mem::take(&mut replies).into_texts() {
                        finished.append(Message::agent(text));
                    }
                    finished.set_status(user_message_id, MessageStatus::Complete);
                    self.store.update(finished.clone()).await?;
                    *conversation = finished;

                    // The turn is persisted; a client gone by now only misses the last frame
                    if sink.send(&event).await.is_err() {
                        warn!("Client left {} before the final frame", conversation.id);
                    }
                    return Ok(());
                }
                EventKind::Error => return Err(Interrupt::Reported(event)),
                _ => {
                    if let Some((message_id, content)) = event.as_delta() {
                        replies.push(message_id, content);
                    }
                    sink.send(&event).await?;
                }
            }
        }
    }

    /// Search the agent's knowledge and the conversation's own files
    async fn retrieved_context(
        &self,
        conversation: &Conversation,
        agent: &AgentConfig,
        prompt: &str,
    ) -> ParleyResult<Option<String>> {
        let retrieval = &agent.profile().retrieval;
        if !retrieval.enabled {
            return Ok(None);
        }

        let mut context_ids = agent.knowledge().to_vec();
        if let Some(own) = &conversation.vector_store_id {
            if !self.retrieval.store().contains(own) {
                // Deleted out from under the conversation; the next upload recreates it
                warn!("Context {} of {} no longer exists", own, conversation.id);
            } else if !context_ids.contains(own) {
                context_ids.push(own.clone());
            }
        }
        let excerpts = self
            .retrieval
            .search(&context_ids, prompt, retrieval.top_k)
            .await?;
        debug!("Retrieved {} excerpts for {}", excerpts.len(), conversation.id);
        render_retrieved_context(&excerpts).map_err(|e| ParleyError::Internal(e.to_string()))
    }

    async fn ingest_files(
        &self,
        conversation: &mut Conversation,
        files: Vec<FileUpload>,
        sink: &FrameSink,
    ) -> Result<Vec<FileRecord>, Interrupt> {
        let store = self.retrieval.store();
        let context_id = match &conversation.vector_store_id {
            Some(id) if store.contains(id) => id.clone(),
            _ => {
                let handle = store.create_context(None);
                info!("Created context {} for {}", handle.id, conversation.id);
                conversation.vector_store_id = Some(handle.id.clone());
                self.store.update(conversation.clone()).await?;
                sink.send(&CanonicalEvent::vector_store_created(handle.id.as_str()))
                    .await?;
                handle.id
            }
        };

        let mut records = Vec::with_capacity(files.len());
        for file in files {
            let record = self
                .retrieval
                .ingest_document(&context_id, &file.name, &file.content)
                .await?;
            sink.send(&CanonicalEvent::vector_store_file_uploaded(
                record.id.as_str(),
                record.name.as_str(),
            ))
            .await?;
            records.push(record);
        }

        let file_ids: Vec<String> = records.iter().map(|r| r.id.clone()).collect();
        sink.send(&CanonicalEvent::vector_store_files_processed(
            context_id.as_str(),
            &file_ids,
        ))
        .await?;
        Ok(records)
    }
}

fn validate_prompt(turn: &Turn) -> ParleyResult<()> {
    if turn.prompt.trim().is_empty() {
        return Err(ParleyError::InvalidRequest("prompt must not be empty".to_string()));
    }
    Ok(())
}
