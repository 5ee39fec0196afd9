#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use parley::errors::{FunctionError, FunctionResult, ParleyError, ParleyResult};
use parley::functions::{Function, FunctionRegistry};
use parley::models::conversation::Conversation;
use parley::models::tool::Tool;
use parley::orchestrator::{Orchestrator, TurnStream};
use parley::protocol::{decode, CanonicalEvent};
use parley::providers::configs::{
    AgentConfig, AgentProfile, OpenAiProviderConfig, RetrievalProfile,
};
use parley::providers::mock::MockAdapter;
use parley::providers::FixedAdapter;
use parley::retrieval::{DelimiterChunker, Embedder, RetrievalEngine, VectorStore};
use parley::storage::{ConversationStore, InMemoryConversationStore};

const KEYWORDS: [&str; 3] = ["cat", "dog", "parking"];

/// Embeds text as keyword counts, enough to make similarity predictable
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                KEYWORDS
                    .iter()
                    .map(|keyword| text.matches(keyword).count() as f32)
                    .collect()
            })
            .collect())
    }
}

/// Reports a fixed forecast and remembers the arguments it was called with
pub struct WeatherFunction {
    tool: Tool,
    pub calls: Mutex<Vec<Value>>,
}

impl WeatherFunction {
    pub fn new() -> Self {
        Self {
            tool: Tool::new(
                "get_weather",
                "Gets the current weather for a location",
                json!({
                    "type": "object",
                    "properties": {"location": {"type": "string"}},
                    "required": ["location"]
                }),
            ),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Function for WeatherFunction {
    fn tool(&self) -> &Tool {
        &self.tool
    }

    async fn call(&self, arguments: Value) -> FunctionResult<String> {
        self.calls.lock().unwrap().push(arguments.clone());
        let location = arguments
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| FunctionError::InvalidParameters("location is required".into()))?;
        Ok(format!("Sunny and 21C in {}", location))
    }
}

pub fn agent(retrieval: RetrievalProfile) -> AgentConfig {
    AgentConfig::OpenAi {
        provider: OpenAiProviderConfig {
            host: "http://localhost:9".into(),
            api_key: "unused".into(),
            model: "gpt-4o-mini".into(),
            temperature: None,
            max_tokens: None,
        },
        profile: AgentProfile {
            instructions: Some("You are a helpful assistant.".into()),
            retrieval,
        },
    }
}

pub fn plain_agent() -> AgentConfig {
    agent(RetrievalProfile::default())
}

pub struct Harness {
    pub orchestrator: Orchestrator,
    pub adapter: MockAdapter,
    pub weather: Arc<WeatherFunction>,
}

/// An in-memory store whose `update` fails on exactly one call
pub struct FailingUpdateStore {
    inner: InMemoryConversationStore,
    updates: AtomicUsize,
    fail_on: usize,
}

impl FailingUpdateStore {
    /// `fail_on` counts from 1
    pub fn new(fail_on: usize) -> Self {
        Self {
            inner: InMemoryConversationStore::new(),
            updates: AtomicUsize::new(0),
            fail_on,
        }
    }
}

#[async_trait]
impl ConversationStore for FailingUpdateStore {
    async fn get(&self, id: &str) -> ParleyResult<Conversation> {
        self.inner.get(id).await
    }

    async fn insert(&self, conversation: Conversation) -> ParleyResult<()> {
        self.inner.insert(conversation).await
    }

    async fn update(&self, conversation: Conversation) -> ParleyResult<()> {
        if self.updates.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(ParleyError::Storage("disk full".into()));
        }
        self.inner.update(conversation).await
    }

    async fn delete(&self, id: &str) -> ParleyResult<()> {
        self.inner.delete(id).await
    }

    async fn list(&self) -> ParleyResult<Vec<Conversation>> {
        self.inner.list().await
    }
}

pub fn harness(adapter: MockAdapter) -> Harness {
    harness_with_store(adapter, Arc::new(InMemoryConversationStore::new()))
}

pub fn harness_with_store(adapter: MockAdapter, store: Arc<dyn ConversationStore>) -> Harness {
    let weather = Arc::new(WeatherFunction::new());
    let registry = FunctionRegistry::new().with(weather.clone());
    let retrieval = RetrievalEngine::new(
        Arc::new(VectorStore::new()),
        Arc::new(DelimiterChunker::default()),
        Arc::new(KeywordEmbedder),
    );
    let orchestrator = Orchestrator::new(
        store,
        Arc::new(retrieval),
        Arc::new(FixedAdapter(Arc::new(adapter.clone()))),
        Arc::new(registry),
    );
    Harness {
        orchestrator,
        adapter,
        weather,
    }
}

/// Read every frame of a turn and decode them
pub async fn frames(turn: TurnStream) -> Vec<CanonicalEvent> {
    let bytes: Vec<_> = turn.frames.collect().await;
    let text: String = bytes
        .iter()
        .map(|chunk| String::from_utf8(chunk.to_vec()).unwrap())
        .collect();
    decode(&text).unwrap()
}
