use anyhow::Result;
use parley::functions::{FunctionRegistry, WebhookFunction};
use parley::orchestrator::{Orchestrator, OrchestratorSettings};
use parley::providers::configs::AgentConfig;
use parley::providers::VendorFactory;
use parley::retrieval::{DelimiterChunker, HttpEmbedder, RetrievalEngine, VectorStore};
use parley::storage::InMemoryConversationStore;
use std::sync::Arc;

use crate::configuration::Settings;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
    /// The agent every conversation on this server talks to
    pub agent: AgentConfig,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator, agent: AgentConfig) -> Self {
        Self {
            orchestrator,
            agent,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let retrieval = RetrievalEngine::new(
            Arc::new(VectorStore::new()),
            Arc::new(DelimiterChunker::new(settings.retrieval.delimiter()?)),
            Arc::new(HttpEmbedder::new(settings.embedding_config())?),
        );

        let mut registry = FunctionRegistry::new();
        if let Some(webhook) = &settings.webhook {
            registry.register(Arc::new(WebhookFunction::new(webhook.tool()?, &webhook.url)));
        }

        let orchestrator = Orchestrator::new(
            Arc::new(InMemoryConversationStore::new()),
            Arc::new(retrieval),
            Arc::new(VendorFactory),
            Arc::new(registry),
        )
        .with_settings(OrchestratorSettings {
            max_function_rounds: settings.retrieval.max_function_rounds,
            ..Default::default()
        });

        Ok(Self::new(orchestrator, settings.agent_config()))
    }
}
