use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

use crate::retrieval::DEFAULT_TOP_K;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VendorKind {
    #[strum(serialize = "openai")]
    OpenAi,
    Mistral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistralProviderConfig {
    pub host: String,
    pub api_key: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<i32>,
}

/// Knowledge bases an agent searches before each prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalProfile {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub context_ids: Vec<String>,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

impl Default for RetrievalProfile {
    fn default() -> Self {
        Self {
            enabled: false,
            context_ids: Vec::new(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Vendor-independent behaviour of an agent
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub retrieval: RetrievalProfile,
}

/// Everything needed to build an adapter for one agent
#[derive(Debug, Clone, PartialEq)]
pub enum AgentConfig {
    OpenAi {
        provider: OpenAiProviderConfig,
        profile: AgentProfile,
    },
    Mistral {
        provider: MistralProviderConfig,
        profile: AgentProfile,
    },
}

impl AgentConfig {
    pub fn vendor(&self) -> VendorKind {
        match self {
            AgentConfig::OpenAi { .. } => VendorKind::OpenAi,
            AgentConfig::Mistral { .. } => VendorKind::Mistral,
        }
    }

    pub fn profile(&self) -> &AgentProfile {
        match self {
            AgentConfig::OpenAi { profile, .. } | AgentConfig::Mistral { profile, .. } => profile,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            AgentConfig::OpenAi { provider, .. } => &provider.model,
            AgentConfig::Mistral { provider, .. } => &provider.model,
        }
    }

    /// Context ids to search for this agent, empty when retrieval is off
    pub fn knowledge(&self) -> &[String] {
        let retrieval = &self.profile().retrieval;
        if retrieval.enabled {
            &retrieval.context_ids
        } else {
            &[]
        }
    }
}
