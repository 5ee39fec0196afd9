use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use parley::models::tool::Tool;
use parley::normalizer::DEFAULT_MAX_FUNCTION_ROUNDS;
use parley::providers::configs::{
    AgentConfig, AgentProfile, MistralProviderConfig, OpenAiProviderConfig, RetrievalProfile,
};
use parley::retrieval::chunker::DEFAULT_DELIMITER;
use parley::retrieval::{EmbeddingConfig, DEFAULT_TOP_K};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::{AddrParseError, SocketAddr};

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum AgentSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default)]
        instructions: Option<String>,
        #[serde(default)]
        knowledge: Vec<String>,
    },
    Mistral {
        #[serde(default = "default_mistral_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_mistral_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
        #[serde(default)]
        instructions: Option<String>,
        #[serde(default)]
        knowledge: Vec<String>,
    },
}

impl AgentSettings {
    pub fn api_key(&self) -> &str {
        match self {
            AgentSettings::OpenAi { api_key, .. } | AgentSettings::Mistral { api_key, .. } => {
                api_key
            }
        }
    }

    pub fn into_config(self, retrieval: &RetrievalSettings) -> AgentConfig {
        match self {
            AgentSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                instructions,
                knowledge,
            } => AgentConfig::OpenAi {
                provider: OpenAiProviderConfig {
                    host,
                    api_key,
                    model,
                    temperature,
                    max_tokens,
                },
                profile: retrieval.profile(instructions, knowledge),
            },
            AgentSettings::Mistral {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
                instructions,
                knowledge,
            } => AgentConfig::Mistral {
                provider: MistralProviderConfig {
                    host,
                    api_key,
                    model,
                    temperature,
                    max_tokens,
                },
                profile: retrieval.profile(instructions, knowledge),
            },
        }
    }
}

/// The OpenAI-compatible embeddings endpoint. The key falls back to the
/// agent's when unset.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingSettings {
    #[serde(default = "default_openai_host")]
    pub host: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_embedding_model")]
    pub model: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            host: default_openai_host(),
            api_key: None,
            model: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrievalSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    #[serde(default = "default_max_function_rounds")]
    pub max_function_rounds: usize,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            top_k: default_top_k(),
            delimiter: default_delimiter(),
            max_function_rounds: default_max_function_rounds(),
        }
    }
}

impl RetrievalSettings {
    pub fn delimiter(&self) -> Result<char, ConfigError> {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(delimiter), None) => Ok(delimiter),
            _ => Err(ConfigError::InvalidValue {
                env_var: to_env_var("retrieval.delimiter"),
                reason: format!("expected a single character, got {:?}", self.delimiter),
            }),
        }
    }

    fn profile(&self, instructions: Option<String>, knowledge: Vec<String>) -> AgentProfile {
        AgentProfile {
            instructions,
            retrieval: RetrievalProfile {
                enabled: self.enabled,
                context_ids: knowledge,
                top_k: self.top_k,
            },
        }
    }
}

/// An optional HTTP function offered to the agent
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub url: String,
    /// JSON schema of the arguments, as a JSON string
    #[serde(default)]
    pub parameters: Option<String>,
}

impl WebhookSettings {
    pub fn tool(&self) -> Result<Tool, ConfigError> {
        let parameters = match &self.parameters {
            Some(raw) => serde_json::from_str::<Value>(raw).map_err(|e| {
                ConfigError::InvalidValue {
                    env_var: to_env_var("webhook.parameters"),
                    reason: e.to_string(),
                }
            })?,
            None => json!({"type": "object", "properties": {}}),
        };
        Ok(Tool::new(&self.name, &self.description, parameters))
    }
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub agent: AgentSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub webhook: Option<WebhookSettings>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            .add_source(
                Environment::with_prefix("PARLEY")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("agent.knowledge"),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        let settings = match result {
            Ok(settings) => settings,
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);
                let message = err.to_string();
                return match missing_field(&message) {
                    Some(field) => Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(&field),
                    }),
                    None => match err {
                        config::ConfigError::NotFound(field) => Err(ConfigError::MissingEnvVar {
                            env_var: to_env_var(&field),
                        }),
                        other => Err(ConfigError::Other(other)),
                    },
                };
            }
        };

        settings.retrieval.delimiter()?;
        if let Some(webhook) = &settings.webhook {
            webhook.tool()?;
        }
        Ok(settings)
    }

    pub fn agent_config(&self) -> AgentConfig {
        self.agent.clone().into_config(&self.retrieval)
    }

    pub fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            host: self.embedding.host.clone(),
            api_key: self
                .embedding
                .api_key
                .clone()
                .unwrap_or_else(|| self.agent.api_key().to_string()),
            model: self.embedding.model.clone(),
        }
    }
}

/// Dotted path of the field named in a "missing field `x`" error. The only
/// required fields live under `agent`, so bare names are placed there.
fn missing_field(message: &str) -> Option<String> {
    let rest = message.split("missing field `").nth(1)?;
    let field = rest.split('`').next()?;
    let key = message
        .split(" for key `")
        .nth(1)
        .and_then(|rest| rest.split('`').next())
        .filter(|key| !key.is_empty());

    Some(match (key, field) {
        (Some(key), field) => format!("{}.{}", key, field),
        (None, "agent") | (None, "type") => "agent.type".to_string(),
        (None, field) => format!("agent.{}", field),
    })
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_mistral_host() -> String {
    "https://api.mistral.ai".to_string()
}

fn default_mistral_model() -> String {
    "mistral-medium-latest".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_max_function_rounds() -> usize {
    DEFAULT_MAX_FUNCTION_ROUNDS
}
