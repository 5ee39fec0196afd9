use anyhow::Result;
use std::sync::Arc;

use super::base::VendorAdapter;
use super::configs::AgentConfig;
use super::mistral::MistralAdapter;
use super::openai::OpenAiAdapter;
use crate::models::tool::Tool;

/// Builds the adapter serving an agent configuration
pub trait AdapterResolver: Send + Sync {
    fn resolve(&self, config: &AgentConfig, tools: &[Tool]) -> Result<Arc<dyn VendorAdapter>>;
}

pub fn get_adapter(config: &AgentConfig, tools: &[Tool]) -> Result<Arc<dyn VendorAdapter>> {
    match config {
        AgentConfig::OpenAi { provider, profile } => Ok(Arc::new(OpenAiAdapter::new(
            provider.clone(),
            profile.instructions.clone(),
            tools,
        )?)),
        AgentConfig::Mistral { provider, profile } => Ok(Arc::new(MistralAdapter::new(
            provider.clone(),
            profile.instructions.clone(),
            tools,
        )?)),
    }
}

/// Resolves adapters from the vendor named in the configuration
#[derive(Debug, Default, Clone, Copy)]
pub struct VendorFactory;

impl AdapterResolver for VendorFactory {
    fn resolve(&self, config: &AgentConfig, tools: &[Tool]) -> Result<Arc<dyn VendorAdapter>> {
        get_adapter(config, tools)
    }
}

/// Hands out the same adapter for every configuration
pub struct FixedAdapter(pub Arc<dyn VendorAdapter>);

impl AdapterResolver for FixedAdapter {
    fn resolve(&self, _config: &AgentConfig, _tools: &[Tool]) -> Result<Arc<dyn VendorAdapter>> {
        Ok(self.0.clone())
    }
}
