pub mod base;
pub mod configs;
pub mod factory;
pub mod mistral;
pub mod mock;
pub mod openai;
pub mod sse;
pub mod utils;

pub use base::{
    EventTranslator, RawEvent, RawEventStream, Usage, VendorAdapter, VendorEvent, VendorRequest,
};
pub use configs::{AgentConfig, AgentProfile, RetrievalProfile, VendorKind};
pub use factory::{get_adapter, AdapterResolver, FixedAdapter, VendorFactory};
