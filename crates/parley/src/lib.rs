pub mod errors;
pub mod functions;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod prompt_template;
pub mod protocol;
pub mod providers;
pub mod retrieval;
pub mod storage;
