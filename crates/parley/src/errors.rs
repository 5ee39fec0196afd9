use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::codec::ProtocolError;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ParleyError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Vendor stream failed: {0}")]
    VendorStream(String),

    #[error("Function execution failed: {0}")]
    FunctionExecution(#[from] FunctionError),

    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ParleyError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ParleyError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ParleyError::NotFound { .. })
    }
}

pub type ParleyResult<T> = Result<T, ParleyError>;

/// Failure of a single function call. These never abort a stream; they are
/// rendered as text and handed back to the vendor as the call's result.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum FunctionError {
    #[error("Function not found: {0}")]
    NotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Function execution failed: {0}")]
    ExecutionError(String),
}

pub type FunctionResult<T> = Result<T, FunctionError>;
